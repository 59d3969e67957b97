//! Initial schema migration for the Monedero ledger.
//!
//! Creates the complete schema in one step:
//!
//! - `users`: account owners, keyed by username
//! - `wallets`: one balance per user, with the held part kept separately
//! - `system_config`: the singleton row of operating limits, seeded with defaults
//! - `transfers`, `recharges`, `holds`: money movements and escrow
//! - `agencies`, `agents`: recharge agents and their sealed PINs
//! - `notifications`: transactional outbox
//! - `*_audits`: append-only audit trail per subject kind

use chrono::Utc;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Username,
    CreatedAt,
}

#[derive(Iden)]
enum Wallets {
    Table,
    Id,
    UserId,
    Balance,
    HeldBalance,
    CreditLimit,
    VerificationLevel,
    UpdatedAt,
}

#[derive(Iden)]
enum SystemConfig {
    Table,
    Id,
    DailyTransferLimit,
    DailyRechargeLimit,
    MinTransferAmount,
    TransferCommissionPct,
    TransferCommissionMin,
    AgentCommissionPct,
    VerificationThreshold,
    MaxVerificationAttempts,
    MaxDailyOperations,
    HoldExpiryPolicy,
    DefaultHoldDays,
    UpdatedAt,
    UpdatedBy,
}

#[derive(Iden)]
enum Transfers {
    Table,
    Reference,
    SenderId,
    ReceiverId,
    Amount,
    Commission,
    Status,
    CreatedAt,
    ProcessedAt,
    ScheduledFor,
    VerificationCode,
    VerificationAttempts,
    Metadata,
}

#[derive(Iden)]
enum Agencies {
    Table,
    Id,
    Code,
    Name,
    EncryptionKey,
    Active,
    CreatedAt,
}

#[derive(Iden)]
enum Agents {
    Table,
    Id,
    UserId,
    AgencyId,
    AgentCode,
    AccumulatedCommission,
    Active,
    OperationsPin,
    FailedPinAttempts,
    LastActivity,
    CreatedAt,
}

#[derive(Iden)]
enum Recharges {
    Table,
    Reference,
    UserId,
    AgentId,
    Amount,
    AgentCommission,
    NetAmount,
    Status,
    PaymentMethod,
    PaymentData,
    CreatedAt,
    UpdatedAt,
    ProcessedAt,
}

#[derive(Iden)]
enum Holds {
    Table,
    Reference,
    UserId,
    Amount,
    Status,
    Reason,
    RelatedType,
    RelatedId,
    CreatedAt,
    UpdatedAt,
    ExpiresAt,
}

#[derive(Iden)]
enum Notifications {
    Table,
    Id,
    UserId,
    Kind,
    Title,
    Message,
    Metadata,
    Important,
    CreatedAt,
    DeliveredAt,
}

#[derive(Iden)]
enum WalletAudits {
    Table,
    Id,
    WalletId,
    Action,
    BeforeState,
    AfterState,
    Details,
    Actor,
    RequestId,
    CreatedAt,
}

/// Columns shared by the transfer, recharge, hold and agent audit tables.
#[derive(Iden)]
enum SubjectAudit {
    Id,
    Action,
    Details,
    Error,
    Actor,
    RequestId,
    CreatedAt,
}

#[derive(Iden)]
enum TransferAudits {
    Table,
    TransferId,
}

#[derive(Iden)]
enum RechargeAudits {
    Table,
    RechargeId,
}

#[derive(Iden)]
enum HoldAudits {
    Table,
    HoldId,
}

#[derive(Iden)]
enum AgentAudits {
    Table,
    AgentId,
}

/// `(table, subject column, index prefix)` for every subject audit table.
fn subject_audit_tables() -> [(DynIden, DynIden, &'static str); 4] {
    [
        (
            TransferAudits::Table.into_iden(),
            TransferAudits::TransferId.into_iden(),
            "transfer_audits",
        ),
        (
            RechargeAudits::Table.into_iden(),
            RechargeAudits::RechargeId.into_iden(),
            "recharge_audits",
        ),
        (
            HoldAudits::Table.into_iden(),
            HoldAudits::HoldId.into_iden(),
            "hold_audits",
        ),
        (
            AgentAudits::Table.into_iden(),
            AgentAudits::AgentId.into_iden(),
            "agent_audits",
        ),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Wallets
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Wallets::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Wallets::UserId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Wallets::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Wallets::HeldBalance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Wallets::CreditLimit)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Wallets::VerificationLevel)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Wallets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-wallets-user_id")
                            .from(Wallets::Table, Wallets::UserId)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. System configuration (singleton)
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(SystemConfig::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemConfig::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::DailyTransferLimit)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::DailyRechargeLimit)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::MinTransferAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::TransferCommissionPct)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::TransferCommissionMin)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::AgentCommissionPct)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::VerificationThreshold)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::MaxVerificationAttempts)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::MaxDailyOperations)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::HoldExpiryPolicy)
                            .string()
                            .not_null()
                            .default("release"),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::DefaultHoldDays)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemConfig::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SystemConfig::UpdatedBy).string())
                    .to_owned(),
            )
            .await?;

        // Amounts in minor units, percentages in hundredths of a percent.
        let seed = Query::insert()
            .into_table(SystemConfig::Table)
            .columns([
                SystemConfig::Id,
                SystemConfig::DailyTransferLimit,
                SystemConfig::DailyRechargeLimit,
                SystemConfig::MinTransferAmount,
                SystemConfig::TransferCommissionPct,
                SystemConfig::TransferCommissionMin,
                SystemConfig::AgentCommissionPct,
                SystemConfig::VerificationThreshold,
                SystemConfig::MaxVerificationAttempts,
                SystemConfig::MaxDailyOperations,
                SystemConfig::HoldExpiryPolicy,
                SystemConfig::DefaultHoldDays,
                SystemConfig::UpdatedAt,
            ])
            .values_panic([
                1_i32.into(),
                50_000_000_i64.into(),
                10_000_000_i64.into(),
                100_000_i64.into(),
                100_i64.into(),
                10_000_i64.into(),
                100_i64.into(),
                5_000_000_i64.into(),
                3_i32.into(),
                10_i32.into(),
                "release".into(),
                3_i32.into(),
                Utc::now().into(),
            ])
            .to_owned();
        manager.exec_stmt(seed).await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Transfers
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transfers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transfers::Reference)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transfers::SenderId).string().not_null())
                    .col(ColumnDef::new(Transfers::ReceiverId).string().not_null())
                    .col(ColumnDef::new(Transfers::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Transfers::Commission)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transfers::Status).string().not_null())
                    .col(
                        ColumnDef::new(Transfers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transfers::ProcessedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Transfers::ScheduledFor).timestamp_with_time_zone())
                    .col(ColumnDef::new(Transfers::VerificationCode).string())
                    .col(
                        ColumnDef::new(Transfers::VerificationAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Transfers::Metadata).json().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transfers-sender_id")
                            .from(Transfers::Table, Transfers::SenderId)
                            .to(Users::Table, Users::Username),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transfers-receiver_id")
                            .from(Transfers::Table, Transfers::ReceiverId)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transfers-sender_id-created_at")
                    .table(Transfers::Table)
                    .col(Transfers::SenderId)
                    .col(Transfers::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transfers-status-scheduled_for")
                    .table(Transfers::Table)
                    .col(Transfers::Status)
                    .col(Transfers::ScheduledFor)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Agencies and agents
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Agencies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Agencies::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Agencies::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Agencies::Name).string().not_null())
                    .col(ColumnDef::new(Agencies::EncryptionKey).string().not_null())
                    .col(
                        ColumnDef::new(Agencies::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Agencies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Agents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Agents::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Agents::UserId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Agents::AgencyId).uuid().not_null())
                    .col(
                        ColumnDef::new(Agents::AgentCode)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Agents::AccumulatedCommission)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Agents::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Agents::OperationsPin).string())
                    .col(
                        ColumnDef::new(Agents::FailedPinAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Agents::LastActivity).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Agents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-agents-user_id")
                            .from(Agents::Table, Agents::UserId)
                            .to(Users::Table, Users::Username),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-agents-agency_id")
                            .from(Agents::Table, Agents::AgencyId)
                            .to(Agencies::Table, Agencies::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Recharges
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Recharges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Recharges::Reference)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Recharges::UserId).string().not_null())
                    .col(ColumnDef::new(Recharges::AgentId).uuid())
                    .col(ColumnDef::new(Recharges::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Recharges::AgentCommission)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Recharges::NetAmount).big_integer().not_null())
                    .col(ColumnDef::new(Recharges::Status).string().not_null())
                    .col(ColumnDef::new(Recharges::PaymentMethod).string().not_null())
                    .col(ColumnDef::new(Recharges::PaymentData).json().not_null())
                    .col(
                        ColumnDef::new(Recharges::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Recharges::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Recharges::ProcessedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-recharges-user_id")
                            .from(Recharges::Table, Recharges::UserId)
                            .to(Users::Table, Users::Username),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-recharges-agent_id")
                            .from(Recharges::Table, Recharges::AgentId)
                            .to(Agents::Table, Agents::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-recharges-user_id-processed_at")
                    .table(Recharges::Table)
                    .col(Recharges::UserId)
                    .col(Recharges::ProcessedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-recharges-status")
                    .table(Recharges::Table)
                    .col(Recharges::Status)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Holds
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Holds::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Holds::Reference)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Holds::UserId).string().not_null())
                    .col(ColumnDef::new(Holds::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Holds::Status).string().not_null())
                    .col(ColumnDef::new(Holds::Reason).string().not_null())
                    .col(ColumnDef::new(Holds::RelatedType).string())
                    .col(ColumnDef::new(Holds::RelatedId).string())
                    .col(
                        ColumnDef::new(Holds::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Holds::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Holds::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-holds-user_id")
                            .from(Holds::Table, Holds::UserId)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-holds-status-expires_at")
                    .table(Holds::Table)
                    .col(Holds::Status)
                    .col(Holds::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 8. Notifications outbox
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Notifications::UserId).string().not_null())
                    .col(ColumnDef::new(Notifications::Kind).string().not_null())
                    .col(ColumnDef::new(Notifications::Title).string().not_null())
                    .col(ColumnDef::new(Notifications::Message).string().not_null())
                    .col(ColumnDef::new(Notifications::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(Notifications::Important)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Notifications::DeliveredAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-notifications-delivered_at")
                    .table(Notifications::Table)
                    .col(Notifications::DeliveredAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 9. Audit trail
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(WalletAudits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WalletAudits::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WalletAudits::WalletId).uuid().not_null())
                    .col(ColumnDef::new(WalletAudits::Action).string().not_null())
                    .col(ColumnDef::new(WalletAudits::BeforeState).json().not_null())
                    .col(ColumnDef::new(WalletAudits::AfterState).json().not_null())
                    .col(ColumnDef::new(WalletAudits::Details).json().not_null())
                    .col(ColumnDef::new(WalletAudits::Actor).string().not_null())
                    .col(ColumnDef::new(WalletAudits::RequestId).string())
                    .col(
                        ColumnDef::new(WalletAudits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-wallet_audits-wallet_id")
                            .from(WalletAudits::Table, WalletAudits::WalletId)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-wallet_audits-wallet_id-action")
                    .table(WalletAudits::Table)
                    .col(WalletAudits::WalletId)
                    .col(WalletAudits::Action)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-wallet_audits-created_at")
                    .table(WalletAudits::Table)
                    .col(WalletAudits::CreatedAt)
                    .to_owned(),
            )
            .await?;

        for (table, subject, prefix) in subject_audit_tables() {
            manager
                .create_table(
                    Table::create()
                        .table(table.clone())
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SubjectAudit::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(subject.clone()).uuid().not_null())
                        .col(ColumnDef::new(SubjectAudit::Action).string().not_null())
                        .col(ColumnDef::new(SubjectAudit::Details).json().not_null())
                        .col(ColumnDef::new(SubjectAudit::Error).string())
                        .col(ColumnDef::new(SubjectAudit::Actor).string().not_null())
                        .col(ColumnDef::new(SubjectAudit::RequestId).string())
                        .col(
                            ColumnDef::new(SubjectAudit::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name(format!("idx-{prefix}-subject-action"))
                        .table(table.clone())
                        .col(subject)
                        .col(SubjectAudit::Action)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name(format!("idx-{prefix}-created_at"))
                        .table(table)
                        .col(SubjectAudit::CreatedAt)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (table, _, _) in subject_audit_tables() {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        manager
            .drop_table(Table::drop().table(WalletAudits::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Holds::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Recharges::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Agents::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Agencies::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transfers::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SystemConfig::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Wallets::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
