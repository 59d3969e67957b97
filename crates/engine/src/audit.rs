//! Append-only audit trail.
//!
//! Every state-changing action on a wallet, transfer, recharge, hold or agent
//! writes one row into the audit table of that entity type, including failed
//! attempts. Rows are never updated or deleted; the engine exposes no API to
//! do so.
//!
//! Wallet rows additionally carry `before_state` / `after_state` balance
//! snapshots, which makes the wallet history replayable (see
//! `Engine::reconcile_wallet`).

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{EngineError, OpContext, ResultEngine, WalletSnapshot};

/// The entity an audit row is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum AuditSubject {
    Wallet(Uuid),
    Transfer(Uuid),
    Recharge(Uuid),
    Hold(Uuid),
    Agent(Uuid),
}

impl AuditSubject {
    pub fn id(self) -> Uuid {
        match self {
            Self::Wallet(id)
            | Self::Transfer(id)
            | Self::Recharge(id)
            | Self::Hold(id)
            | Self::Agent(id) => id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    // wallets
    BalanceAdjusted,
    HeldAdjusted,
    Settlement,
    // transfers
    TransferCreated,
    TransferVerified,
    VerificationFailed,
    TransferScheduled,
    TransferCompleted,
    TransferFailed,
    TransferReverted,
    // recharges
    RechargeCreated,
    RechargeDispatched,
    RechargeCompleted,
    RechargeRejected,
    // holds
    HoldCreated,
    HoldReleased,
    HoldApplied,
    HoldCancelled,
    // agents
    AgentCreated,
    AgentActivated,
    AgentDeactivated,
    PinSet,
    PinRejected,
    AgentLocked,
    CommissionEarned,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BalanceAdjusted => "BALANCE_ADJUSTED",
            Self::HeldAdjusted => "HELD_ADJUSTED",
            Self::Settlement => "SETTLEMENT",
            Self::TransferCreated => "TRANSFER_CREATED",
            Self::TransferVerified => "TRANSFER_VERIFIED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::TransferScheduled => "TRANSFER_SCHEDULED",
            Self::TransferCompleted => "TRANSFER_COMPLETED",
            Self::TransferFailed => "TRANSFER_FAILED",
            Self::TransferReverted => "TRANSFER_REVERTED",
            Self::RechargeCreated => "RECHARGE_CREATED",
            Self::RechargeDispatched => "RECHARGE_DISPATCHED",
            Self::RechargeCompleted => "RECHARGE_COMPLETED",
            Self::RechargeRejected => "RECHARGE_REJECTED",
            Self::HoldCreated => "HOLD_CREATED",
            Self::HoldReleased => "HOLD_RELEASED",
            Self::HoldApplied => "HOLD_APPLIED",
            Self::HoldCancelled => "HOLD_CANCELLED",
            Self::AgentCreated => "AGENT_CREATED",
            Self::AgentActivated => "AGENT_ACTIVATED",
            Self::AgentDeactivated => "AGENT_DEACTIVATED",
            Self::PinSet => "PIN_SET",
            Self::PinRejected => "PIN_REJECTED",
            Self::AgentLocked => "AGENT_LOCKED",
            Self::CommissionEarned => "COMMISSION_EARNED",
        }
    }
}

/// One row of an audit trail, whatever table it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic per table; orders the trail.
    pub id: i64,
    pub subject: AuditSubject,
    pub action: String,
    pub before_state: Option<WalletSnapshot>,
    pub after_state: Option<WalletSnapshot>,
    pub details: Value,
    pub error: Option<String>,
    pub actor: String,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row content for the non-wallet audit tables.
#[derive(Clone, Debug)]
pub(crate) struct AuditRecord {
    pub action: AuditAction,
    pub details: Value,
    pub error: Option<String>,
}

impl AuditRecord {
    pub(crate) fn new(action: AuditAction, details: Value) -> Self {
        Self {
            action,
            details,
            error: None,
        }
    }

    pub(crate) fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub mod wallet_audits {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "wallet_audits")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub wallet_id: Uuid,
        pub action: String,
        pub before_state: Json,
        pub after_state: Json,
        pub details: Json,
        pub actor: String,
        pub request_id: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod transfer_audits {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "transfer_audits")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub transfer_id: Uuid,
        pub action: String,
        pub details: Json,
        pub error: Option<String>,
        pub actor: String,
        pub request_id: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod recharge_audits {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "recharge_audits")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub recharge_id: Uuid,
        pub action: String,
        pub details: Json,
        pub error: Option<String>,
        pub actor: String,
        pub request_id: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod hold_audits {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "hold_audits")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub hold_id: Uuid,
        pub action: String,
        pub details: Json,
        pub error: Option<String>,
        pub actor: String,
        pub request_id: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod agent_audits {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "agent_audits")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub agent_id: Uuid,
        pub action: String,
        pub details: Json,
        pub error: Option<String>,
        pub actor: String,
        pub request_id: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Generates the insert and read paths for an operation audit table.
macro_rules! impl_operation_audit {
    ($module:ident, $subject_col:ident, $column:ident, $variant:ident) => {
        impl $module::ActiveModel {
            fn from_record(
                subject_id: Uuid,
                ctx: &OpContext,
                record: AuditRecord,
                now: DateTime<Utc>,
            ) -> Self {
                Self {
                    id: ActiveValue::NotSet,
                    $subject_col: ActiveValue::Set(subject_id),
                    action: ActiveValue::Set(record.action.as_str().to_string()),
                    details: ActiveValue::Set(record.details),
                    error: ActiveValue::Set(record.error),
                    actor: ActiveValue::Set(ctx.actor.clone()),
                    request_id: ActiveValue::Set(ctx.request_id.clone()),
                    created_at: ActiveValue::Set(now),
                }
            }
        }

        impl From<$module::Model> for AuditEntry {
            fn from(model: $module::Model) -> Self {
                Self {
                    id: model.id,
                    subject: AuditSubject::$variant(model.$subject_col),
                    action: model.action,
                    before_state: None,
                    after_state: None,
                    details: model.details,
                    error: model.error,
                    actor: model.actor,
                    request_id: model.request_id,
                    created_at: model.created_at,
                }
            }
        }

        impl $module::Entity {
            async fn trail<C: ConnectionTrait>(
                db: &C,
                subject_id: Uuid,
            ) -> ResultEngine<Vec<AuditEntry>> {
                let rows = Self::find()
                    .filter($module::Column::$column.eq(subject_id))
                    .order_by_asc($module::Column::Id)
                    .all(db)
                    .await?;
                Ok(rows.into_iter().map(AuditEntry::from).collect())
            }
        }
    };
}

impl_operation_audit!(transfer_audits, transfer_id, TransferId, Transfer);
impl_operation_audit!(recharge_audits, recharge_id, RechargeId, Recharge);
impl_operation_audit!(hold_audits, hold_id, HoldId, Hold);
impl_operation_audit!(agent_audits, agent_id, AgentId, Agent);

fn snapshot_json(snapshot: WalletSnapshot) -> ResultEngine<Value> {
    serde_json::to_value(snapshot)
        .map_err(|err| EngineError::Validation(format!("invalid wallet snapshot: {err}")))
}

fn snapshot_from_json(value: Value) -> Option<WalletSnapshot> {
    serde_json::from_value(value).ok()
}

impl TryFrom<wallet_audits::Model> for AuditEntry {
    type Error = EngineError;

    fn try_from(model: wallet_audits::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            subject: AuditSubject::Wallet(model.wallet_id),
            action: model.action,
            before_state: snapshot_from_json(model.before_state),
            after_state: snapshot_from_json(model.after_state),
            details: model.details,
            error: None,
            actor: model.actor,
            request_id: model.request_id,
            created_at: model.created_at,
        })
    }
}

/// Appends a wallet row with its before/after balances.
pub(crate) async fn record_wallet<C: ConnectionTrait>(
    db: &C,
    ctx: &OpContext,
    wallet_id: Uuid,
    action: AuditAction,
    before: WalletSnapshot,
    after: WalletSnapshot,
    details: Value,
    now: DateTime<Utc>,
) -> ResultEngine<()> {
    wallet_audits::ActiveModel {
        id: ActiveValue::NotSet,
        wallet_id: ActiveValue::Set(wallet_id),
        action: ActiveValue::Set(action.as_str().to_string()),
        before_state: ActiveValue::Set(snapshot_json(before)?),
        after_state: ActiveValue::Set(snapshot_json(after)?),
        details: ActiveValue::Set(details),
        actor: ActiveValue::Set(ctx.actor.clone()),
        request_id: ActiveValue::Set(ctx.request_id.clone()),
        created_at: ActiveValue::Set(now),
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Appends a row to the audit table of a transfer, recharge, hold or agent.
pub(crate) async fn record<C: ConnectionTrait>(
    db: &C,
    ctx: &OpContext,
    subject: AuditSubject,
    record: AuditRecord,
    now: DateTime<Utc>,
) -> ResultEngine<()> {
    match subject {
        AuditSubject::Transfer(id) => {
            transfer_audits::ActiveModel::from_record(id, ctx, record, now)
                .insert(db)
                .await?;
        }
        AuditSubject::Recharge(id) => {
            recharge_audits::ActiveModel::from_record(id, ctx, record, now)
                .insert(db)
                .await?;
        }
        AuditSubject::Hold(id) => {
            hold_audits::ActiveModel::from_record(id, ctx, record, now)
                .insert(db)
                .await?;
        }
        AuditSubject::Agent(id) => {
            agent_audits::ActiveModel::from_record(id, ctx, record, now)
                .insert(db)
                .await?;
        }
        AuditSubject::Wallet(_) => {
            return Err(EngineError::Validation(
                "wallet audit rows need balance snapshots".to_string(),
            ));
        }
    }
    Ok(())
}

/// Full trail for a subject, oldest first.
pub(crate) async fn trail<C: ConnectionTrait>(
    db: &C,
    subject: AuditSubject,
) -> ResultEngine<Vec<AuditEntry>> {
    match subject {
        AuditSubject::Wallet(id) => {
            let rows = wallet_audits::Entity::find()
                .filter(wallet_audits::Column::WalletId.eq(id))
                .order_by_asc(wallet_audits::Column::Id)
                .all(db)
                .await?;
            rows.into_iter().map(AuditEntry::try_from).collect()
        }
        AuditSubject::Transfer(id) => transfer_audits::Entity::trail(db, id).await,
        AuditSubject::Recharge(id) => recharge_audits::Entity::trail(db, id).await,
        AuditSubject::Hold(id) => hold_audits::Entity::trail(db, id).await,
        AuditSubject::Agent(id) => agent_audits::Entity::trail(db, id).await,
    }
}
