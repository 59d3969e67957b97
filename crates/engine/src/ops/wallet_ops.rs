use chrono::Utc;
use sea_orm::{
    ConnectionTrait, PaginatorTrait, QueryFilter, QuerySelect, Select, TransactionTrait,
    prelude::*,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    AuditSubject, EngineError, Money, OpContext, RechargeStatus, ResultEngine, TransferStatus,
    Wallet, WalletSnapshot, agents,
    audit::{self, AuditAction},
    notifications::{self, NewNotification, NotificationKind},
    recharges, transfers,
    wallets::WalletDelta,
};

use super::{
    Engine, adjust, agents::find_agent_model, lock_wallet_rows, normalize_required, pick,
    start_of_day, start_of_month, wallet_of, with_tx,
};

/// Result of replaying a wallet's audit chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub wallet_id: Uuid,
    pub entries: usize,
    /// Balances reached by replaying every audit row from zero.
    pub replayed: WalletSnapshot,
    /// Balances stored on the wallet row.
    pub stored: WalletSnapshot,
    /// Audit row ids whose before-state does not follow from the previous
    /// row, or whose delta does not match its snapshots.
    pub breaks: Vec<i64>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.breaks.is_empty() && self.replayed == self.stored
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WalletStatistics {
    pub transfers_sent: u64,
    pub transfers_received: u64,
    pub recharges_completed: u64,
    /// Highest balance ever recorded in the wallet's audit trail.
    pub max_balance: Money,
}

/// Recharge activity of one agent. Windows start at UTC midnight and on the
/// first day of the UTC month.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentStatistics {
    pub recharges_total: u64,
    pub recharges_today: u64,
    pub commission_today: Money,
    pub commission_month: Money,
    pub accumulated_commission: Money,
    /// Distinct users whose recharges this agent completed.
    pub unique_clients: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgencyStatistics {
    pub agents_total: u64,
    pub agents_active: u64,
    pub recharges_total: u64,
    pub recharges_month: u64,
    pub commission_total: Money,
}

/// Completed recharges settled by any of `agent_ids`.
fn completed_by(agent_ids: &[Uuid]) -> Select<recharges::Entity> {
    recharges::Entity::find()
        .filter(recharges::Column::Status.eq(RechargeStatus::Completed.as_str()))
        .filter(recharges::Column::AgentId.is_in(agent_ids.iter().copied()))
}

async fn commission_of<C: ConnectionTrait>(
    db: &C,
    query: Select<recharges::Entity>,
) -> ResultEngine<Money> {
    let commissions: Vec<i64> = query
        .select_only()
        .column(recharges::Column::AgentCommission)
        .into_tuple()
        .all(db)
        .await?;
    Money::try_sum(commissions.into_iter().map(Money::new))
}

impl Engine {
    /// Operator credit (`delta > 0`) or debit (`delta < 0`). A debit may not
    /// exceed the available balance.
    pub async fn adjust_balance(
        &self,
        ctx: &OpContext,
        user: &str,
        delta: Money,
        reason: &str,
    ) -> ResultEngine<Wallet> {
        if delta.is_zero() {
            return Err(EngineError::Validation(
                "adjustment must not be zero".to_string(),
            ));
        }
        let reason = normalize_required(reason, "reason")?;
        let wallet_id = wallet_of(&self.database, user).await?.id;

        let _guard = self.locks.acquire(&[wallet_id]).await;
        let now = Utc::now();
        let result = with_tx!(self, |db_tx| {
            let locked = lock_wallet_rows(&db_tx, &[wallet_id]).await?;
            let current = pick(&locked, wallet_id)?;
            if delta.is_negative() {
                current.ensure_available(-delta)?;
            }
            let next = adjust(
                &db_tx,
                ctx,
                &current,
                WalletDelta::balance(delta),
                AuditAction::BalanceAdjusted,
                &reason,
                None,
                now,
            )
            .await?;
            notifications::emit(
                &db_tx,
                vec![NewNotification::new(
                    user,
                    NotificationKind::BalanceAdjusted,
                    "Balance adjusted",
                    format!("Your balance changed by {delta}: {reason}"),
                    json!({ "delta": delta, "balance": next.balance }),
                )],
                now,
            )
            .await?;
            Ok(next)
        });

        match &result {
            Ok(wallet) => info!(
                wallet = %wallet.id,
                delta = %delta,
                balance = %wallet.balance,
                actor = %ctx.actor,
                "balance adjusted"
            ),
            Err(err) => warn!(wallet = %wallet_id, delta = %delta, error = %err, "adjustment rejected"),
        }
        result
    }

    /// Replays the wallet audit chain and compares it with the stored row.
    pub async fn reconcile_wallet(&self, user: &str) -> ResultEngine<ReconciliationReport> {
        let wallet = wallet_of(&self.database, user).await?;
        let entries = audit::trail(&self.database, AuditSubject::Wallet(wallet.id)).await?;

        let mut replayed = WalletSnapshot {
            balance: Money::ZERO,
            held_balance: Money::ZERO,
        };
        let mut breaks = Vec::new();
        for entry in &entries {
            let (Some(before), Some(after)) = (entry.before_state, entry.after_state) else {
                breaks.push(entry.id);
                continue;
            };
            if before != replayed {
                breaks.push(entry.id);
            }
            let balance_delta = entry.details.get("balance_delta").and_then(|v| v.as_i64());
            let held_delta = entry.details.get("held_delta").and_then(|v| v.as_i64());
            let consistent_delta = balance_delta
                == Some((after.balance - before.balance).minor())
                && held_delta == Some((after.held_balance - before.held_balance).minor());
            if !consistent_delta && !breaks.contains(&entry.id) {
                breaks.push(entry.id);
            }
            replayed = after;
        }

        let report = ReconciliationReport {
            wallet_id: wallet.id,
            entries: entries.len(),
            replayed,
            stored: wallet.snapshot(),
            breaks,
        };
        if !report.is_consistent() {
            warn!(wallet = %wallet.id, breaks = ?report.breaks, "wallet does not reconcile");
        }
        Ok(report)
    }

    pub async fn wallet_statistics(&self, user: &str) -> ResultEngine<WalletStatistics> {
        let wallet = wallet_of(&self.database, user).await?;

        let transfers_sent = transfers::Entity::find()
            .filter(transfers::Column::SenderId.eq(user))
            .filter(transfers::Column::Status.eq(TransferStatus::Completed.as_str()))
            .count(&self.database)
            .await?;
        let transfers_received = transfers::Entity::find()
            .filter(transfers::Column::ReceiverId.eq(user))
            .filter(transfers::Column::Status.eq(TransferStatus::Completed.as_str()))
            .count(&self.database)
            .await?;
        let recharges_completed = recharges::Entity::find()
            .filter(recharges::Column::UserId.eq(user))
            .filter(recharges::Column::Status.eq(RechargeStatus::Completed.as_str()))
            .count(&self.database)
            .await?;

        let entries = audit::trail(&self.database, AuditSubject::Wallet(wallet.id)).await?;
        let max_balance = entries
            .iter()
            .filter_map(|e| e.after_state.map(|s| s.balance))
            .chain(std::iter::once(wallet.balance))
            .max()
            .unwrap_or(wallet.balance);

        Ok(WalletStatistics {
            transfers_sent,
            transfers_received,
            recharges_completed,
            max_balance,
        })
    }

    pub async fn agent_statistics(&self, agent_id: Uuid) -> ResultEngine<AgentStatistics> {
        let agent = find_agent_model(&self.database, agent_id).await?;
        let now = Utc::now();
        let ids = [agent.id];
        let today = start_of_day(now);

        let recharges_total = completed_by(&ids).count(&self.database).await?;
        let recharges_today = completed_by(&ids)
            .filter(recharges::Column::ProcessedAt.gte(today))
            .count(&self.database)
            .await?;
        let commission_today = commission_of(
            &self.database,
            completed_by(&ids).filter(recharges::Column::ProcessedAt.gte(today)),
        )
        .await?;
        let commission_month = commission_of(
            &self.database,
            completed_by(&ids).filter(recharges::Column::ProcessedAt.gte(start_of_month(now))),
        )
        .await?;
        let clients: Vec<String> = completed_by(&ids)
            .select_only()
            .column(recharges::Column::UserId)
            .distinct()
            .into_tuple()
            .all(&self.database)
            .await?;

        Ok(AgentStatistics {
            recharges_total,
            recharges_today,
            commission_today,
            commission_month,
            accumulated_commission: Money::new(agent.accumulated_commission),
            unique_clients: clients.len() as u64,
        })
    }

    pub async fn agency_statistics(&self, code: &str) -> ResultEngine<AgencyStatistics> {
        let agency = self.agency(code).await?;
        let members = agents::Entity::find().filter(agents::Column::AgencyId.eq(agency.id));

        let agents_total = members.clone().count(&self.database).await?;
        let agents_active = members
            .clone()
            .filter(agents::Column::Active.eq(true))
            .count(&self.database)
            .await?;
        let ids: Vec<Uuid> = members
            .select_only()
            .column(agents::Column::Id)
            .into_tuple()
            .all(&self.database)
            .await?;

        let recharges_total = completed_by(&ids).count(&self.database).await?;
        let recharges_month = completed_by(&ids)
            .filter(recharges::Column::ProcessedAt.gte(start_of_month(Utc::now())))
            .count(&self.database)
            .await?;
        let commission_total = commission_of(&self.database, completed_by(&ids)).await?;

        Ok(AgencyStatistics {
            agents_total,
            agents_active,
            recharges_total,
            recharges_month,
            commission_total,
        })
    }
}
