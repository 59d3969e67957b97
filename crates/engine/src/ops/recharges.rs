use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    AuditSubject, EngineError, Money, OpContext, Recharge, RechargeCmd, RechargeStatus,
    ResultEngine,
    audit::{self, AuditAction, AuditRecord},
    notifications::{self, NewNotification, NotificationKind},
    recharges,
    wallets::WalletDelta,
};

use super::{
    Engine, adjust,
    agents::{credit_commission, find_agent_model},
    load_config, lock_wallet_rows, pick, start_of_day, wallet_of, with_tx,
};

async fn find_recharge<C: ConnectionTrait>(db: &C, reference: Uuid) -> ResultEngine<Recharge> {
    let model = recharges::Entity::find_by_id(reference)
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("recharge {reference}")))?;
    Recharge::try_from(model)
}

async fn save_recharge<C: ConnectionTrait>(db: &C, recharge: &Recharge) -> ResultEngine<()> {
    recharges::ActiveModel::from(recharge).update(db).await?;
    Ok(())
}

/// Sum of the user's recharges completed since UTC midnight.
async fn completed_today<C: ConnectionTrait>(
    db: &C,
    user: &str,
    now: DateTime<Utc>,
) -> ResultEngine<Money> {
    let amounts: Vec<i64> = recharges::Entity::find()
        .select_only()
        .column(recharges::Column::Amount)
        .filter(recharges::Column::UserId.eq(user))
        .filter(recharges::Column::Status.eq(RechargeStatus::Completed.as_str()))
        .filter(recharges::Column::ProcessedAt.gte(start_of_day(now)))
        .into_tuple()
        .all(db)
        .await?;
    Money::try_sum(amounts.into_iter().map(Money::new))
}

impl Engine {
    /// Records a top-up request. The agent commission and the net amount are
    /// computed now and never again.
    pub async fn create_recharge(&self, ctx: &OpContext, cmd: RechargeCmd) -> ResultEngine<Recharge> {
        let now = Utc::now();
        let result = with_tx!(self, |db_tx| {
            let config = load_config(&db_tx).await?;
            wallet_of(&db_tx, &cmd.user).await?;
            let recharge = Recharge::new(
                cmd.user.clone(),
                cmd.amount,
                cmd.payment_method.trim().to_string(),
                cmd.payment_data.clone(),
                &config,
                now,
            )?;
            recharges::ActiveModel::from(&recharge).insert(&db_tx).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Recharge(recharge.reference),
                AuditRecord::new(
                    AuditAction::RechargeCreated,
                    json!({
                        "amount": recharge.amount,
                        "agent_commission": recharge.agent_commission,
                        "net_amount": recharge.net_amount,
                        "payment_method": recharge.payment_method,
                    }),
                ),
                now,
            )
            .await?;
            Ok(recharge)
        });

        match &result {
            Ok(recharge) => info!(
                reference = %recharge.reference,
                user = %recharge.user_id,
                amount = %recharge.amount,
                agent_commission = %recharge.agent_commission,
                "recharge created"
            ),
            Err(err) => warn!(user = %cmd.user, amount = %cmd.amount, error = %err, "recharge request rejected"),
        }
        result
    }

    /// PENDING -> IN_PROGRESS. Hands the recharge to the background worker,
    /// which later calls [`Engine::process_recharge`]. Nothing times out an
    /// IN_PROGRESS recharge.
    pub async fn dispatch_recharge(&self, ctx: &OpContext, reference: Uuid) -> ResultEngine<Recharge> {
        let now = Utc::now();
        let recharge = with_tx!(self, |db_tx| {
            let mut recharge = find_recharge(&db_tx, reference).await?;
            if recharge.status != RechargeStatus::Pending {
                return Err(EngineError::InvalidStateTransition(format!(
                    "only PENDING recharges can be dispatched, {reference} is {}",
                    recharge.status.as_str()
                )));
            }
            recharge.status = RechargeStatus::InProgress;
            recharge.updated_at = now;
            save_recharge(&db_tx, &recharge).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Recharge(reference),
                AuditRecord::new(AuditAction::RechargeDispatched, json!({})),
                now,
            )
            .await?;
            Ok(recharge)
        })?;
        info!(reference = %reference, "recharge dispatched");
        Ok(recharge)
    }

    /// Credits the user with the net amount and the agent with the frozen
    /// commission.
    ///
    /// Failures during settlement roll back, then the recharge is marked
    /// `REJECTED` in its own transaction and the error is returned.
    pub async fn process_recharge(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        agent_id: Uuid,
    ) -> ResultEngine<Recharge> {
        let recharge = find_recharge(&self.database, reference).await?;
        recharge.ensure_processable()?;
        let agent = find_agent_model(&self.database, agent_id).await?;
        if !agent.active {
            return Err(EngineError::Validation(format!("agent {agent_id} is inactive")));
        }
        if agent.user_id == recharge.user_id {
            return Err(EngineError::Validation(
                "an agent cannot process its own recharge".to_string(),
            ));
        }
        let user_wallet = wallet_of(&self.database, &recharge.user_id).await?.id;
        let agent_wallet = wallet_of(&self.database, &agent.user_id).await?.id;

        let _guard = self.locks.acquire(&[user_wallet, agent_wallet]).await;
        let now = Utc::now();
        let result = with_tx!(self, |db_tx| {
            let mut recharge = find_recharge(&db_tx, reference).await?;
            recharge.ensure_processable()?;
            let config = load_config(&db_tx).await?;
            let today = completed_today(&db_tx, &recharge.user_id, now).await?;
            if today.try_add(recharge.amount)? > config.daily_recharge_limit {
                return Err(EngineError::DailyLimitExceeded(format!(
                    "{} already recharged {today} today, limit is {}",
                    recharge.user_id, config.daily_recharge_limit
                )));
            }

            let locked = lock_wallet_rows(&db_tx, &[user_wallet, agent_wallet]).await?;
            let user = pick(&locked, user_wallet)?;
            let agent_holder = pick(&locked, agent_wallet)?;
            let agent = find_agent_model(&db_tx, agent_id).await?;

            let reason = format!("recharge {reference}");
            adjust(
                &db_tx,
                ctx,
                &user,
                WalletDelta::balance(recharge.net_amount),
                AuditAction::Settlement,
                &reason,
                Some(reference),
                now,
            )
            .await?;
            if !recharge.agent_commission.is_zero() {
                adjust(
                    &db_tx,
                    ctx,
                    &agent_holder,
                    WalletDelta::balance(recharge.agent_commission),
                    AuditAction::CommissionEarned,
                    &reason,
                    Some(reference),
                    now,
                )
                .await?;
            }

            let accumulated =
                credit_commission(&db_tx, agent.clone(), recharge.agent_commission, now).await?;

            recharge.status = RechargeStatus::Completed;
            recharge.agent_id = Some(agent_id);
            recharge.processed_at = Some(now);
            recharge.updated_at = now;
            save_recharge(&db_tx, &recharge).await?;

            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Recharge(reference),
                AuditRecord::new(
                    AuditAction::RechargeCompleted,
                    json!({
                        "agent_id": agent_id,
                        "net_amount": recharge.net_amount,
                        "agent_commission": recharge.agent_commission,
                    }),
                ),
                now,
            )
            .await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Agent(agent_id),
                AuditRecord::new(
                    AuditAction::CommissionEarned,
                    json!({
                        "recharge": reference,
                        "commission": recharge.agent_commission,
                        "accumulated_commission": accumulated,
                    }),
                ),
                now,
            )
            .await?;
            notifications::emit(
                &db_tx,
                vec![
                    NewNotification::new(
                        &recharge.user_id,
                        NotificationKind::RechargeCompleted,
                        "Recharge completed",
                        format!("{} was added to your wallet", recharge.net_amount),
                        json!({ "reference": reference, "net_amount": recharge.net_amount }),
                    ),
                    NewNotification::new(
                        &agent.user_id,
                        NotificationKind::CommissionEarned,
                        "Commission earned",
                        format!(
                            "You earned {} for recharge {reference}",
                            recharge.agent_commission
                        ),
                        json!({ "reference": reference, "commission": recharge.agent_commission }),
                    ),
                ],
                now,
            )
            .await?;
            Ok(recharge)
        });

        match result {
            Ok(recharge) => {
                info!(
                    reference = %reference,
                    agent = %agent_id,
                    net_amount = %recharge.net_amount,
                    agent_commission = %recharge.agent_commission,
                    "recharge completed"
                );
                Ok(recharge)
            }
            Err(err) => {
                warn!(reference = %reference, error = %err, "recharge failed");
                if let Err(record_err) = self
                    .record_recharge_rejection(ctx, reference, &err.to_string(), &err.safe_message())
                    .await
                {
                    error!(reference = %reference, error = %record_err, "recharge failure not recorded");
                }
                Err(err)
            }
        }
    }

    /// Checks the agent's PIN, then processes the recharge.
    pub async fn process_recharge_with_pin(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        agent_id: Uuid,
        pin: &str,
    ) -> ResultEngine<Recharge> {
        self.authorize_agent(ctx, agent_id, pin).await?;
        self.process_recharge(ctx, reference, agent_id).await
    }

    /// Operator rejection of a `PENDING` or `IN_PROGRESS` recharge.
    pub async fn reject_recharge(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        reason: &str,
    ) -> ResultEngine<Recharge> {
        let recharge = find_recharge(&self.database, reference).await?;
        recharge.ensure_processable()?;
        self.record_recharge_rejection(ctx, reference, reason, reason)
            .await?;
        let recharge = find_recharge(&self.database, reference).await?;
        if recharge.status != RechargeStatus::Rejected {
            return Err(EngineError::InvalidStateTransition(format!(
                "recharge {reference} is {}",
                recharge.status.as_str()
            )));
        }
        info!(reference = %reference, actor = %ctx.actor, "recharge rejected");
        Ok(recharge)
    }

    /// Marks a recharge `REJECTED` if it is still processable.
    async fn record_recharge_rejection(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        error: &str,
        user_message: &str,
    ) -> ResultEngine<()> {
        let now = Utc::now();
        with_tx!(self, |db_tx| {
            let mut recharge = find_recharge(&db_tx, reference).await?;
            if recharge.status.is_terminal() {
                return Ok(());
            }
            recharge.status = RechargeStatus::Rejected;
            recharge.updated_at = now;
            save_recharge(&db_tx, &recharge).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Recharge(reference),
                AuditRecord::new(AuditAction::RechargeRejected, json!({})).error(error),
                now,
            )
            .await?;
            notifications::emit(
                &db_tx,
                vec![
                    NewNotification::new(
                        &recharge.user_id,
                        NotificationKind::RechargeFailed,
                        "Recharge failed",
                        format!(
                            "Your recharge of {} was rejected: {user_message}",
                            recharge.amount
                        ),
                        json!({ "reference": reference }),
                    )
                    .important(),
                ],
                now,
            )
            .await?;
            Ok(())
        })
    }

    pub async fn recharge(&self, reference: Uuid) -> ResultEngine<Recharge> {
        find_recharge(&self.database, reference).await
    }

    /// Recharges claimed by async dispatch and not yet settled, oldest first.
    pub async fn recharges_in_progress(&self, limit: u64) -> ResultEngine<Vec<Recharge>> {
        recharges::Entity::find()
            .filter(recharges::Column::Status.eq(RechargeStatus::InProgress.as_str()))
            .order_by_asc(recharges::Column::CreatedAt)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Recharge::try_from)
            .collect()
    }
}
