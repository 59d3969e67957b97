use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    AuditSubject, EngineError, Money, OpContext, ResultEngine, Transfer, TransferCmd,
    TransferStatus,
    audit::{self, AuditAction, AuditRecord},
    notifications::{self, NewNotification, NotificationKind},
    pin, transfers,
    wallets::WalletDelta,
};

use super::{Engine, adjust, load_config, lock_wallet_rows, pick, start_of_day, wallet_of, with_tx};

/// One-shot trigger an external scheduler must honour: call
/// `Engine::process_transfer(reference)` at or after `execute_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScheduledExecution {
    pub reference: Uuid,
    pub execute_at: DateTime<Utc>,
}

async fn find_transfer<C: ConnectionTrait>(db: &C, reference: Uuid) -> ResultEngine<Transfer> {
    let model = transfers::Entity::find_by_id(reference)
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("transfer {reference}")))?;
    Transfer::try_from(model)
}

async fn save_transfer<C: ConnectionTrait>(db: &C, transfer: &Transfer) -> ResultEngine<()> {
    transfers::ActiveModel::from(transfer).update(db).await?;
    Ok(())
}

/// Sum of the sender's transfers completed since UTC midnight.
async fn completed_today<C: ConnectionTrait>(
    db: &C,
    sender: &str,
    now: DateTime<Utc>,
) -> ResultEngine<Money> {
    let amounts: Vec<i64> = transfers::Entity::find()
        .select_only()
        .column(transfers::Column::Amount)
        .filter(transfers::Column::SenderId.eq(sender))
        .filter(transfers::Column::Status.eq(TransferStatus::Completed.as_str()))
        .filter(transfers::Column::ProcessedAt.gte(start_of_day(now)))
        .into_tuple()
        .all(db)
        .await?;
    Money::try_sum(amounts.into_iter().map(Money::new))
}

fn ensure_due(transfer: &Transfer, now: DateTime<Utc>) -> ResultEngine<()> {
    if transfer.status == TransferStatus::Scheduled
        && let Some(at) = transfer.scheduled_for
        && at > now
    {
        return Err(EngineError::InvalidStateTransition(format!(
            "transfer {} is scheduled for {at}",
            transfer.reference
        )));
    }
    Ok(())
}

impl Engine {
    /// Validates and records a transfer request.
    ///
    /// The commission is frozen here. Amounts at or above the verification
    /// threshold start in `PENDING_VERIFICATION` with a six-digit code sent to
    /// the sender; the rest start `PENDING`, or `SCHEDULED` when
    /// `cmd.execute_at` is set.
    pub async fn create_transfer(&self, ctx: &OpContext, cmd: TransferCmd) -> ResultEngine<Transfer> {
        let now = Utc::now();
        if let Some(at) = cmd.execute_at
            && at <= now
        {
            return Err(EngineError::Validation(
                "scheduled time must be in the future".to_string(),
            ));
        }

        let result = with_tx!(self, |db_tx| {
            let config = load_config(&db_tx).await?;
            wallet_of(&db_tx, &cmd.sender).await?;
            wallet_of(&db_tx, &cmd.receiver).await?;
            let mut transfer = Transfer::new(
                cmd.sender.clone(),
                cmd.receiver.clone(),
                cmd.amount,
                &config,
                cmd.metadata.clone(),
                now,
            )?;

            let created_today = transfers::Entity::find()
                .filter(transfers::Column::SenderId.eq(cmd.sender.as_str()))
                .filter(transfers::Column::CreatedAt.gte(start_of_day(now)))
                .count(&db_tx)
                .await?;
            if created_today >= u64::from(config.max_daily_operations) {
                return Err(EngineError::DailyLimitExceeded(format!(
                    "{} allows at most {} transfers per day",
                    cmd.sender, config.max_daily_operations
                )));
            }

            transfer.scheduled_for = cmd.execute_at;
            if cmd.execute_at.is_some() {
                transfer.status = TransferStatus::Scheduled;
            }
            let mut pending = Vec::new();
            if transfer.amount >= config.verification_threshold {
                let code = pin::generate_code();
                transfer.status = TransferStatus::PendingVerification;
                pending.push(
                    NewNotification::new(
                        &transfer.sender_id,
                        NotificationKind::VerificationRequired,
                        "Confirm your transfer",
                        format!(
                            "Use code {code} to confirm the transfer of {} to {}",
                            transfer.amount, transfer.receiver_id
                        ),
                        json!({ "reference": transfer.reference, "code": code }),
                    )
                    .important(),
                );
                transfer.verification_code = Some(code);
            }

            transfers::ActiveModel::from(&transfer).insert(&db_tx).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Transfer(transfer.reference),
                AuditRecord::new(
                    AuditAction::TransferCreated,
                    json!({
                        "amount": transfer.amount,
                        "commission": transfer.commission,
                        "status": transfer.status.as_str(),
                        "scheduled_for": transfer.scheduled_for,
                    }),
                ),
                now,
            )
            .await?;
            notifications::emit(&db_tx, pending, now).await?;
            Ok(transfer)
        });

        match &result {
            Ok(transfer) => info!(
                reference = %transfer.reference,
                sender = %transfer.sender_id,
                receiver = %transfer.receiver_id,
                amount = %transfer.amount,
                commission = %transfer.commission,
                status = transfer.status.as_str(),
                "transfer created"
            ),
            Err(err) => warn!(sender = %cmd.sender, amount = %cmd.amount, error = %err, "transfer request rejected"),
        }
        result
    }

    /// Checks the verification code of a `PENDING_VERIFICATION` transfer.
    ///
    /// A wrong code fails with `PinIncorrect`; the last allowed wrong code
    /// also moves the transfer to `FAILED`.
    pub async fn verify_transfer(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        code: &str,
    ) -> ResultEngine<Transfer> {
        let now = Utc::now();
        let outcome = with_tx!(self, |db_tx| {
            let config = load_config(&db_tx).await?;
            let mut transfer = find_transfer(&db_tx, reference).await?;
            if transfer.status != TransferStatus::PendingVerification {
                return Err(EngineError::InvalidStateTransition(format!(
                    "transfer {reference} is {}",
                    transfer.status.as_str()
                )));
            }

            if transfer.verification_code.as_deref() == Some(code) {
                transfer.status = if transfer.scheduled_for.is_some() {
                    TransferStatus::Scheduled
                } else {
                    TransferStatus::Pending
                };
                transfer.verification_code = None;
                save_transfer(&db_tx, &transfer).await?;
                audit::record(
                    &db_tx,
                    ctx,
                    AuditSubject::Transfer(reference),
                    AuditRecord::new(
                        AuditAction::TransferVerified,
                        json!({ "attempts": transfer.verification_attempts + 1 }),
                    ),
                    now,
                )
                .await?;
                return Ok(Ok(transfer));
            }

            transfer.verification_attempts += 1;
            let remaining = config
                .max_verification_attempts
                .saturating_sub(transfer.verification_attempts);
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Transfer(reference),
                AuditRecord::new(
                    AuditAction::VerificationFailed,
                    json!({ "attempts": transfer.verification_attempts, "remaining": remaining }),
                )
                .error("verification code mismatch"),
                now,
            )
            .await?;
            if remaining == 0 {
                transfer.status = TransferStatus::Failed;
                transfer.processed_at = Some(now);
                transfer.verification_code = None;
                audit::record(
                    &db_tx,
                    ctx,
                    AuditSubject::Transfer(reference),
                    AuditRecord::new(AuditAction::TransferFailed, json!({}))
                        .error("verification attempts exhausted"),
                    now,
                )
                .await?;
                notifications::emit(
                    &db_tx,
                    vec![
                        NewNotification::new(
                            &transfer.sender_id,
                            NotificationKind::TransferFailed,
                            "Transfer failed",
                            format!(
                                "Your transfer of {} to {} was cancelled after too many wrong codes",
                                transfer.amount, transfer.receiver_id
                            ),
                            json!({ "reference": reference }),
                        )
                        .important(),
                    ],
                    now,
                )
                .await?;
            }
            save_transfer(&db_tx, &transfer).await?;
            Ok(Err(remaining))
        })?;

        match outcome {
            Ok(transfer) => {
                info!(reference = %reference, "transfer verified");
                Ok(transfer)
            }
            Err(remaining) => {
                warn!(reference = %reference, remaining, "wrong verification code");
                Err(EngineError::PinIncorrect { remaining })
            }
        }
    }

    /// Moves a `PENDING` transfer to `SCHEDULED` for `execute_at`. Running it
    /// at that time is up to the caller's scheduler.
    pub async fn schedule_transfer(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        execute_at: DateTime<Utc>,
    ) -> ResultEngine<ScheduledExecution> {
        let now = Utc::now();
        if execute_at <= now {
            return Err(EngineError::Validation(
                "scheduled time must be in the future".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            let mut transfer = find_transfer(&db_tx, reference).await?;
            if transfer.status != TransferStatus::Pending {
                return Err(EngineError::InvalidStateTransition(format!(
                    "only PENDING transfers can be scheduled, {reference} is {}",
                    transfer.status.as_str()
                )));
            }
            transfer.status = TransferStatus::Scheduled;
            transfer.scheduled_for = Some(execute_at);
            save_transfer(&db_tx, &transfer).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Transfer(reference),
                AuditRecord::new(
                    AuditAction::TransferScheduled,
                    json!({ "execute_at": execute_at }),
                ),
                now,
            )
            .await?;
            Ok(())
        })?;
        info!(reference = %reference, execute_at = %execute_at, "transfer scheduled");
        Ok(ScheduledExecution {
            reference,
            execute_at,
        })
    }

    /// Settles a `PENDING` or due `SCHEDULED` transfer.
    ///
    /// Both wallets are locked in ascending id order for the whole settlement.
    /// When settlement fails the money changes are rolled back, then the
    /// transfer is marked `FAILED` in a separate transaction and the error is
    /// returned. Calling it again on a finished transfer fails with
    /// `InvalidStateTransition` and writes nothing.
    pub async fn process_transfer(&self, ctx: &OpContext, reference: Uuid) -> ResultEngine<Transfer> {
        let now = Utc::now();
        let transfer = find_transfer(&self.database, reference).await?;
        transfer.ensure_processable()?;
        ensure_due(&transfer, now)?;
        let sender_wallet = wallet_of(&self.database, &transfer.sender_id).await?.id;
        let receiver_wallet = wallet_of(&self.database, &transfer.receiver_id).await?.id;

        let _guard = self
            .locks
            .acquire(&[sender_wallet, receiver_wallet])
            .await;
        let result = with_tx!(self, |db_tx| {
            let mut transfer = find_transfer(&db_tx, reference).await?;
            transfer.ensure_processable()?;

            let locked = lock_wallet_rows(&db_tx, &[sender_wallet, receiver_wallet]).await?;
            let sender = pick(&locked, sender_wallet)?;
            let receiver = pick(&locked, receiver_wallet)?;

            let config = load_config(&db_tx).await?;
            let today = completed_today(&db_tx, &transfer.sender_id, now).await?;
            if today.try_add(transfer.amount)? > config.daily_transfer_limit {
                return Err(EngineError::DailyLimitExceeded(format!(
                    "{} already sent {today} today, limit is {}",
                    transfer.sender_id, config.daily_transfer_limit
                )));
            }
            let total_debit = transfer.total_debit()?;
            sender.ensure_available(total_debit)?;

            let reason = format!("transfer {reference}");
            let sender_after = adjust(
                &db_tx,
                ctx,
                &sender,
                WalletDelta::balance(-total_debit),
                AuditAction::Settlement,
                &reason,
                Some(reference),
                now,
            )
            .await?;
            adjust(
                &db_tx,
                ctx,
                &receiver,
                WalletDelta::balance(transfer.amount),
                AuditAction::Settlement,
                &reason,
                Some(reference),
                now,
            )
            .await?;

            transfer.status = TransferStatus::Completed;
            transfer.processed_at = Some(now);
            save_transfer(&db_tx, &transfer).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Transfer(reference),
                AuditRecord::new(
                    AuditAction::TransferCompleted,
                    json!({
                        "amount": transfer.amount,
                        "commission": transfer.commission,
                        "sender_balance": sender_after.balance,
                    }),
                ),
                now,
            )
            .await?;
            notifications::emit(
                &db_tx,
                vec![
                    NewNotification::new(
                        &transfer.sender_id,
                        NotificationKind::TransferSent,
                        "Transfer sent",
                        format!(
                            "You sent {} to {} (commission {})",
                            transfer.amount, transfer.receiver_id, transfer.commission
                        ),
                        json!({ "reference": reference, "amount": transfer.amount }),
                    ),
                    NewNotification::new(
                        &transfer.receiver_id,
                        NotificationKind::TransferReceived,
                        "Transfer received",
                        format!("You received {} from {}", transfer.amount, transfer.sender_id),
                        json!({ "reference": reference, "amount": transfer.amount }),
                    ),
                ],
                now,
            )
            .await?;
            Ok(transfer)
        });

        match result {
            Ok(transfer) => {
                info!(
                    reference = %reference,
                    amount = %transfer.amount,
                    commission = %transfer.commission,
                    "transfer completed"
                );
                Ok(transfer)
            }
            Err(err) => {
                warn!(reference = %reference, error = %err, "transfer failed");
                if let Err(record_err) = self.record_transfer_failure(ctx, reference, &err).await {
                    error!(reference = %reference, error = %record_err, "transfer failure not recorded");
                }
                Err(err)
            }
        }
    }

    /// Marks a transfer `FAILED` after its settlement rolled back. Does
    /// nothing if it is no longer processable.
    async fn record_transfer_failure(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        err: &EngineError,
    ) -> ResultEngine<()> {
        let now = Utc::now();
        with_tx!(self, |db_tx| {
            let mut transfer = find_transfer(&db_tx, reference).await?;
            if !transfer.status.is_processable() {
                return Ok(());
            }
            transfer.status = TransferStatus::Failed;
            transfer.processed_at = Some(now);
            save_transfer(&db_tx, &transfer).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Transfer(reference),
                AuditRecord::new(
                    AuditAction::TransferFailed,
                    json!({ "kind": err.kind().as_str() }),
                )
                .error(err.to_string()),
                now,
            )
            .await?;
            notifications::emit(
                &db_tx,
                vec![
                    NewNotification::new(
                        &transfer.sender_id,
                        NotificationKind::TransferFailed,
                        "Transfer failed",
                        format!(
                            "Your transfer of {} to {} failed: {}",
                            transfer.amount,
                            transfer.receiver_id,
                            err.safe_message()
                        ),
                        json!({ "reference": reference, "reason": err.kind().as_str() }),
                    )
                    .important(),
                ],
                now,
            )
            .await?;
            Ok(())
        })
    }

    /// Manual compensation of a completed transfer: the receiver gives back
    /// `amount`, the sender gets back `amount + commission`.
    pub async fn revert_transfer(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        reason: &str,
    ) -> ResultEngine<Transfer> {
        let transfer = find_transfer(&self.database, reference).await?;
        if transfer.status != TransferStatus::Completed {
            return Err(EngineError::InvalidStateTransition(format!(
                "only COMPLETED transfers can be reverted, {reference} is {}",
                transfer.status.as_str()
            )));
        }
        let sender_wallet = wallet_of(&self.database, &transfer.sender_id).await?.id;
        let receiver_wallet = wallet_of(&self.database, &transfer.receiver_id).await?.id;

        let _guard = self
            .locks
            .acquire(&[sender_wallet, receiver_wallet])
            .await;
        let now = Utc::now();
        let result = with_tx!(self, |db_tx| {
            let mut transfer = find_transfer(&db_tx, reference).await?;
            if transfer.status != TransferStatus::Completed {
                return Err(EngineError::InvalidStateTransition(format!(
                    "transfer {reference} is {}",
                    transfer.status.as_str()
                )));
            }
            let locked = lock_wallet_rows(&db_tx, &[sender_wallet, receiver_wallet]).await?;
            let sender = pick(&locked, sender_wallet)?;
            let receiver = pick(&locked, receiver_wallet)?;
            receiver.ensure_available(transfer.amount)?;

            let note = format!("revert transfer {reference}: {reason}");
            adjust(
                &db_tx,
                ctx,
                &receiver,
                WalletDelta::balance(-transfer.amount),
                AuditAction::Settlement,
                &note,
                Some(reference),
                now,
            )
            .await?;
            adjust(
                &db_tx,
                ctx,
                &sender,
                WalletDelta::balance(transfer.total_debit()?),
                AuditAction::Settlement,
                &note,
                Some(reference),
                now,
            )
            .await?;

            transfer.status = TransferStatus::Reverted;
            save_transfer(&db_tx, &transfer).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Transfer(reference),
                AuditRecord::new(AuditAction::TransferReverted, json!({ "reason": reason })),
                now,
            )
            .await?;
            let message = format!(
                "Transfer of {} from {} to {} was reverted",
                transfer.amount, transfer.sender_id, transfer.receiver_id
            );
            notifications::emit(
                &db_tx,
                vec![
                    NewNotification::new(
                        &transfer.sender_id,
                        NotificationKind::TransferReverted,
                        "Transfer reverted",
                        message.clone(),
                        json!({ "reference": reference }),
                    ),
                    NewNotification::new(
                        &transfer.receiver_id,
                        NotificationKind::TransferReverted,
                        "Transfer reverted",
                        message,
                        json!({ "reference": reference }),
                    ),
                ],
                now,
            )
            .await?;
            Ok(transfer)
        });

        match &result {
            Ok(_) => info!(reference = %reference, actor = %ctx.actor, "transfer reverted"),
            Err(err) => warn!(reference = %reference, error = %err, "transfer revert rejected"),
        }
        result
    }

    pub async fn transfer(&self, reference: Uuid) -> ResultEngine<Transfer> {
        find_transfer(&self.database, reference).await
    }

    /// `SCHEDULED` transfers whose time has come, oldest first.
    pub async fn due_scheduled_transfers(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> ResultEngine<Vec<Transfer>> {
        transfers::Entity::find()
            .filter(transfers::Column::Status.eq(TransferStatus::Scheduled.as_str()))
            .filter(transfers::Column::ScheduledFor.lte(now))
            .order_by_asc(transfers::Column::ScheduledFor)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transfer::try_from)
            .collect()
    }
}
