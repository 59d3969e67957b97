use chrono::{DateTime, Duration, Utc};
use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    AuditSubject, EngineError, Hold, HoldCmd, HoldExpiryPolicy, HoldStatus, Money, OpContext,
    ResultEngine,
    audit::{self, AuditAction, AuditRecord},
    holds,
    notifications::{self, NewNotification, NotificationKind},
    wallets::WalletDelta,
};

use super::{
    Engine, adjust, load_config, lock_wallet_rows, normalize_required, pick, wallet_of, with_tx,
};

/// What an expiry sweep did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub released: Vec<Uuid>,
    pub applied: Vec<Uuid>,
    /// Holds that could not be transitioned; they stay `ACTIVE`.
    pub failed: Vec<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HoldTransition {
    Release,
    Apply,
    Cancel,
}

impl HoldTransition {
    fn verb(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Apply => "apply",
            Self::Cancel => "cancel",
        }
    }

    fn target(self) -> HoldStatus {
        match self {
            Self::Release => HoldStatus::Released,
            Self::Apply => HoldStatus::Applied,
            Self::Cancel => HoldStatus::Cancelled,
        }
    }

    /// Release and cancel undo the reservation; apply also takes the money.
    fn delta(self, amount: Money) -> WalletDelta {
        match self {
            Self::Release | Self::Cancel => WalletDelta::held(-amount),
            Self::Apply => WalletDelta {
                balance: -amount,
                held: -amount,
            },
        }
    }

    fn actions(self) -> (AuditAction, AuditAction) {
        match self {
            Self::Release => (AuditAction::HeldAdjusted, AuditAction::HoldReleased),
            Self::Apply => (AuditAction::Settlement, AuditAction::HoldApplied),
            Self::Cancel => (AuditAction::HeldAdjusted, AuditAction::HoldCancelled),
        }
    }

    fn notification(self) -> (NotificationKind, &'static str) {
        match self {
            Self::Release => (NotificationKind::HoldReleased, "Funds released"),
            Self::Apply => (NotificationKind::HoldApplied, "Held funds charged"),
            Self::Cancel => (NotificationKind::HoldCancelled, "Hold cancelled"),
        }
    }
}

async fn find_hold<C: ConnectionTrait>(db: &C, reference: Uuid) -> ResultEngine<Hold> {
    let model = holds::Entity::find_by_id(reference)
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("hold {reference}")))?;
    Hold::try_from(model)
}

impl Engine {
    /// Reserves `amount` of the user's available balance until the hold is
    /// released, applied, cancelled or swept.
    pub async fn create_hold(&self, ctx: &OpContext, cmd: HoldCmd) -> ResultEngine<Hold> {
        let reason = normalize_required(&cmd.reason, "hold reason")?;
        if !cmd.amount.is_positive() {
            return Err(EngineError::Validation(
                "hold amount must be > 0".to_string(),
            ));
        }
        let wallet_id = wallet_of(&self.database, &cmd.user).await?.id;

        let _guard = self.locks.acquire(&[wallet_id]).await;
        let now = Utc::now();
        let result = with_tx!(self, |db_tx| {
            let config = load_config(&db_tx).await?;
            let days = cmd.expires_in_days.unwrap_or(config.default_hold_days);
            let expires_at = Duration::try_days(i64::from(days))
                .and_then(|span| now.checked_add_signed(span))
                .ok_or_else(|| {
                    EngineError::Validation(format!("hold expiry of {days} days is out of range"))
                })?;
            let hold = Hold::new(
                cmd.user.clone(),
                cmd.amount,
                reason.clone(),
                cmd.related.clone(),
                now,
                expires_at,
            )?;

            let locked = lock_wallet_rows(&db_tx, &[wallet_id]).await?;
            let wallet = pick(&locked, wallet_id)?;
            if wallet.available_balance() < hold.amount {
                return Err(EngineError::Validation(format!(
                    "insufficient available balance for hold: {} < {}",
                    wallet.available_balance(),
                    hold.amount
                )));
            }

            holds::ActiveModel::from(&hold).insert(&db_tx).await?;
            let next = adjust(
                &db_tx,
                ctx,
                &wallet,
                WalletDelta::held(hold.amount),
                AuditAction::HeldAdjusted,
                &format!("hold {}: {}", hold.reference, hold.reason),
                Some(hold.reference),
                now,
            )
            .await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Hold(hold.reference),
                AuditRecord::new(
                    AuditAction::HoldCreated,
                    json!({
                        "amount": hold.amount,
                        "balance": next.balance,
                        "held_balance": next.held_balance,
                        "expires_at": hold.expires_at,
                        "related": hold.related,
                    }),
                ),
                now,
            )
            .await?;
            notifications::emit(
                &db_tx,
                vec![NewNotification::new(
                    &hold.user_id,
                    NotificationKind::HoldCreated,
                    "Funds on hold",
                    format!("{} reserved: {}", hold.amount, hold.reason),
                    json!({ "reference": hold.reference, "amount": hold.amount }),
                )],
                now,
            )
            .await?;
            Ok(hold)
        });

        match &result {
            Ok(hold) => info!(
                reference = %hold.reference,
                user = %hold.user_id,
                amount = %hold.amount,
                "hold created"
            ),
            Err(err) => warn!(user = %cmd.user, amount = %cmd.amount, error = %err, "hold rejected"),
        }
        result
    }

    /// ACTIVE -> RELEASED. The reserved funds become available again.
    pub async fn release_hold(&self, ctx: &OpContext, reference: Uuid) -> ResultEngine<Hold> {
        self.transition_hold(ctx, reference, HoldTransition::Release)
            .await
    }

    /// ACTIVE -> APPLIED. The reserved funds leave the wallet.
    pub async fn apply_hold(&self, ctx: &OpContext, reference: Uuid) -> ResultEngine<Hold> {
        self.transition_hold(ctx, reference, HoldTransition::Apply)
            .await
    }

    /// ACTIVE -> CANCELLED. Same money movement as a release.
    pub async fn cancel_hold(&self, ctx: &OpContext, reference: Uuid) -> ResultEngine<Hold> {
        self.transition_hold(ctx, reference, HoldTransition::Cancel)
            .await
    }

    pub async fn hold(&self, reference: Uuid) -> ResultEngine<Hold> {
        find_hold(&self.database, reference).await
    }

    pub async fn holds_of(&self, user: &str) -> ResultEngine<Vec<Hold>> {
        holds::Entity::find()
            .filter(holds::Column::UserId.eq(user))
            .order_by_asc(holds::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Hold::try_from)
            .collect()
    }

    /// Settles every `ACTIVE` hold whose `expires_at` is not after `now`,
    /// following `SystemConfig::hold_expiry_policy`.
    pub async fn sweep_expired_holds(
        &self,
        ctx: &OpContext,
        now: DateTime<Utc>,
    ) -> ResultEngine<SweepReport> {
        let policy = load_config(&self.database).await?.hold_expiry_policy;
        let expired = holds::Entity::find()
            .filter(holds::Column::Status.eq(HoldStatus::Active.as_str()))
            .filter(holds::Column::ExpiresAt.lte(now))
            .order_by_asc(holds::Column::ExpiresAt)
            .all(&self.database)
            .await?;

        let transition = match policy {
            HoldExpiryPolicy::Release => HoldTransition::Release,
            HoldExpiryPolicy::Apply => HoldTransition::Apply,
        };
        let mut report = SweepReport::default();
        for model in expired {
            let reference = model.reference;
            match self.transition_hold(ctx, reference, transition).await {
                Ok(_) if transition == HoldTransition::Apply => report.applied.push(reference),
                Ok(_) => report.released.push(reference),
                // Settled by someone else since the scan.
                Err(EngineError::InvalidStateTransition(_)) => {}
                Err(err) => {
                    warn!(reference = %reference, error = %err, "expired hold not settled");
                    report.failed.push(reference);
                }
            }
        }
        if !report.released.is_empty() || !report.applied.is_empty() {
            info!(
                released = report.released.len(),
                applied = report.applied.len(),
                failed = report.failed.len(),
                policy = policy.as_str(),
                "expired holds swept"
            );
        }
        Ok(report)
    }

    async fn transition_hold(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        transition: HoldTransition,
    ) -> ResultEngine<Hold> {
        let hold = find_hold(&self.database, reference).await?;
        hold.ensure_active(transition.verb())?;
        let wallet_id = wallet_of(&self.database, &hold.user_id).await?.id;

        let _guard = self.locks.acquire(&[wallet_id]).await;
        let now = Utc::now();
        let result = with_tx!(self, |db_tx| {
            let mut hold = find_hold(&db_tx, reference).await?;
            hold.ensure_active(transition.verb())?;

            let locked = lock_wallet_rows(&db_tx, &[wallet_id]).await?;
            let wallet = pick(&locked, wallet_id)?;
            let delta = transition.delta(hold.amount);
            if wallet.held_balance.try_add(delta.held)? < Money::ZERO {
                return Err(EngineError::Validation(format!(
                    "held balance {} does not cover hold {}",
                    wallet.held_balance, hold.reference
                )));
            }

            let (wallet_action, hold_action) = transition.actions();
            let next = adjust(
                &db_tx,
                ctx,
                &wallet,
                delta,
                wallet_action,
                &format!("hold {} {}", hold.reference, transition.target().as_str()),
                Some(hold.reference),
                now,
            )
            .await?;

            hold.status = transition.target();
            hold.updated_at = now;
            holds::ActiveModel::from(&hold).update(&db_tx).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Hold(hold.reference),
                AuditRecord::new(
                    hold_action,
                    json!({
                        "amount": hold.amount,
                        "balance": next.balance,
                        "held_balance": next.held_balance,
                    }),
                ),
                now,
            )
            .await?;

            let (kind, title) = transition.notification();
            notifications::emit(
                &db_tx,
                vec![NewNotification::new(
                    &hold.user_id,
                    kind,
                    title,
                    format!("Hold of {} is now {}", hold.amount, hold.status.as_str()),
                    json!({ "reference": hold.reference, "amount": hold.amount }),
                )],
                now,
            )
            .await?;
            Ok(hold)
        });

        match &result {
            Ok(hold) => info!(
                reference = %hold.reference,
                status = hold.status.as_str(),
                "hold settled"
            ),
            Err(err) => {
                warn!(reference = %reference, error = %err, "hold transition rejected");
                if !matches!(err, EngineError::InvalidStateTransition(_)) {
                    let (_, hold_action) = transition.actions();
                    if let Err(record_err) = self
                        .record_hold_failure(ctx, reference, hold_action, err)
                        .await
                    {
                        error!(reference = %reference, error = %record_err, "hold failure not recorded");
                    }
                }
            }
        }
        result
    }

    /// Audits a failed transition after its transaction rolled back.
    async fn record_hold_failure(
        &self,
        ctx: &OpContext,
        reference: Uuid,
        action: AuditAction,
        err: &EngineError,
    ) -> ResultEngine<()> {
        let now = Utc::now();
        with_tx!(self, |db_tx| {
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Hold(reference),
                AuditRecord::new(action, json!({ "failed": true })).error(err.to_string()),
                now,
            )
            .await
        })
    }
}
