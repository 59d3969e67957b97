//! Notification outbox.
//!
//! The ledger never delivers anything. Each notification is a row written in
//! the same transaction as the state change it describes, so it exists exactly
//! when that change commits. An external deliverer polls the undelivered rows
//! and marks them delivered.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, ConnectionTrait, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TransferSent,
    TransferReceived,
    TransferFailed,
    TransferReverted,
    VerificationRequired,
    RechargeCompleted,
    RechargeFailed,
    CommissionEarned,
    HoldCreated,
    HoldReleased,
    HoldApplied,
    HoldCancelled,
    BalanceAdjusted,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransferSent => "transfer_sent",
            Self::TransferReceived => "transfer_received",
            Self::TransferFailed => "transfer_failed",
            Self::TransferReverted => "transfer_reverted",
            Self::VerificationRequired => "verification_required",
            Self::RechargeCompleted => "recharge_completed",
            Self::RechargeFailed => "recharge_failed",
            Self::CommissionEarned => "commission_earned",
            Self::HoldCreated => "hold_created",
            Self::HoldReleased => "hold_released",
            Self::HoldApplied => "hold_applied",
            Self::HoldCancelled => "hold_cancelled",
            Self::BalanceAdjusted => "balance_adjusted",
        }
    }
}

impl TryFrom<&str> for NotificationKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transfer_sent" => Ok(Self::TransferSent),
            "transfer_received" => Ok(Self::TransferReceived),
            "transfer_failed" => Ok(Self::TransferFailed),
            "transfer_reverted" => Ok(Self::TransferReverted),
            "verification_required" => Ok(Self::VerificationRequired),
            "recharge_completed" => Ok(Self::RechargeCompleted),
            "recharge_failed" => Ok(Self::RechargeFailed),
            "commission_earned" => Ok(Self::CommissionEarned),
            "hold_created" => Ok(Self::HoldCreated),
            "hold_released" => Ok(Self::HoldReleased),
            "hold_applied" => Ok(Self::HoldApplied),
            "hold_cancelled" => Ok(Self::HoldCancelled),
            "balance_adjusted" => Ok(Self::BalanceAdjusted),
            other => Err(EngineError::Validation(format!(
                "invalid notification kind: {other}"
            ))),
        }
    }
}

/// An event for the delivery collaborator: `{user_id, kind, title, message,
/// metadata}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: Value,
    pub important: bool,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// A notification about to be written.
#[derive(Clone, Debug)]
pub(crate) struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: Value,
    pub important: bool,
}

impl NewNotification {
    pub(crate) fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            metadata,
            important: false,
        }
    }

    pub(crate) fn important(mut self) -> Self {
        self.important = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub metadata: Json,
    pub important: bool,
    pub created_at: DateTimeUtc,
    pub delivered_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Notification {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            kind: NotificationKind::try_from(model.kind.as_str())?,
            title: model.title,
            message: model.message,
            metadata: model.metadata,
            important: model.important,
            created_at: model.created_at,
            delivered_at: model.delivered_at,
        })
    }
}

/// Writes `notifications` on `db`, normally the caller's open transaction.
pub(crate) async fn emit<C: ConnectionTrait>(
    db: &C,
    notifications: Vec<NewNotification>,
    now: DateTime<Utc>,
) -> ResultEngine<()> {
    for notification in notifications {
        ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(notification.user_id),
            kind: ActiveValue::Set(notification.kind.as_str().to_string()),
            title: ActiveValue::Set(notification.title),
            message: ActiveValue::Set(notification.message),
            metadata: ActiveValue::Set(notification.metadata),
            important: ActiveValue::Set(notification.important),
            created_at: ActiveValue::Set(now),
            delivered_at: ActiveValue::Set(None),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_their_names() {
        for kind in [
            NotificationKind::TransferSent,
            NotificationKind::VerificationRequired,
            NotificationKind::CommissionEarned,
            NotificationKind::HoldCancelled,
        ] {
            assert_eq!(NotificationKind::try_from(kind.as_str()).unwrap(), kind);
        }
        assert!(NotificationKind::try_from("email").is_err());
    }
}
