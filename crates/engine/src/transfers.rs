//! Peer-to-peer transfers.
//!
//! A transfer moves `amount` from the sender to the receiver and charges the
//! sender a `commission` retained by the system. Commission is computed once,
//! when the transfer is created, and never recomputed.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, SystemConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
    Reverted,
    PendingVerification,
    Scheduled,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Reverted => "REVERTED",
            Self::PendingVerification => "PENDING_VERIFICATION",
            Self::Scheduled => "SCHEDULED",
        }
    }

    /// `process` only runs from these states.
    pub fn is_processable(self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Reverted)
    }
}

impl TryFrom<&str> for TransferStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "REVERTED" => Ok(Self::Reverted),
            "PENDING_VERIFICATION" => Ok(Self::PendingVerification),
            "SCHEDULED" => Ok(Self::Scheduled),
            other => Err(EngineError::Validation(format!(
                "invalid transfer status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub reference: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: Money,
    pub commission: Money,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    pub verification_attempts: u32,
    pub metadata: Value,
}

impl Transfer {
    /// Validates the request against `config` and freezes the commission.
    pub(crate) fn new(
        sender_id: String,
        receiver_id: String,
        amount: Money,
        config: &SystemConfig,
        metadata: Value,
        now: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if sender_id == receiver_id {
            return Err(EngineError::Validation(
                "sender and receiver must differ".to_string(),
            ));
        }
        if !amount.is_positive() {
            return Err(EngineError::Validation(
                "transfer amount must be > 0".to_string(),
            ));
        }
        if amount < config.min_transfer_amount {
            return Err(EngineError::Validation(format!(
                "minimum transfer amount is {}",
                config.min_transfer_amount
            )));
        }
        let transfer = Self {
            reference: Uuid::new_v4(),
            sender_id,
            receiver_id,
            amount,
            commission: config.transfer_commission(amount),
            status: TransferStatus::Pending,
            created_at: now,
            processed_at: None,
            scheduled_for: None,
            verification_code: None,
            verification_attempts: 0,
            metadata,
        };
        transfer.total_debit()?;
        Ok(transfer)
    }

    /// What leaves the sender's wallet on completion.
    pub fn total_debit(&self) -> ResultEngine<Money> {
        self.amount.try_add(self.commission)
    }

    pub(crate) fn ensure_processable(&self) -> ResultEngine<()> {
        if !self.status.is_processable() {
            return Err(EngineError::InvalidStateTransition(format!(
                "transfer {} is {}; only PENDING or SCHEDULED transfers can be processed",
                self.reference,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub reference: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub commission: i64,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
    pub scheduled_for: Option<DateTimeUtc>,
    pub verification_code: Option<String>,
    pub verification_attempts: i32,
    pub metadata: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::SenderId",
        to = "super::users::Column::Username",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Sender,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ReceiverId",
        to = "super::users::Column::Username",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Receiver,
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transfer> for ActiveModel {
    fn from(transfer: &Transfer) -> Self {
        Self {
            reference: ActiveValue::Set(transfer.reference),
            sender_id: ActiveValue::Set(transfer.sender_id.clone()),
            receiver_id: ActiveValue::Set(transfer.receiver_id.clone()),
            amount: ActiveValue::Set(transfer.amount.minor()),
            commission: ActiveValue::Set(transfer.commission.minor()),
            status: ActiveValue::Set(transfer.status.as_str().to_string()),
            created_at: ActiveValue::Set(transfer.created_at),
            processed_at: ActiveValue::Set(transfer.processed_at),
            scheduled_for: ActiveValue::Set(transfer.scheduled_for),
            verification_code: ActiveValue::Set(transfer.verification_code.clone()),
            verification_attempts: ActiveValue::Set(
                i32::try_from(transfer.verification_attempts).unwrap_or(i32::MAX),
            ),
            metadata: ActiveValue::Set(transfer.metadata.clone()),
        }
    }
}

impl TryFrom<Model> for Transfer {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            reference: model.reference,
            sender_id: model.sender_id,
            receiver_id: model.receiver_id,
            amount: Money::new(model.amount),
            commission: Money::new(model.commission),
            status: TransferStatus::try_from(model.status.as_str())?,
            created_at: model.created_at,
            processed_at: model.processed_at,
            scheduled_for: model.scheduled_for,
            verification_code: model.verification_code,
            verification_attempts: u32::try_from(model.verification_attempts).unwrap_or(0),
            metadata: model.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Percent;

    fn config() -> SystemConfig {
        SystemConfig {
            min_transfer_amount: Money::major(1000),
            transfer_commission_pct: Percent::whole(1),
            transfer_commission_min: Money::major(100),
            ..SystemConfig::default()
        }
    }

    #[test]
    fn new_freezes_commission() {
        let transfer = Transfer::new(
            "alice".into(),
            "bob".into(),
            Money::major(5000),
            &config(),
            json!({}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(transfer.commission, Money::major(100));
        assert_eq!(transfer.total_debit().unwrap(), Money::major(5100));
        assert_eq!(transfer.status, TransferStatus::Pending);
    }

    #[test]
    fn new_rejects_self_transfer_and_small_amounts() {
        let self_transfer = Transfer::new(
            "alice".into(),
            "alice".into(),
            Money::major(5000),
            &config(),
            json!({}),
            Utc::now(),
        );
        assert!(matches!(self_transfer, Err(EngineError::Validation(_))));

        let too_small = Transfer::new(
            "alice".into(),
            "bob".into(),
            Money::major(999),
            &config(),
            json!({}),
            Utc::now(),
        );
        assert!(matches!(too_small, Err(EngineError::Validation(_))));
    }

    #[test]
    fn only_pending_and_scheduled_are_processable() {
        for status in [TransferStatus::Pending, TransferStatus::Scheduled] {
            assert!(status.is_processable());
        }
        for status in [
            TransferStatus::Completed,
            TransferStatus::Failed,
            TransferStatus::Reverted,
            TransferStatus::PendingVerification,
        ] {
            assert!(!status.is_processable());
            assert_eq!(TransferStatus::try_from(status.as_str()).unwrap(), status);
        }
    }
}
