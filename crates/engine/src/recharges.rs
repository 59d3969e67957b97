//! Agent-mediated wallet top-ups.
//!
//! The agent commission and the net amount credited to the user are frozen
//! when the recharge is created. Processing never recomputes them, even if the
//! configured agent rate changed in between.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, SystemConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RechargeStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl RechargeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl TryFrom<&str> for RechargeStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(EngineError::Validation(format!(
                "invalid recharge status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recharge {
    pub reference: Uuid,
    pub user_id: String,
    /// Set when an agent processes the recharge.
    pub agent_id: Option<Uuid>,
    pub amount: Money,
    pub agent_commission: Money,
    pub net_amount: Money,
    pub status: RechargeStatus,
    pub payment_method: String,
    pub payment_data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Recharge {
    pub(crate) fn new(
        user_id: String,
        amount: Money,
        payment_method: String,
        payment_data: Value,
        config: &SystemConfig,
        now: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(
                "recharge amount must be > 0".to_string(),
            ));
        }
        if payment_method.trim().is_empty() {
            return Err(EngineError::Validation(
                "payment method must not be empty".to_string(),
            ));
        }
        let agent_commission = config.agent_commission(amount);
        Ok(Self {
            reference: Uuid::new_v4(),
            user_id,
            agent_id: None,
            amount,
            agent_commission,
            net_amount: amount - agent_commission,
            status: RechargeStatus::Pending,
            payment_method,
            payment_data,
            created_at: now,
            updated_at: now,
            processed_at: None,
        })
    }

    /// `process` accepts a fresh recharge or one claimed by async dispatch.
    pub(crate) fn ensure_processable(&self) -> ResultEngine<()> {
        match self.status {
            RechargeStatus::Pending | RechargeStatus::InProgress => Ok(()),
            other => Err(EngineError::InvalidStateTransition(format!(
                "recharge {} is {}",
                self.reference,
                other.as_str()
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "recharges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub reference: Uuid,
    pub user_id: String,
    pub agent_id: Option<Uuid>,
    pub amount: i64,
    pub agent_commission: i64,
    pub net_amount: i64,
    pub status: String,
    pub payment_method: String,
    pub payment_data: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Username",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::agents::Entity",
        from = "Column::AgentId",
        to = "super::agents::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Agent,
}

impl Related<super::agents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Recharge> for ActiveModel {
    fn from(recharge: &Recharge) -> Self {
        Self {
            reference: ActiveValue::Set(recharge.reference),
            user_id: ActiveValue::Set(recharge.user_id.clone()),
            agent_id: ActiveValue::Set(recharge.agent_id),
            amount: ActiveValue::Set(recharge.amount.minor()),
            agent_commission: ActiveValue::Set(recharge.agent_commission.minor()),
            net_amount: ActiveValue::Set(recharge.net_amount.minor()),
            status: ActiveValue::Set(recharge.status.as_str().to_string()),
            payment_method: ActiveValue::Set(recharge.payment_method.clone()),
            payment_data: ActiveValue::Set(recharge.payment_data.clone()),
            created_at: ActiveValue::Set(recharge.created_at),
            updated_at: ActiveValue::Set(recharge.updated_at),
            processed_at: ActiveValue::Set(recharge.processed_at),
        }
    }
}

impl TryFrom<Model> for Recharge {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            reference: model.reference,
            user_id: model.user_id,
            agent_id: model.agent_id,
            amount: Money::new(model.amount),
            agent_commission: Money::new(model.agent_commission),
            net_amount: Money::new(model.net_amount),
            status: RechargeStatus::try_from(model.status.as_str())?,
            payment_method: model.payment_method,
            payment_data: model.payment_data,
            created_at: model.created_at,
            updated_at: model.updated_at,
            processed_at: model.processed_at,
        })
    }
}
