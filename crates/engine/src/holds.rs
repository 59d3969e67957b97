//! Escrow holds.
//!
//! A hold reserves part of a wallet's balance for a limited time. While it is
//! `ACTIVE` the reserved amount is counted in `held_balance`, so it stays in
//! the total balance but cannot be spent. Every hold ends in exactly one of
//! `RELEASED`, `APPLIED` or `CANCELLED`.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Active,
    Released,
    Applied,
    Cancelled,
}

impl HoldStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Released => "RELEASED",
            Self::Applied => "APPLIED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl TryFrom<&str> for HoldStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "RELEASED" => Ok(Self::Released),
            "APPLIED" => Ok(Self::Applied),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "invalid hold status: {other}"
            ))),
        }
    }
}

/// Kind of record a hold was created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedEntityType {
    Order,
    Transfer,
    Recharge,
    External,
}

impl RelatedEntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Transfer => "transfer",
            Self::Recharge => "recharge",
            Self::External => "external",
        }
    }
}

impl TryFrom<&str> for RelatedEntityType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "order" => Ok(Self::Order),
            "transfer" => Ok(Self::Transfer),
            "recharge" => Ok(Self::Recharge),
            "external" => Ok(Self::External),
            other => Err(EngineError::Validation(format!(
                "invalid related entity type: {other}"
            ))),
        }
    }
}

/// Non-owning back-reference to the record that caused a hold. Nothing
/// cascades through it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity_type: RelatedEntityType,
    pub entity_id: String,
}

impl RelatedEntity {
    pub fn new(entity_type: RelatedEntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub reference: Uuid,
    pub user_id: String,
    pub amount: Money,
    pub status: HoldStatus,
    pub reason: String,
    pub related: Option<RelatedEntity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub(crate) fn new(
        user_id: String,
        amount: Money,
        reason: String,
        related: Option<RelatedEntity>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(
                "hold amount must be > 0".to_string(),
            ));
        }
        if expires_at <= created_at {
            return Err(EngineError::Validation(
                "hold must expire after its creation".to_string(),
            ));
        }
        Ok(Self {
            reference: Uuid::new_v4(),
            user_id,
            amount,
            status: HoldStatus::Active,
            reason,
            related,
            created_at,
            updated_at: created_at,
            expires_at,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && self.expires_at <= now
    }

    /// Guard for `release` / `apply` / `cancel`.
    pub(crate) fn ensure_active(&self, action: &str) -> ResultEngine<()> {
        if self.status != HoldStatus::Active {
            return Err(EngineError::InvalidStateTransition(format!(
                "cannot {action} hold {} in status {}",
                self.reference,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "holds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub reference: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub status: String,
    pub reason: String,
    pub related_type: Option<String>,
    pub related_id: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
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
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Hold> for ActiveModel {
    fn from(hold: &Hold) -> Self {
        Self {
            reference: ActiveValue::Set(hold.reference),
            user_id: ActiveValue::Set(hold.user_id.clone()),
            amount: ActiveValue::Set(hold.amount.minor()),
            status: ActiveValue::Set(hold.status.as_str().to_string()),
            reason: ActiveValue::Set(hold.reason.clone()),
            related_type: ActiveValue::Set(
                hold.related
                    .as_ref()
                    .map(|r| r.entity_type.as_str().to_string()),
            ),
            related_id: ActiveValue::Set(hold.related.as_ref().map(|r| r.entity_id.clone())),
            created_at: ActiveValue::Set(hold.created_at),
            updated_at: ActiveValue::Set(hold.updated_at),
            expires_at: ActiveValue::Set(hold.expires_at),
        }
    }
}

impl TryFrom<Model> for Hold {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let related = match (model.related_type, model.related_id) {
            (Some(kind), Some(id)) => Some(RelatedEntity {
                entity_type: RelatedEntityType::try_from(kind.as_str())?,
                entity_id: id,
            }),
            _ => None,
        };
        Ok(Self {
            reference: model.reference,
            user_id: model.user_id,
            amount: Money::new(model.amount),
            status: HoldStatus::try_from(model.status.as_str())?,
            reason: model.reason,
            related,
            created_at: model.created_at,
            updated_at: model.updated_at,
            expires_at: model.expires_at,
        })
    }
}
