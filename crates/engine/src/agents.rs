//! Agencies and the agents that process recharges on their behalf.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, pin::AgencyKey};

/// An agency. Its `encryption_key` is generated once and never rotated, so
/// PINs sealed under it stay readable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Agency {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub(crate) encryption_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agency {
    pub(crate) fn new(code: String, name: String, now: DateTime<Utc>) -> ResultEngine<Self> {
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(EngineError::Validation(
                "agency code must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            code,
            name,
            encryption_key: AgencyKey::generate().to_base64(),
            active: true,
            created_at: now,
        })
    }

    pub(crate) fn key(&self) -> ResultEngine<AgencyKey> {
        AgencyKey::from_base64(&self.encryption_key)
    }
}

/// Public view of an agent. The sealed PIN never leaves the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub user_id: String,
    pub agency_id: Uuid,
    pub agent_code: String,
    pub accumulated_commission: Money,
    pub active: bool,
    pub has_pin: bool,
    pub failed_pin_attempts: u32,
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub mod agencies {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "agencies")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub code: String,
        pub name: String,
        pub encryption_key: String,
        pub active: bool,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::Entity")]
        Agents,
    }

    impl Related<super::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Agents.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "agents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub user_id: String,
    pub agency_id: Uuid,
    #[sea_orm(unique)]
    pub agent_code: String,
    pub accumulated_commission: i64,
    pub active: bool,
    pub operations_pin: Option<String>,
    pub failed_pin_attempts: i32,
    pub last_activity: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "agencies::Entity",
        from = "Column::AgencyId",
        to = "agencies::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Agency,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Username",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    User,
}

impl Related<agencies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agency.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Agency> for agencies::ActiveModel {
    fn from(agency: &Agency) -> Self {
        Self {
            id: ActiveValue::Set(agency.id),
            code: ActiveValue::Set(agency.code.clone()),
            name: ActiveValue::Set(agency.name.clone()),
            encryption_key: ActiveValue::Set(agency.encryption_key.clone()),
            active: ActiveValue::Set(agency.active),
            created_at: ActiveValue::Set(agency.created_at),
        }
    }
}

impl From<agencies::Model> for Agency {
    fn from(model: agencies::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            name: model.name,
            encryption_key: model.encryption_key,
            active: model.active,
            created_at: model.created_at,
        }
    }
}

impl From<Model> for Agent {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            agency_id: model.agency_id,
            agent_code: model.agent_code,
            accumulated_commission: Money::new(model.accumulated_commission),
            active: model.active,
            has_pin: model.operations_pin.is_some(),
            failed_pin_attempts: u32::try_from(model.failed_pin_attempts).unwrap_or(0),
            last_activity: model.last_activity,
            created_at: model.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agency_gets_a_usable_key() {
        let agency = Agency::new(" AG01 ".into(), "North".into(), Utc::now()).unwrap();
        assert_eq!(agency.code, "AG01");
        let key = agency.key().unwrap();
        let sealed = key.seal("123456").unwrap();
        assert!(agency.key().unwrap().matches(&sealed, "123456"));
    }

    #[test]
    fn agency_code_is_required() {
        assert!(matches!(
            Agency::new("  ".into(), "x".into(), Utc::now()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn agent_view_hides_the_pin() {
        let now = Utc::now();
        let agent = Agent::from(Model {
            id: Uuid::new_v4(),
            user_id: "carol".into(),
            agency_id: Uuid::new_v4(),
            agent_code: "A-1".into(),
            accumulated_commission: 100_00,
            active: true,
            operations_pin: Some("sealed".into()),
            failed_pin_attempts: 2,
            last_activity: None,
            created_at: now,
        });
        assert!(agent.has_pin);
        assert_eq!(agent.failed_pin_attempts, 2);
        assert_eq!(agent.accumulated_commission, Money::major(100));
    }
}
