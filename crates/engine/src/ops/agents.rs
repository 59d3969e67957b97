use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    Agency, Agent, AgentCmd, AuditSubject, EngineError, Money, OpContext, ResultEngine,
    agents::{self, agencies},
    audit::{self, AuditAction, AuditRecord},
    pin,
};

use super::{Engine, load_config, normalize_required, wallet_of, with_tx};

pub(super) async fn find_agent_model<C: ConnectionTrait>(
    db: &C,
    agent_id: Uuid,
) -> ResultEngine<agents::Model> {
    agents::Entity::find_by_id(agent_id)
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("agent {agent_id}")))
}

async fn agency_of<C: ConnectionTrait>(db: &C, agent: &agents::Model) -> ResultEngine<Agency> {
    agencies::Entity::find_by_id(agent.agency_id)
        .one(db)
        .await?
        .map(Agency::from)
        .ok_or_else(|| EngineError::KeyNotFound(format!("agency {}", agent.agency_id)))
}

/// Adds `commission` to the agent's running total. Returns the new total.
pub(super) async fn credit_commission<C: ConnectionTrait>(
    db: &C,
    agent: agents::Model,
    commission: Money,
    now: DateTime<Utc>,
) -> ResultEngine<Money> {
    let accumulated = Money::new(agent.accumulated_commission).try_add(commission)?;
    let mut model: agents::ActiveModel = agent.into();
    model.accumulated_commission = ActiveValue::Set(accumulated.minor());
    model.last_activity = ActiveValue::Set(Some(now));
    model.update(db).await?;
    Ok(accumulated)
}

impl Engine {
    /// Creates an agency with a freshly generated encryption key.
    pub async fn create_agency(&self, ctx: &OpContext, code: &str, name: &str) -> ResultEngine<Agency> {
        let name = normalize_required(name, "agency name")?;
        let agency = Agency::new(code.to_string(), name, Utc::now())?;
        with_tx!(self, |db_tx| {
            let exists = agencies::Entity::find()
                .filter(agencies::Column::Code.eq(agency.code.as_str()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(agency.code.clone()));
            }
            agencies::ActiveModel::from(&agency).insert(&db_tx).await?;
            Ok(())
        })?;
        info!(agency = %agency.code, actor = %ctx.actor, "agency created");
        Ok(agency)
    }

    pub async fn agency(&self, code: &str) -> ResultEngine<Agency> {
        agencies::Entity::find()
            .filter(agencies::Column::Code.eq(code))
            .one(&self.database)
            .await?
            .map(Agency::from)
            .ok_or_else(|| EngineError::KeyNotFound(format!("agency {code}")))
    }

    /// Registers an existing user as an agent of an active agency.
    pub async fn create_agent(&self, ctx: &OpContext, cmd: AgentCmd) -> ResultEngine<Agent> {
        let agent_code = normalize_required(&cmd.agent_code, "agent code")?;
        let now = Utc::now();
        let agent = with_tx!(self, |db_tx| {
            wallet_of(&db_tx, &cmd.user).await?;
            let agency = agencies::Entity::find()
                .filter(agencies::Column::Code.eq(cmd.agency_code.trim()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(format!("agency {}", cmd.agency_code)))?;
            if !agency.active {
                return Err(EngineError::Validation(format!(
                    "agency {} is inactive",
                    agency.code
                )));
            }
            let taken = agents::Entity::find()
                .filter(
                    agents::Column::UserId
                        .eq(cmd.user.as_str())
                        .or(agents::Column::AgentCode.eq(agent_code.as_str())),
                )
                .one(&db_tx)
                .await?;
            if let Some(existing) = taken {
                let key = if existing.user_id == cmd.user {
                    existing.user_id
                } else {
                    existing.agent_code
                };
                return Err(EngineError::ExistingKey(key));
            }

            let model = agents::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4()),
                user_id: ActiveValue::Set(cmd.user.clone()),
                agency_id: ActiveValue::Set(agency.id),
                agent_code: ActiveValue::Set(agent_code.clone()),
                accumulated_commission: ActiveValue::Set(0),
                active: ActiveValue::Set(true),
                operations_pin: ActiveValue::Set(None),
                failed_pin_attempts: ActiveValue::Set(0),
                last_activity: ActiveValue::Set(None),
                created_at: ActiveValue::Set(now),
            }
            .insert(&db_tx)
            .await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Agent(model.id),
                AuditRecord::new(
                    AuditAction::AgentCreated,
                    json!({ "agency": agency.code, "agent_code": agent_code }),
                ),
                now,
            )
            .await?;
            Ok(Agent::from(model))
        })?;
        info!(agent = %agent.id, user = %agent.user_id, "agent created");
        Ok(agent)
    }

    pub async fn agent(&self, agent_id: Uuid) -> ResultEngine<Agent> {
        find_agent_model(&self.database, agent_id)
            .await
            .map(Agent::from)
    }

    pub async fn agent_by_user(&self, user: &str) -> ResultEngine<Agent> {
        agents::Entity::find()
            .filter(agents::Column::UserId.eq(user))
            .one(&self.database)
            .await?
            .map(Agent::from)
            .ok_or_else(|| EngineError::KeyNotFound(format!("agent for {user}")))
    }

    /// The oldest active agent, used by the background recharge worker.
    pub async fn first_active_agent(&self) -> ResultEngine<Option<Agent>> {
        Ok(agents::Entity::find()
            .filter(agents::Column::Active.eq(true))
            .order_by_asc(agents::Column::CreatedAt)
            .one(&self.database)
            .await?
            .map(Agent::from))
    }

    /// Activating an agent also clears its failed PIN attempts.
    pub async fn set_agent_active(
        &self,
        ctx: &OpContext,
        agent_id: Uuid,
        active: bool,
    ) -> ResultEngine<Agent> {
        let now = Utc::now();
        let agent = with_tx!(self, |db_tx| {
            let current = find_agent_model(&db_tx, agent_id).await?;
            let mut model: agents::ActiveModel = current.into();
            model.active = ActiveValue::Set(active);
            if active {
                model.failed_pin_attempts = ActiveValue::Set(0);
            }
            let updated = model.update(&db_tx).await?;
            let action = if active {
                AuditAction::AgentActivated
            } else {
                AuditAction::AgentDeactivated
            };
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Agent(agent_id),
                AuditRecord::new(action, json!({})),
                now,
            )
            .await?;
            Ok(Agent::from(updated))
        })?;
        info!(agent = %agent_id, active, "agent status changed");
        Ok(agent)
    }

    /// Seals a new six-digit PIN under the agency key and resets the failed
    /// attempt counter.
    pub async fn set_agent_pin(&self, ctx: &OpContext, agent_id: Uuid, raw_pin: &str) -> ResultEngine<Agent> {
        pin::validate_pin(raw_pin)?;
        let now = Utc::now();
        let agent = with_tx!(self, |db_tx| {
            let current = find_agent_model(&db_tx, agent_id).await?;
            let sealed = agency_of(&db_tx, &current).await?.key()?.seal(raw_pin)?;
            let mut model: agents::ActiveModel = current.into();
            model.operations_pin = ActiveValue::Set(Some(sealed));
            model.failed_pin_attempts = ActiveValue::Set(0);
            let updated = model.update(&db_tx).await?;
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Agent(agent_id),
                AuditRecord::new(AuditAction::PinSet, json!({})),
                now,
            )
            .await?;
            Ok(Agent::from(updated))
        })?;
        info!(agent = %agent_id, "agent PIN set");
        Ok(agent)
    }

    /// `true` when `raw_pin` matches the stored PIN. A missing PIN, a
    /// storage error or a decryption failure all read as `false`.
    pub async fn verify_agent_pin(&self, agent_id: Uuid, raw_pin: &str) -> bool {
        match self.check_agent_pin(agent_id, raw_pin).await {
            Ok(matches) => matches,
            Err(err) => {
                warn!(agent = %agent_id, error = %err, "PIN check failed");
                false
            }
        }
    }

    async fn check_agent_pin(&self, agent_id: Uuid, raw_pin: &str) -> ResultEngine<bool> {
        let agent = find_agent_model(&self.database, agent_id).await?;
        let Some(sealed) = agent.operations_pin.as_deref() else {
            return Ok(false);
        };
        let key = agency_of(&self.database, &agent).await?.key()?;
        Ok(key.matches(sealed, raw_pin))
    }

    /// Checks an active agent's PIN before a money operation.
    ///
    /// Each wrong PIN is counted; the last allowed one deactivates the agent.
    /// Fails with `PinIncorrect` carrying the attempts left.
    pub async fn authorize_agent(&self, ctx: &OpContext, agent_id: Uuid, raw_pin: &str) -> ResultEngine<Agent> {
        let now = Utc::now();
        let outcome = with_tx!(self, |db_tx| {
            let config = load_config(&db_tx).await?;
            let current = find_agent_model(&db_tx, agent_id).await?;
            if !current.active {
                return Err(EngineError::Validation(format!("agent {agent_id} is inactive")));
            }
            let Some(sealed) = current.operations_pin.clone() else {
                return Err(EngineError::Validation(format!("agent {agent_id} has no PIN")));
            };
            let key = agency_of(&db_tx, &current).await?.key()?;
            let attempts = u32::try_from(current.failed_pin_attempts).unwrap_or(0);
            let mut model: agents::ActiveModel = current.into();

            if key.matches(&sealed, raw_pin) {
                model.failed_pin_attempts = ActiveValue::Set(0);
                model.last_activity = ActiveValue::Set(Some(now));
                let updated = model.update(&db_tx).await?;
                return Ok(Ok(Agent::from(updated)));
            }

            let attempts = attempts + 1;
            let remaining = config.max_verification_attempts.saturating_sub(attempts);
            model.failed_pin_attempts = ActiveValue::Set(i32::try_from(attempts).unwrap_or(i32::MAX));
            audit::record(
                &db_tx,
                ctx,
                AuditSubject::Agent(agent_id),
                AuditRecord::new(
                    AuditAction::PinRejected,
                    json!({ "attempts": attempts, "remaining": remaining }),
                )
                .error("PIN mismatch"),
                now,
            )
            .await?;
            if remaining == 0 {
                model.active = ActiveValue::Set(false);
                audit::record(
                    &db_tx,
                    ctx,
                    AuditSubject::Agent(agent_id),
                    AuditRecord::new(AuditAction::AgentLocked, json!({ "attempts": attempts })),
                    now,
                )
                .await?;
            }
            model.update(&db_tx).await?;
            Ok(Err(remaining))
        })?;

        match outcome {
            Ok(agent) => Ok(agent),
            Err(remaining) => {
                warn!(agent = %agent_id, remaining, "wrong agent PIN");
                if remaining == 0 {
                    warn!(agent = %agent_id, "agent locked after too many wrong PINs");
                }
                Err(EngineError::PinIncorrect { remaining })
            }
        }
    }
}
