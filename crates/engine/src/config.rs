//! The system-wide business configuration.
//!
//! A single row (`id = 1`) holds the limits and commission rates every ledger
//! operation reads. It is loaded inside the operation's own transaction, so a
//! change only affects operations that start afterwards.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Money, Percent, ResultEngine};

/// Longest hold a configuration may ask for by default: ten years.
pub const MAX_HOLD_DAYS: u32 = 3_650;

pub(crate) const SINGLETON_ID: i32 = 1;

/// What the expiry sweep does with an `ACTIVE` hold whose deadline passed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldExpiryPolicy {
    /// Give the funds back to the wallet owner.
    #[default]
    Release,
    /// Settle the hold as if `apply` had been called.
    Apply,
}

impl HoldExpiryPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Apply => "apply",
        }
    }
}

impl TryFrom<&str> for HoldExpiryPolicy {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "release" => Ok(Self::Release),
            "apply" => Ok(Self::Apply),
            other => Err(EngineError::Validation(format!(
                "invalid hold expiry policy: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub daily_transfer_limit: Money,
    pub daily_recharge_limit: Money,
    pub min_transfer_amount: Money,
    pub transfer_commission_pct: Percent,
    pub transfer_commission_min: Money,
    pub agent_commission_pct: Percent,
    /// Transfers at or above this amount need a verification code.
    pub verification_threshold: Money,
    pub max_verification_attempts: u32,
    pub max_daily_operations: u32,
    pub hold_expiry_policy: HoldExpiryPolicy,
    pub default_hold_days: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            daily_transfer_limit: Money::major(500_000),
            daily_recharge_limit: Money::major(100_000),
            min_transfer_amount: Money::major(1_000),
            transfer_commission_pct: Percent::whole(1),
            transfer_commission_min: Money::major(100),
            agent_commission_pct: Percent::whole(1),
            verification_threshold: Money::major(50_000),
            max_verification_attempts: 3,
            max_daily_operations: 10,
            hold_expiry_policy: HoldExpiryPolicy::Release,
            default_hold_days: 3,
        }
    }
}

impl SystemConfig {
    /// Commission charged to the sender of a transfer:
    /// `max(amount × pct / 100, minimum)`, rounded half-up to the minor unit.
    pub fn transfer_commission(&self, amount: Money) -> Money {
        self.transfer_commission_pct
            .of(amount)
            .max(self.transfer_commission_min)
    }

    /// Share of a recharge paid to the processing agent.
    pub fn agent_commission(&self, amount: Money) -> Money {
        self.agent_commission_pct.of(amount)
    }

    pub(crate) fn validate(&self) -> ResultEngine<()> {
        let non_negative = [
            ("daily_transfer_limit", self.daily_transfer_limit),
            ("daily_recharge_limit", self.daily_recharge_limit),
            ("min_transfer_amount", self.min_transfer_amount),
            ("transfer_commission_min", self.transfer_commission_min),
            ("verification_threshold", self.verification_threshold),
        ];
        for (name, value) in non_negative {
            if value.is_negative() {
                return Err(EngineError::Validation(format!("{name} must be >= 0")));
            }
        }
        for (name, pct) in [
            ("transfer_commission_pct", self.transfer_commission_pct),
            ("agent_commission_pct", self.agent_commission_pct),
        ] {
            if pct < Percent::ZERO || pct > Percent::HUNDRED {
                return Err(EngineError::Validation(format!(
                    "{name} must be between 0 and 100"
                )));
            }
        }
        if self.max_verification_attempts == 0 {
            return Err(EngineError::Validation(
                "max_verification_attempts must be > 0".to_string(),
            ));
        }
        if self.default_hold_days == 0 || self.default_hold_days > MAX_HOLD_DAYS {
            return Err(EngineError::Validation(format!(
                "default_hold_days must be between 1 and {MAX_HOLD_DAYS}"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "system_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub daily_transfer_limit: i64,
    pub daily_recharge_limit: i64,
    pub min_transfer_amount: i64,
    pub transfer_commission_pct: i64,
    pub transfer_commission_min: i64,
    pub agent_commission_pct: i64,
    pub verification_threshold: i64,
    pub max_verification_attempts: i32,
    pub max_daily_operations: i32,
    pub hold_expiry_policy: String,
    pub default_hold_days: i32,
    pub updated_at: DateTimeUtc,
    pub updated_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn count_to_db(value: u32, name: &str) -> ResultEngine<i32> {
    i32::try_from(value).map_err(|_| EngineError::Validation(format!("{name} is too large")))
}

fn count_from_db(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

impl ActiveModel {
    pub(crate) fn from_config(
        config: &SystemConfig,
        updated_at: DateTimeUtc,
        updated_by: Option<String>,
    ) -> ResultEngine<Self> {
        Ok(Self {
            id: ActiveValue::Set(SINGLETON_ID),
            daily_transfer_limit: ActiveValue::Set(config.daily_transfer_limit.minor()),
            daily_recharge_limit: ActiveValue::Set(config.daily_recharge_limit.minor()),
            min_transfer_amount: ActiveValue::Set(config.min_transfer_amount.minor()),
            transfer_commission_pct: ActiveValue::Set(config.transfer_commission_pct.hundredths()),
            transfer_commission_min: ActiveValue::Set(config.transfer_commission_min.minor()),
            agent_commission_pct: ActiveValue::Set(config.agent_commission_pct.hundredths()),
            verification_threshold: ActiveValue::Set(config.verification_threshold.minor()),
            max_verification_attempts: ActiveValue::Set(count_to_db(
                config.max_verification_attempts,
                "max_verification_attempts",
            )?),
            max_daily_operations: ActiveValue::Set(count_to_db(
                config.max_daily_operations,
                "max_daily_operations",
            )?),
            hold_expiry_policy: ActiveValue::Set(config.hold_expiry_policy.as_str().to_string()),
            default_hold_days: ActiveValue::Set(count_to_db(
                config.default_hold_days,
                "default_hold_days",
            )?),
            updated_at: ActiveValue::Set(updated_at),
            updated_by: ActiveValue::Set(updated_by),
        })
    }
}

impl TryFrom<Model> for SystemConfig {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            daily_transfer_limit: Money::new(model.daily_transfer_limit),
            daily_recharge_limit: Money::new(model.daily_recharge_limit),
            min_transfer_amount: Money::new(model.min_transfer_amount),
            transfer_commission_pct: Percent::new(model.transfer_commission_pct),
            transfer_commission_min: Money::new(model.transfer_commission_min),
            agent_commission_pct: Percent::new(model.agent_commission_pct),
            verification_threshold: Money::new(model.verification_threshold),
            max_verification_attempts: count_from_db(model.max_verification_attempts),
            max_daily_operations: count_from_db(model.max_daily_operations),
            hold_expiry_policy: HoldExpiryPolicy::try_from(model.hold_expiry_policy.as_str())?,
            default_hold_days: count_from_db(model.default_hold_days),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_commission_uses_minimum_when_percentage_is_lower() {
        let config = SystemConfig {
            min_transfer_amount: Money::major(1000),
            transfer_commission_pct: Percent::whole(1),
            transfer_commission_min: Money::major(100),
            ..SystemConfig::default()
        };
        assert_eq!(
            config.transfer_commission(Money::major(5000)),
            Money::major(100)
        );
        assert_eq!(
            config.transfer_commission(Money::major(20_000)),
            Money::major(200)
        );
    }

    #[test]
    fn agent_commission_is_a_plain_percentage() {
        let config = SystemConfig::default();
        assert_eq!(config.agent_commission(Money::major(10_000)), Money::major(100));
    }

    #[test]
    fn validate_rejects_out_of_range_percentages() {
        let config = SystemConfig {
            agent_commission_pct: Percent::whole(101),
            ..SystemConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Validation(_))));
        assert!(SystemConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_bounds_default_hold_days() {
        for days in [0, MAX_HOLD_DAYS + 1, u32::MAX] {
            let config = SystemConfig {
                default_hold_days: days,
                ..SystemConfig::default()
            };
            assert!(matches!(config.validate(), Err(EngineError::Validation(_))));
        }
        let config = SystemConfig {
            default_hold_days: MAX_HOLD_DAYS,
            ..SystemConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
