//! The module contains `Wallet` struct and its implementation.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine};

/// A wallet.
///
/// Every user owns exactly one wallet, created together with the user. Funds
/// reserved by active holds stay inside `balance` and are mirrored in
/// `held_balance`; only the difference can be spent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wallet {
    /// Stable identifier, also the global lock order key.
    pub id: Uuid,
    pub user_id: String,
    pub balance: Money,
    pub held_balance: Money,
    pub credit_limit: Money,
    pub verification_level: i32,
    pub updated_at: DateTime<Utc>,
}

/// Balance pair captured in wallet audit rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub balance: Money,
    pub held_balance: Money,
}

/// A change to apply to both balance fields at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct WalletDelta {
    pub balance: Money,
    pub held: Money,
}

impl WalletDelta {
    pub(crate) fn balance(delta: Money) -> Self {
        Self {
            balance: delta,
            held: Money::ZERO,
        }
    }

    pub(crate) fn held(delta: Money) -> Self {
        Self {
            balance: Money::ZERO,
            held: delta,
        }
    }
}

impl Wallet {
    pub fn new(user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Money::ZERO,
            held_balance: Money::ZERO,
            credit_limit: Money::ZERO,
            verification_level: 1,
            updated_at: now,
        }
    }

    /// `balance - held_balance`; never stored.
    pub fn available_balance(&self) -> Money {
        self.balance - self.held_balance
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            balance: self.balance,
            held_balance: self.held_balance,
        }
    }

    /// Returns the wallet with `delta` applied. Only overflow is checked here;
    /// spending rules belong to the caller.
    pub(crate) fn with_delta(&self, delta: WalletDelta) -> ResultEngine<Wallet> {
        let overflow = || EngineError::Validation("balance overflow".to_string());
        let mut next = self.clone();
        next.balance = self.balance.checked_add(delta.balance).ok_or_else(overflow)?;
        next.held_balance = self
            .held_balance
            .checked_add(delta.held)
            .ok_or_else(overflow)?;
        Ok(next)
    }

    /// Fails with `InsufficientFunds` unless `amount` can be spent.
    pub(crate) fn ensure_available(&self, amount: Money) -> ResultEngine<()> {
        if self.available_balance() < amount {
            return Err(EngineError::InsufficientFunds(format!(
                "available {} is less than {}",
                self.available_balance(),
                amount
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub user_id: String,
    pub balance: i64,
    pub held_balance: i64,
    pub credit_limit: i64,
    pub verification_level: i32,
    pub updated_at: DateTimeUtc,
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

impl From<&Wallet> for ActiveModel {
    fn from(value: &Wallet) -> Self {
        Self {
            id: ActiveValue::Set(value.id),
            user_id: ActiveValue::Set(value.user_id.clone()),
            balance: ActiveValue::Set(value.balance.minor()),
            held_balance: ActiveValue::Set(value.held_balance.minor()),
            credit_limit: ActiveValue::Set(value.credit_limit.minor()),
            verification_level: ActiveValue::Set(value.verification_level),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl From<Model> for Wallet {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            balance: Money::new(model.balance),
            held_balance: Money::new(model.held_balance),
            credit_limit: Money::new(model.credit_limit),
            verification_level: model.verification_level,
            updated_at: model.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(balance: i64, held: i64) -> Wallet {
        let mut wallet = Wallet::new("alice".to_string(), Utc::now());
        wallet.balance = Money::new(balance);
        wallet.held_balance = Money::new(held);
        wallet
    }

    #[test]
    fn available_balance_subtracts_held_funds() {
        let wallet = wallet(5000_00, 2000_00);
        assert_eq!(wallet.available_balance(), Money::new(3000_00));
    }

    #[test]
    fn with_delta_moves_both_fields() {
        let wallet = wallet(5000_00, 2000_00);
        let next = wallet
            .with_delta(WalletDelta {
                balance: Money::new(-2000_00),
                held: Money::new(-2000_00),
            })
            .unwrap();
        assert_eq!(next.balance, Money::new(3000_00));
        assert_eq!(next.held_balance, Money::ZERO);
        assert_eq!(wallet.balance, Money::new(5000_00));
    }

    #[test]
    fn ensure_available_rejects_spending_held_funds() {
        let wallet = wallet(5000_00, 2000_00);
        assert!(wallet.ensure_available(Money::new(3000_00)).is_ok());
        assert!(matches!(
            wallet.ensure_available(Money::new(3000_01)),
            Err(EngineError::InsufficientFunds(_))
        ));
    }
}
