use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, QueryFilter, QueryOrder, QuerySelect,
    prelude::*,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    EngineError, OpContext, ResultEngine, SystemConfig, Wallet,
    audit::{self, AuditAction},
    config,
    locks::WalletLocks,
    wallets::{self, WalletDelta},
};

mod agents;
mod audit_trail;
mod holds;
mod notifications;
mod recharges;
mod settings;
mod transfers;
mod users;
mod wallet_ops;

pub use holds::SweepReport;
pub use transfers::ScheduledExecution;
pub use wallet_ops::{AgencyStatistics, AgentStatistics, ReconciliationReport, WalletStatistics};

/// Run a block inside a DB transaction, committing on success and rolling back
/// on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = async { $body }.await;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = $tx.rollback().await {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }};
}

pub(crate) use with_tx;

#[derive(Clone, Debug)]
pub struct Engine {
    database: DatabaseConnection,
    locks: Arc<WalletLocks>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// Reads the configuration singleton, falling back to defaults when the row
/// was never written.
async fn load_config<C: ConnectionTrait>(db: &C) -> ResultEngine<SystemConfig> {
    match config::Entity::find_by_id(config::SINGLETON_ID).one(db).await? {
        Some(model) => SystemConfig::try_from(model),
        None => Ok(SystemConfig::default()),
    }
}

async fn wallet_of<C: ConnectionTrait>(db: &C, user: &str) -> ResultEngine<Wallet> {
    wallets::Entity::find()
        .filter(wallets::Column::UserId.eq(user))
        .one(db)
        .await?
        .map(Wallet::from)
        .ok_or_else(|| EngineError::KeyNotFound(format!("wallet of {user}")))
}

/// Re-reads the wallets inside the transaction with `SELECT ... FOR UPDATE`
/// where the backend has row locks. On SQLite the in-process `WalletLocks`
/// plus the single writer give the same guarantee.
async fn lock_wallet_rows<C: ConnectionTrait>(db: &C, ids: &[Uuid]) -> ResultEngine<Vec<Wallet>> {
    let mut query = wallets::Entity::find()
        .filter(wallets::Column::Id.is_in(ids.iter().copied()))
        .order_by_asc(wallets::Column::Id);
    if db.get_database_backend() != DbBackend::Sqlite {
        query = query.lock_exclusive();
    }
    let wallets: Vec<Wallet> = query.all(db).await?.into_iter().map(Wallet::from).collect();
    if wallets.len() != ids.len() {
        return Err(EngineError::KeyNotFound("wallet".to_string()));
    }
    Ok(wallets)
}

fn pick(wallets: &[Wallet], id: Uuid) -> ResultEngine<Wallet> {
    wallets
        .iter()
        .find(|w| w.id == id)
        .cloned()
        .ok_or_else(|| EngineError::KeyNotFound(id.to_string()))
}

/// The single balance mutation primitive.
///
/// Applies `delta` to the locked `wallet`, persists it and appends a wallet
/// audit row with the before/after snapshots and `reason`. Spending rules are
/// checked by the caller.
#[allow(clippy::too_many_arguments)]
async fn adjust<C: ConnectionTrait>(
    db: &C,
    ctx: &OpContext,
    wallet: &Wallet,
    delta: WalletDelta,
    action: AuditAction,
    reason: &str,
    reference: Option<Uuid>,
    now: DateTime<Utc>,
) -> ResultEngine<Wallet> {
    let mut next = wallet.with_delta(delta)?;
    next.updated_at = now;
    wallets::ActiveModel::from(&next).update(db).await?;

    audit::record_wallet(
        db,
        ctx,
        wallet.id,
        action,
        wallet.snapshot(),
        next.snapshot(),
        json!({
            "reason": reason,
            "balance_delta": delta.balance,
            "held_delta": delta.held,
            "reference": reference,
        }),
        now,
    )
    .await?;
    Ok(next)
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let day = now.date_naive();
    day.with_day(1)
        .unwrap_or(day)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn normalize_required(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{label} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            locks: Arc::new(WalletLocks::default()),
        })
    }
}
