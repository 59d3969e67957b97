//! Wallet ledger and settlement engine.
//!
//! [`Engine`] owns the database handle and exposes every money-moving
//! operation: transfers, agent recharges, escrow holds and manual
//! adjustments. Each operation runs in one database transaction that locks the
//! wallets it touches, writes the audit trail and the notification outbox, and
//! either commits everything or nothing.

pub use agents::{Agency, Agent};
pub use audit::{AuditAction, AuditEntry, AuditSubject};
pub use commands::{AgentCmd, HoldCmd, RechargeCmd, TransferCmd};
pub use config::{HoldExpiryPolicy, SystemConfig};
pub use context::OpContext;
pub use error::{EngineError, ErrorKind};
pub use holds::{Hold, HoldStatus, RelatedEntity, RelatedEntityType};
pub use money::{Money, Percent};
pub use notifications::{Notification, NotificationKind};
pub use ops::{
    AgencyStatistics, AgentStatistics, Engine, EngineBuilder, ReconciliationReport,
    ScheduledExecution, SweepReport, WalletStatistics,
};
pub use pin::validate_pin;
pub use recharges::{Recharge, RechargeStatus};
pub use transfers::{Transfer, TransferStatus};
pub use wallets::{Wallet, WalletSnapshot};

mod agents;
mod audit;
mod commands;
mod config;
mod context;
mod error;
mod holds;
mod locks;
mod money;
mod notifications;
mod ops;
mod pin;
mod recharges;
mod transfers;
mod users;
mod wallets;

type ResultEngine<T> = Result<T, EngineError>;
