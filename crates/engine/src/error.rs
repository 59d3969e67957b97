//! The module contains the errors the engine can throw.
//!
//! The errors are:
//!
//! - [`Validation`] thrown when an input or business rule is violated before
//!   any money moves (amount below minimum, self-transfer, bad PIN format).
//! - [`InsufficientFunds`] thrown when the available balance is too low.
//! - [`DailyLimitExceeded`] thrown when a daily aggregate would be exceeded.
//! - [`InvalidStateTransition`] thrown when an operation is attempted from
//!   the wrong status.
//! - [`PinIncorrect`] thrown when a PIN or verification code does not match.
//! - [`Database`] thrown when the storage fails inside a transaction.
//!
//!  [`Validation`]: EngineError::Validation
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`DailyLimitExceeded`]: EngineError::DailyLimitExceeded
//!  [`InvalidStateTransition`]: EngineError::InvalidStateTransition
//!  [`PinIncorrect`]: EngineError::PinIncorrect
//!  [`Database`]: EngineError::Database
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Daily limit exceeded: {0}")]
    DailyLimitExceeded(String),
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("Incorrect PIN, {remaining} attempts left")]
    PinIncorrect { remaining: u32 },
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Crypto failure: {0}")]
    Crypto(String),
    #[error("Persistence error: {0}")]
    Database(#[from] DbErr),
}

/// Coarse classification of an [`EngineError`], stable enough to map onto
/// response codes by whoever sits in front of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    DailyLimitExceeded,
    InvalidStateTransition,
    PinIncorrect,
    NotFound,
    Conflict,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InsufficientFunds => "insufficient_funds",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::PinIncorrect => "pin_incorrect",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Persistence => "persistence",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Self::DailyLimitExceeded(_) => ErrorKind::DailyLimitExceeded,
            Self::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            Self::PinIncorrect { .. } => ErrorKind::PinIncorrect,
            Self::KeyNotFound(_) => ErrorKind::NotFound,
            Self::ExistingKey(_) => ErrorKind::Conflict,
            Self::Crypto(_) | Self::Database(_) => ErrorKind::Persistence,
        }
    }

    /// Message safe to show to a caller: storage and crypto internals are
    /// replaced by a generic text.
    pub fn safe_message(&self) -> String {
        match self {
            Self::Crypto(_) | Self::Database(_) => "internal ledger error".to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::DailyLimitExceeded(a), Self::DailyLimitExceeded(b)) => a == b,
            (Self::InvalidStateTransition(a), Self::InvalidStateTransition(b)) => a == b,
            (Self::PinIncorrect { remaining: a }, Self::PinIncorrect { remaining: b }) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::Crypto(a), Self::Crypto(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_message_hides_storage_details() {
        let err = EngineError::Database(DbErr::Custom("disk I/O error at page 42".to_string()));
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(err.safe_message(), "internal ledger error");
    }

    #[test]
    fn pin_incorrect_reports_remaining_attempts() {
        let err = EngineError::PinIncorrect { remaining: 2 };
        assert_eq!(err.kind().as_str(), "pin_incorrect");
        assert_eq!(err.safe_message(), "Incorrect PIN, 2 attempts left");
    }
}
