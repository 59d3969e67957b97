//! Command structs for engine operations.
//!
//! These types group parameters for the write operations that take more than
//! a couple of arguments, keeping call sites readable.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{Money, RelatedEntity};

/// Request a peer-to-peer transfer.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub sender: String,
    pub receiver: String,
    pub amount: Money,
    pub metadata: Value,
    /// Create the transfer already `SCHEDULED` for this instant.
    pub execute_at: Option<DateTime<Utc>>,
}

impl TransferCmd {
    #[must_use]
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: Money) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            metadata: Value::Object(Default::default()),
            execute_at: None,
        }
    }

    #[must_use]
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn execute_at(mut self, at: DateTime<Utc>) -> Self {
        self.execute_at = Some(at);
        self
    }
}

/// Request a wallet top-up.
#[derive(Clone, Debug)]
pub struct RechargeCmd {
    pub user: String,
    pub amount: Money,
    pub payment_method: String,
    pub payment_data: Value,
}

impl RechargeCmd {
    #[must_use]
    pub fn new(user: impl Into<String>, amount: Money, payment_method: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            amount,
            payment_method: payment_method.into(),
            payment_data: Value::Object(Default::default()),
        }
    }

    #[must_use]
    pub fn payment_data(mut self, data: Value) -> Self {
        self.payment_data = data;
        self
    }
}

/// Reserve funds in a wallet.
#[derive(Clone, Debug)]
pub struct HoldCmd {
    pub user: String,
    pub amount: Money,
    pub reason: String,
    /// Falls back to `SystemConfig::default_hold_days`.
    pub expires_in_days: Option<u32>,
    pub related: Option<RelatedEntity>,
}

impl HoldCmd {
    #[must_use]
    pub fn new(user: impl Into<String>, amount: Money, reason: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            amount,
            reason: reason.into(),
            expires_in_days: None,
            related: None,
        }
    }

    #[must_use]
    pub fn expires_in_days(mut self, days: u32) -> Self {
        self.expires_in_days = Some(days);
        self
    }

    #[must_use]
    pub fn related(mut self, related: RelatedEntity) -> Self {
        self.related = Some(related);
        self
    }
}

/// Register an agent under an agency.
#[derive(Clone, Debug)]
pub struct AgentCmd {
    pub user: String,
    pub agency_code: String,
    pub agent_code: String,
}

impl AgentCmd {
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        agency_code: impl Into<String>,
        agent_code: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            agency_code: agency_code.into(),
            agent_code: agent_code.into(),
        }
    }
}
