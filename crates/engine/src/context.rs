//! Explicit operation context.
//!
//! Every mutating engine call receives an [`OpContext`] describing who asked
//! for it. The actor and request id end up on each audit row written by
//! the call.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpContext {
    /// Username (or service name) responsible for the operation.
    pub actor: String,
    /// Correlation id of the inbound request, if any.
    pub request_id: Option<String>,
}

impl OpContext {
    #[must_use]
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            request_id: None,
        }
    }

    /// Context for jobs the runner executes on its own (sweeps, scheduled
    /// transfers).
    #[must_use]
    pub fn system() -> Self {
        Self::new("system")
    }

    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
