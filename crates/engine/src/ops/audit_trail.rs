use crate::{AuditEntry, AuditSubject, ResultEngine, audit};

use super::Engine;

impl Engine {
    /// Every audit row about `subject`, oldest first, failed attempts
    /// included.
    pub async fn audit_trail(&self, subject: AuditSubject) -> ResultEngine<Vec<AuditEntry>> {
        audit::trail(&self.database, subject).await
    }
}
