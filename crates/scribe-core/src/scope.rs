//! Capture state owned by a single transaction.

use crate::auditor::Auditor;
use crate::changes::ChangeSource;
use crate::entity::EntitySnapshot;
use crate::errors::CoreError;
use crate::interceptor::{CommitInterceptor, StatementVerdict};
use crate::record::AuditRecord;
use crate::staging::StagingBuffer;

/// Staging buffer, interceptor state and injected actor of one transaction.
///
/// Dropped together with its transaction, so nothing staged in one
/// transaction can be flushed by another.
#[derive(Debug, Default)]
pub struct TransactionScope {
    buffer: StagingBuffer,
    interceptor: CommitInterceptor,
    actor: Option<EntitySnapshot>,
}

impl TransactionScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the pending changes of `source`; arms the interceptor as soon
    /// as anything is staged. Returns the number of new entries.
    pub fn observe(&mut self, auditor: &Auditor, source: &dyn ChangeSource) -> usize {
        let staged = self
            .buffer
            .observe(&auditor.builder(source), auditor.filter());
        if !self.buffer.is_empty() && self.interceptor.arm() {
            tracing::debug!("commit interceptor armed");
        }
        staged
    }

    /// Record `actor` on every record of this transaction instead of asking
    /// the auditor's blamer.
    pub fn blame_as(&mut self, actor: EntitySnapshot) {
        self.actor = Some(actor);
    }

    /// Pass a statement through the interceptor.
    pub fn inspect(&mut self, sql: &str) -> StatementVerdict {
        self.interceptor.observe_statement(sql)
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.interceptor.is_armed()
    }

    #[must_use]
    pub fn staged(&self) -> &StagingBuffer {
        &self.buffer
    }

    /// Build the records to write before COMMIT. Disarms and drains the
    /// buffer whether or not building succeeds.
    ///
    /// # Errors
    ///
    /// Propagates configuration errors from the record builder.
    pub fn before_commit(
        &mut self,
        auditor: &Auditor,
        source: &dyn ChangeSource,
    ) -> Result<Vec<AuditRecord>, CoreError> {
        self.interceptor.disarm();
        let actor = self.actor.clone().or_else(|| auditor.actor());
        self.buffer
            .build_records(&auditor.builder(source), actor.as_ref())
    }
}
