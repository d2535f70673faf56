//! The lifecycle transaction contract.

use crate::artifact::{Artifact, ArtifactId};
use crate::error::{CoreError, CoreResult};
use crate::types::{OperationId, OperationType};
use parking_lot::Mutex;
use std::sync::Arc;

/// State of a lifecycle transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// A transaction over the artifact set of one maintenance operation.
///
/// Implemented by the single-party [`TrackedTransaction`] and by the
/// per-sub-task [`PartialLifecycleTransaction`], so a sub-task can be
/// handed either without caring whether it shares the operation with
/// siblings.
///
/// `commit` and `abort` take an optional prior error. Passing `Some` is
/// an API misuse and fails with [`CoreError::PrecheckFailed`]: a caller
/// holding an error must handle it by aborting, not smuggle it through
/// the commit path.
///
/// [`TrackedTransaction`]: crate::lifecycle::TrackedTransaction
/// [`PartialLifecycleTransaction`]: crate::lifecycle::PartialLifecycleTransaction
pub trait LifecycleTransaction: Send {
    /// Records or replaces tracked artifact instances. With
    /// `original = true` the artifacts join the operation's input set,
    /// otherwise they are staged as newly produced output.
    fn update(&mut self, artifacts: Vec<Artifact>, original: bool) -> CoreResult<()>;

    /// Stages a newly produced artifact.
    fn track_new(&mut self, artifact: Artifact) -> CoreResult<()>;

    /// Removes a staged artifact that will not be kept.
    fn untrack_new(&mut self, artifact: &Artifact) -> CoreResult<()>;

    /// Stops tracking an original artifact; it is left untouched by the
    /// operation.
    fn cancel(&mut self, artifact: &Artifact) -> CoreResult<()>;

    /// Returns the latest tracked instance for an artifact, if any.
    fn current(&self, id: ArtifactId) -> Option<Artifact>;

    /// Marks one original artifact for removal at commit.
    fn obsolete(&mut self, artifact: &Artifact) -> CoreResult<()>;

    /// Reports whether a tracked artifact is marked for removal.
    fn is_obsolete(&self, id: ArtifactId) -> CoreResult<bool>;

    /// Marks every original artifact for removal at commit.
    fn obsolete_originals(&mut self) -> CoreResult<()>;

    /// Returns a snapshot of the original artifact set.
    fn originals(&self) -> Vec<Artifact>;

    /// Publishes staged artifacts so far.
    fn checkpoint(&mut self) -> CoreResult<()>;

    /// Performs all remaining work ahead of the commit point.
    fn prepare_to_commit(&mut self) -> CoreResult<()>;

    /// Commits the transaction. At most once per transaction.
    fn commit(&mut self, prior: Option<CoreError>) -> CoreResult<()>;

    /// Aborts the transaction, discarding staged artifacts. At most once
    /// per transaction.
    fn abort(&mut self, prior: Option<CoreError>) -> CoreResult<()>;

    /// Returns the operation classification.
    fn op_type(&self) -> OperationType;

    /// Whether the operation runs outside the live data set (offline
    /// tooling rather than a serving node).
    fn is_offline(&self) -> bool;

    /// Returns the operation ID.
    fn op_id(&self) -> OperationId;

    /// Human-readable operation ID.
    fn op_id_string(&self) -> String {
        self.op_id().to_string()
    }
}

/// The shared handle to one main transaction.
///
/// The mutex is the single mutual-exclusion domain for every partial of
/// a composite: all mutating forwards lock it, so two partials never
/// interleave writes to the tracked artifact set.
pub type SharedTransaction = Arc<Mutex<Box<dyn LifecycleTransaction>>>;

/// Rejects a terminal call that carries an unhandled prior error.
pub(crate) fn ensure_no_prior(operation: &'static str, prior: Option<CoreError>) -> CoreResult<()> {
    match prior {
        Some(source) => Err(CoreError::precheck_failed(operation, source)),
        None => Ok(()),
    }
}
