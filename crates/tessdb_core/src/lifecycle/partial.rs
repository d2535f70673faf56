//! Partial lifecycle transaction.

use crate::artifact::{Artifact, ArtifactId};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::composite::CompositeLifecycleTransaction;
use crate::lifecycle::transaction::{
    ensure_no_prior, LifecycleTransaction, SharedTransaction,
};
use crate::types::{OperationId, OperationType};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// One sub-task's handle into a shared lifecycle transaction.
///
/// Works together with a [`CompositeLifecycleTransaction`] to let
/// several parallel sub-tasks over the same sources commit or abort as
/// one unit. Artifact-tracking calls are forwarded to the shared main
/// transaction under its lock; `commit`, `abort` and `close` reduce to
/// a single vote cast to the composite, and mutating progress fails
/// with [`CoreError::TransactionAborted`] once any sibling has aborted.
///
/// Early publication (`update` with `original = true`) and direct
/// obsoletion are unsupported here: they would make one sub-task's
/// state externally visible while siblings might still abort. Originals
/// can only be obsoleted wholesale via [`obsolete_originals`], and that
/// effect is deferred to finalization.
///
/// Dropping the handle counts as `close`, so a sub-task that unwinds
/// without voting still casts an abort vote.
///
/// [`obsolete_originals`]: LifecycleTransaction::obsolete_originals
pub struct PartialLifecycleTransaction {
    composite: Arc<CompositeLifecycleTransaction>,
    /// Same shared handle the composite holds, cached locally.
    main: SharedTransaction,
    committed_or_aborted: AtomicBool,
    id: OperationId,
    ordinal: usize,
}

impl PartialLifecycleTransaction {
    /// Creates a new partial transaction registered with the composite.
    ///
    /// Fails with [`CoreError::InvalidOperation`] once the composite has
    /// reached a terminal state.
    pub fn new(composite: &Arc<CompositeLifecycleTransaction>) -> CoreResult<Self> {
        let (id, ordinal) = composite.register()?;
        Ok(Self {
            composite: Arc::clone(composite),
            main: composite.main_transaction(),
            committed_or_aborted: AtomicBool::new(false),
            id,
            ordinal,
        })
    }

    /// Releases the handle, voting abort if no terminal call was made.
    ///
    /// Safe to call unconditionally on every exit path: after a
    /// successful `commit` or `abort` (or an earlier `close`) this is a
    /// silent no-op, and it never fails. Also runs on drop.
    pub fn close(&self) {
        if self.mark_committed_or_aborted() {
            // close aborts if the owner never committed
            if let Err(err) = self.composite.abort_part() {
                warn!(partial = %self.id, error = %err, "abort on close failed");
            }
        }
    }

    /// First terminal transition wins; everything after is a caller bug.
    fn mark_committed_or_aborted(&self) -> bool {
        self.committed_or_aborted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn is_terminal(&self) -> bool {
        self.committed_or_aborted.load(Ordering::SeqCst)
    }

    fn ensure_composite_open(&self) -> CoreResult<()> {
        if self.composite.was_aborted() {
            return Err(CoreError::transaction_aborted(
                "aborted, likely by another partial operation",
            ));
        }
        Ok(())
    }

    fn already_terminal() -> CoreError {
        CoreError::invalid_operation("partial transaction already committed or aborted")
    }

    fn early_publication() -> CoreError {
        CoreError::unsupported("partial transactions cannot publish artifacts early")
    }
}

impl LifecycleTransaction for PartialLifecycleTransaction {
    fn update(&mut self, artifacts: Vec<Artifact>, original: bool) -> CoreResult<()> {
        self.ensure_composite_open()?;
        if original {
            return Err(Self::early_publication());
        }
        self.main.lock().update(artifacts, original)
    }

    fn track_new(&mut self, artifact: Artifact) -> CoreResult<()> {
        self.ensure_composite_open()?;
        self.main.lock().track_new(artifact)
    }

    fn untrack_new(&mut self, artifact: &Artifact) -> CoreResult<()> {
        self.ensure_composite_open()?;
        self.main.lock().untrack_new(artifact)
    }

    fn cancel(&mut self, artifact: &Artifact) -> CoreResult<()> {
        self.ensure_composite_open()?;
        self.main.lock().cancel(artifact)
    }

    fn current(&self, id: ArtifactId) -> Option<Artifact> {
        self.main.lock().current(id)
    }

    fn obsolete(&mut self, _artifact: &Artifact) -> CoreResult<()> {
        Err(CoreError::unsupported(
            "partial transactions cannot obsolete individual artifacts",
        ))
    }

    fn is_obsolete(&self, _id: ArtifactId) -> CoreResult<bool> {
        Err(CoreError::unsupported(
            "partial transactions cannot observe obsoletion marks",
        ))
    }

    fn obsolete_originals(&mut self) -> CoreResult<()> {
        // Deferred: the composite applies the obsoletion at finalization.
        self.composite.request_obsolete_originals();
        Ok(())
    }

    fn originals(&self) -> Vec<Artifact> {
        self.main.lock().originals()
    }

    fn checkpoint(&mut self) -> CoreResult<()> {
        // The composite checkpoints once, at finalization.
        Ok(())
    }

    fn prepare_to_commit(&mut self) -> CoreResult<()> {
        if self.is_terminal() {
            return Err(Self::already_terminal());
        }
        self.ensure_composite_open()
        // Nothing else to do; the composite prepares when all parts are
        // done.
    }

    fn commit(&mut self, prior: Option<CoreError>) -> CoreResult<()> {
        ensure_no_prior("commit", prior)?;
        if self.mark_committed_or_aborted() {
            self.composite.commit_part()
        } else {
            Err(Self::already_terminal())
        }
    }

    fn abort(&mut self, prior: Option<CoreError>) -> CoreResult<()> {
        ensure_no_prior("abort", prior)?;
        if self.mark_committed_or_aborted() {
            self.composite.abort_part()
        } else {
            Err(Self::already_terminal())
        }
    }

    fn op_type(&self) -> OperationType {
        self.composite.op_type()
    }

    fn is_offline(&self) -> bool {
        self.composite.is_offline()
    }

    fn op_id(&self) -> OperationId {
        self.id
    }

    fn op_id_string(&self) -> String {
        format!(
            "{} ({}/{})",
            self.id,
            self.ordinal,
            self.composite.parts_count()
        )
    }
}

impl Drop for PartialLifecycleTransaction {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for PartialLifecycleTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialLifecycleTransaction")
            .field("id", &self.id)
            .field("ordinal", &self.ordinal)
            .field("terminal", &self.is_terminal())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PartialLifecycleTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.op_id_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::testing::{MockCall, MockTransaction};
    use crate::lifecycle::TrackedTransaction;

    fn artifact(id: u64) -> Artifact {
        Artifact::new(ArtifactId::new(id), format!("/data/{id}.seg"), 1024)
    }

    fn composite_with_log() -> (
        Arc<CompositeLifecycleTransaction>,
        Arc<parking_lot::Mutex<Vec<MockCall>>>,
    ) {
        let mock = MockTransaction::new();
        let log = mock.log();
        (
            Arc::new(CompositeLifecycleTransaction::new(Box::new(mock))),
            log,
        )
    }

    #[test]
    fn forwards_artifact_tracking_to_main() {
        let (composite, log) = composite_with_log();
        let mut p = PartialLifecycleTransaction::new(&composite).unwrap();

        p.track_new(artifact(10)).unwrap();
        p.update(vec![artifact(11)], false).unwrap();
        p.untrack_new(&artifact(11)).unwrap();
        p.cancel(&artifact(1)).unwrap();

        assert_eq!(
            log.lock().as_slice(),
            [
                MockCall::TrackNew,
                MockCall::Update,
                MockCall::UntrackNew,
                MockCall::Cancel
            ]
        );
    }

    #[test]
    fn early_publication_unsupported() {
        let (composite, log) = composite_with_log();
        let mut p = PartialLifecycleTransaction::new(&composite).unwrap();

        let result = p.update(vec![artifact(10)], true);
        assert!(matches!(result, Err(CoreError::Unsupported { .. })));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn direct_obsoletion_unsupported() {
        let (composite, _log) = composite_with_log();
        let mut p = PartialLifecycleTransaction::new(&composite).unwrap();

        assert!(matches!(
            p.obsolete(&artifact(1)),
            Err(CoreError::Unsupported { .. })
        ));
        assert!(matches!(
            p.is_obsolete(ArtifactId::new(1)),
            Err(CoreError::Unsupported { .. })
        ));
    }

    #[test]
    fn checkpoint_is_a_noop() {
        let (composite, log) = composite_with_log();
        let mut p = PartialLifecycleTransaction::new(&composite).unwrap();

        p.checkpoint().unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn mutating_calls_fail_after_sibling_abort() {
        let (composite, _log) = composite_with_log();
        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let mut p2 = PartialLifecycleTransaction::new(&composite).unwrap();

        p1.abort(None).unwrap();

        let result = p2.track_new(artifact(10));
        assert!(matches!(result, Err(CoreError::TransactionAborted { .. })));
        let result = p2.update(vec![artifact(11)], false);
        assert!(matches!(result, Err(CoreError::TransactionAborted { .. })));
    }

    #[test]
    fn double_commit_is_illegal() {
        let (composite, _log) = composite_with_log();
        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let _p2 = PartialLifecycleTransaction::new(&composite).unwrap();

        p1.commit(None).unwrap();
        let result = p1.commit(None);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn abort_after_commit_is_illegal() {
        let (composite, _log) = composite_with_log();
        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let _p2 = PartialLifecycleTransaction::new(&composite).unwrap();

        p1.commit(None).unwrap();
        let result = p1.abort(None);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn commit_with_prior_error_fails_precheck() {
        let (composite, log) = composite_with_log();
        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();

        let prior = CoreError::invalid_operation("earlier failure");
        let result = p1.commit(Some(prior));
        assert!(matches!(result, Err(CoreError::PrecheckFailed { .. })));
        // The rejected call did not consume the partial's vote.
        p1.commit(None).unwrap();
        assert_eq!(log.lock().last(), Some(&MockCall::Commit));
    }

    #[test]
    fn close_after_commit_is_a_noop() {
        let (composite, log) = composite_with_log();
        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let _p2 = PartialLifecycleTransaction::new(&composite).unwrap();

        p1.commit(None).unwrap();
        p1.close();
        p1.close();

        assert!(!composite.was_aborted());
        assert!(!log.lock().contains(&MockCall::Abort));
    }

    #[test]
    fn close_without_commit_votes_abort() {
        let (composite, log) = composite_with_log();
        let p1 = PartialLifecycleTransaction::new(&composite).unwrap();

        p1.close();
        assert!(composite.was_aborted());
        assert_eq!(log.lock().as_slice(), [MockCall::Abort]);

        // Second close is a silent no-op.
        p1.close();
        assert_eq!(log.lock().as_slice(), [MockCall::Abort]);
    }

    #[test]
    fn drop_without_commit_votes_abort() {
        let (composite, log) = composite_with_log();
        {
            let _p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        }
        assert!(composite.was_aborted());
        assert_eq!(log.lock().as_slice(), [MockCall::Abort]);
    }

    #[test]
    fn prepare_to_commit_checks_state() {
        let (composite, _log) = composite_with_log();
        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let mut p2 = PartialLifecycleTransaction::new(&composite).unwrap();

        p2.prepare_to_commit().unwrap();

        p1.abort(None).unwrap();
        let result = p2.prepare_to_commit();
        assert!(matches!(result, Err(CoreError::TransactionAborted { .. })));

        p2.abort(None).unwrap();
        let result = p2.prepare_to_commit();
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn op_id_string_shows_ordinal_and_parts() {
        let (composite, _log) = composite_with_log();
        let p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let p2 = PartialLifecycleTransaction::new(&composite).unwrap();
        let p3 = PartialLifecycleTransaction::new(&composite).unwrap();

        assert_eq!(p2.op_id_string(), format!("{} (2/3)", p2.op_id()));
        assert_eq!(p1.op_id_string(), format!("{} (1/3)", p1.op_id()));
        assert_eq!(p3.to_string(), p3.op_id_string());
        assert_ne!(p1.op_id(), p2.op_id());
    }

    #[test]
    fn metadata_reads_avoid_the_main_lock() {
        let (composite, _log) = composite_with_log();
        let p = PartialLifecycleTransaction::new(&composite).unwrap();

        // Holding the main lock must not block the cached reads.
        let main = composite.main_transaction();
        let _guard = main.lock();
        assert_eq!(p.op_type(), OperationType::Compaction);
        assert!(!p.is_offline());
    }

    #[test]
    fn end_to_end_with_tracked_transaction() {
        let originals = vec![artifact(1), artifact(2)];
        let main = TrackedTransaction::new(OperationType::Compaction, originals);
        let composite = Arc::new(CompositeLifecycleTransaction::new(Box::new(main)));

        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let mut p2 = PartialLifecycleTransaction::new(&composite).unwrap();

        p1.track_new(artifact(10)).unwrap();
        p2.track_new(artifact(11)).unwrap();
        p2.obsolete_originals().unwrap();

        p2.commit(None).unwrap();
        p1.commit(None).unwrap();

        let main = composite.main_transaction();
        let main = main.lock();
        assert!(main.is_obsolete(ArtifactId::new(1)).unwrap());
        assert!(main.is_obsolete(ArtifactId::new(2)).unwrap());
        assert!(main.current(ArtifactId::new(10)).is_some());
        assert!(main.current(ArtifactId::new(11)).is_some());
    }

    #[test]
    fn end_to_end_abort_leaves_originals_untouched() {
        let originals = vec![artifact(1)];
        let main = TrackedTransaction::new(OperationType::Compaction, originals);
        let composite = Arc::new(CompositeLifecycleTransaction::new(Box::new(main)));

        let mut p1 = PartialLifecycleTransaction::new(&composite).unwrap();
        let mut p2 = PartialLifecycleTransaction::new(&composite).unwrap();

        p1.track_new(artifact(10)).unwrap();
        p1.commit(None).unwrap();
        p2.abort(None).unwrap();

        let main = composite.main_transaction();
        let main = main.lock();
        assert!(main.current(ArtifactId::new(1)).is_some());
        assert!(main.current(ArtifactId::new(10)).is_none());
    }
}
