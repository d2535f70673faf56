//! Composite lifecycle transaction.

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::transaction::{LifecycleTransaction, SharedTransaction};
use crate::types::{OperationId, OperationType};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Accepting registrations and votes.
const OPEN: u8 = 0;
/// All parts voted commit and the main transaction was committed.
const COMMITTED: u8 = 1;
/// At least one part voted abort and the main transaction was aborted.
const ABORTED: u8 = 2;

/// Shares one main transaction among several partial transactions.
///
/// A scheduler that splits a maintenance operation into N parallel
/// sub-tasks wraps the operation's [`LifecycleTransaction`] in a
/// composite and hands each sub-task a
/// [`PartialLifecycleTransaction`]. The composite counts commit votes
/// and performs the single real finalization once every registered part
/// has committed; the first abort vote instead aborts the main
/// transaction, exactly once, and poisons the remaining parts.
///
/// The racing finalizers are arbitrated by one atomic state transition:
/// whichever of "last commit vote" and "first abort vote" installs the
/// terminal state wins, so the main transaction is never both committed
/// and aborted, and never finalized twice.
///
/// [`PartialLifecycleTransaction`]: crate::lifecycle::PartialLifecycleTransaction
pub struct CompositeLifecycleTransaction {
    main: SharedTransaction,
    op_id: OperationId,
    // Immutable for the operation's lifetime, cached so partials read
    // them without taking the main lock.
    op_type: OperationType,
    offline: bool,
    /// Registered partial identities, append-only.
    parts: Mutex<Vec<OperationId>>,
    committed_count: AtomicUsize,
    obsolete_originals_requested: AtomicBool,
    state: AtomicU8,
}

impl CompositeLifecycleTransaction {
    /// Wraps a main transaction for sharing among partial transactions.
    ///
    /// The composite takes exclusive ownership: for the duration of the
    /// operation the main transaction must only be driven through the
    /// registered partials.
    #[must_use]
    pub fn new(main: Box<dyn LifecycleTransaction>) -> Self {
        let op_id = main.op_id();
        let op_type = main.op_type();
        let offline = main.is_offline();
        Self {
            main: Arc::new(Mutex::new(main)),
            op_id,
            op_type,
            offline,
            parts: Mutex::new(Vec::new()),
            committed_count: AtomicUsize::new(0),
            obsolete_originals_requested: AtomicBool::new(false),
            state: AtomicU8::new(OPEN),
        }
    }

    /// Returns the shared handle to the main transaction.
    ///
    /// Intended for the coordinating scheduler, e.g. to inspect the
    /// outcome after finalization. Sub-tasks must go through their
    /// partial handles instead.
    #[must_use]
    pub fn main_transaction(&self) -> SharedTransaction {
        Arc::clone(&self.main)
    }

    /// Returns the operation ID of the underlying transaction.
    #[must_use]
    pub fn op_id(&self) -> OperationId {
        self.op_id
    }

    /// Returns the operation classification.
    #[must_use]
    pub fn op_type(&self) -> OperationType {
        self.op_type
    }

    /// Whether the operation runs outside the live data set.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Number of registered partial transactions.
    ///
    /// Stable once all registrations are complete; in practice every
    /// part is registered before any sub-task starts running.
    #[must_use]
    pub fn parts_count(&self) -> usize {
        self.parts.lock().len()
    }

    /// True once any partial has aborted.
    ///
    /// Lock-free, with sequentially consistent visibility: a partial's
    /// abort is visible to a concurrently finalizing commit path and
    /// vice versa.
    #[must_use]
    pub fn was_aborted(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ABORTED
    }

    /// Requests that all original artifacts be obsoleted at
    /// finalization. Sticky and idempotent.
    pub fn request_obsolete_originals(&self) {
        self.obsolete_originals_requested
            .store(true, Ordering::SeqCst);
    }

    /// Registers a new partial transaction, returning its identity and
    /// 1-based ordinal.
    pub(crate) fn register(&self) -> CoreResult<(OperationId, usize)> {
        let mut parts = self.parts.lock();
        if self.state.load(Ordering::SeqCst) != OPEN {
            return Err(CoreError::invalid_operation(
                "cannot register a partial transaction into a finalized composite",
            ));
        }
        let id = OperationId::new();
        parts.push(id);
        let ordinal = parts.len();
        debug!(composite = %self.op_id, partial = %id, ordinal, "registered partial transaction");
        Ok((id, ordinal))
    }

    /// Records one partial's commit vote.
    ///
    /// Called exactly once per partial, by the partial whose own
    /// terminal transition just succeeded. When the vote completes the
    /// set and the composite is still open, runs the one-shot
    /// finalization sequence on the main transaction.
    pub(crate) fn commit_part(&self) -> CoreResult<()> {
        let committed = self.committed_count.fetch_add(1, Ordering::SeqCst) + 1;
        if committed < self.parts_count() {
            return Ok(());
        }
        match self
            .state
            .compare_exchange(OPEN, COMMITTED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => self.finalize_commit(),
            Err(_) => {
                // A sibling abort won the race. This partial's vote still
                // stands; only the finalization is skipped.
                warn!(
                    composite = %self.op_id,
                    "all parts committed but composite was already aborted"
                );
                Ok(())
            }
        }
    }

    fn finalize_commit(&self) -> CoreResult<()> {
        debug!(
            composite = %self.op_id,
            parts = self.parts_count(),
            "all parts committed, finalizing main transaction"
        );
        let mut main = self.main.lock();
        main.checkpoint()?;
        if self.obsolete_originals_requested.load(Ordering::SeqCst) {
            main.obsolete_originals()?;
        }
        main.prepare_to_commit()?;
        main.commit(None)
    }

    /// Records one partial's abort vote.
    ///
    /// The first abort aborts the main transaction; later votes are
    /// no-ops against it but remain valid, since every partial must be
    /// allowed to report its own terminal state.
    pub(crate) fn abort_part(&self) -> CoreResult<()> {
        match self
            .state
            .compare_exchange(OPEN, ABORTED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                debug!(composite = %self.op_id, "first partial abort, aborting main transaction");
                self.main.lock().abort(None)
            }
            Err(_) => Ok(()),
        }
    }

    fn state_name(&self) -> &'static str {
        match self.state.load(Ordering::SeqCst) {
            COMMITTED => "committed",
            ABORTED => "aborted",
            _ => "open",
        }
    }
}

impl fmt::Debug for CompositeLifecycleTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeLifecycleTransaction")
            .field("op_id", &self.op_id)
            .field("op_type", &self.op_type)
            .field("state", &self.state_name())
            .field("parts", &self.parts_count())
            .field(
                "committed",
                &self.committed_count.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}
