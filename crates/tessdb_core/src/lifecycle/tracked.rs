//! The single-party lifecycle transaction.

use crate::artifact::{Artifact, ArtifactId};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::transaction::{
    ensure_no_prior, LifecycleTransaction, TransactionState,
};
use crate::types::{OperationId, OperationType};
use std::collections::{HashMap, HashSet};

/// Tracks the artifact-set changes of one maintenance operation.
///
/// A tracked transaction holds three kinds of artifacts:
/// - **originals**: the operation's inputs, superseded on commit;
/// - **staged**: newly produced artifacts not yet published;
/// - **obsoleted**: originals marked for removal at commit.
///
/// Commit and abort each happen at most once. `prepare_to_commit` must
/// run before `commit`; it publishes any still-staged artifacts.
#[derive(Debug)]
pub struct TrackedTransaction {
    op_id: OperationId,
    op_type: OperationType,
    offline: bool,
    state: TransactionState,
    /// Latest known descriptor per tracked artifact.
    instances: HashMap<ArtifactId, Artifact>,
    originals: HashSet<ArtifactId>,
    staged: HashSet<ArtifactId>,
    published: HashSet<ArtifactId>,
    obsoleted: HashSet<ArtifactId>,
    checkpointed: bool,
    prepared: bool,
}

impl TrackedTransaction {
    /// Creates a transaction over the given original artifacts.
    #[must_use]
    pub fn new(op_type: OperationType, originals: Vec<Artifact>) -> Self {
        Self::with_offline(op_type, originals, false)
    }

    /// Creates a transaction for offline tooling, outside the live data
    /// set.
    #[must_use]
    pub fn offline(op_type: OperationType, originals: Vec<Artifact>) -> Self {
        Self::with_offline(op_type, originals, true)
    }

    fn with_offline(op_type: OperationType, originals: Vec<Artifact>, offline: bool) -> Self {
        let original_ids: HashSet<ArtifactId> = originals.iter().map(Artifact::id).collect();
        let instances = originals.into_iter().map(|a| (a.id(), a)).collect();
        Self {
            op_id: OperationId::new(),
            op_type,
            offline,
            state: TransactionState::Active,
            instances,
            originals: original_ids,
            staged: HashSet::new(),
            published: HashSet::new(),
            obsoleted: HashSet::new(),
            checkpointed: false,
            prepared: false,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Ensures the transaction is active.
    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(CoreError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::Aborted => {
                Err(CoreError::invalid_operation("transaction already aborted"))
            }
        }
    }

    fn publish_staged(&mut self) {
        self.published.extend(self.staged.drain());
        self.checkpointed = true;
    }
}

impl LifecycleTransaction for TrackedTransaction {
    fn update(&mut self, artifacts: Vec<Artifact>, original: bool) -> CoreResult<()> {
        self.ensure_active()?;
        for artifact in artifacts {
            let id = artifact.id();
            if original {
                self.originals.insert(id);
            } else if !self.published.contains(&id) {
                self.staged.insert(id);
            }
            self.instances.insert(id, artifact);
        }
        Ok(())
    }

    fn track_new(&mut self, artifact: Artifact) -> CoreResult<()> {
        self.ensure_active()?;
        let id = artifact.id();
        self.staged.insert(id);
        self.instances.insert(id, artifact);
        Ok(())
    }

    fn untrack_new(&mut self, artifact: &Artifact) -> CoreResult<()> {
        self.ensure_active()?;
        let id = artifact.id();
        // Published artifacts are visible to readers and can no longer be
        // quietly dropped.
        if !self.staged.remove(&id) {
            return Err(CoreError::unknown_artifact(id));
        }
        self.instances.remove(&id);
        Ok(())
    }

    fn cancel(&mut self, artifact: &Artifact) -> CoreResult<()> {
        self.ensure_active()?;
        let id = artifact.id();
        if !self.originals.remove(&id) {
            return Err(CoreError::unknown_artifact(id));
        }
        self.instances.remove(&id);
        self.obsoleted.remove(&id);
        Ok(())
    }

    fn current(&self, id: ArtifactId) -> Option<Artifact> {
        self.instances.get(&id).cloned()
    }

    fn obsolete(&mut self, artifact: &Artifact) -> CoreResult<()> {
        self.ensure_active()?;
        let id = artifact.id();
        if !self.originals.contains(&id) {
            return Err(CoreError::unknown_artifact(id));
        }
        self.obsoleted.insert(id);
        Ok(())
    }

    fn is_obsolete(&self, id: ArtifactId) -> CoreResult<bool> {
        if !self.instances.contains_key(&id) {
            return Err(CoreError::unknown_artifact(id));
        }
        Ok(self.obsoleted.contains(&id))
    }

    fn obsolete_originals(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.obsoleted.extend(self.originals.iter().copied());
        Ok(())
    }

    fn originals(&self) -> Vec<Artifact> {
        self.originals
            .iter()
            .filter_map(|id| self.instances.get(id))
            .cloned()
            .collect()
    }

    fn checkpoint(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.publish_staged();
        Ok(())
    }

    fn prepare_to_commit(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        if !self.checkpointed {
            self.publish_staged();
        }
        self.prepared = true;
        Ok(())
    }

    fn commit(&mut self, prior: Option<CoreError>) -> CoreResult<()> {
        ensure_no_prior("commit", prior)?;
        self.ensure_active()?;
        if !self.prepared {
            return Err(CoreError::invalid_operation(
                "commit before prepare_to_commit",
            ));
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    fn abort(&mut self, prior: Option<CoreError>) -> CoreResult<()> {
        ensure_no_prior("abort", prior)?;
        self.ensure_active()?;
        // Staged output never becomes visible.
        for id in self.staged.drain() {
            self.instances.remove(&id);
        }
        self.state = TransactionState::Aborted;
        Ok(())
    }

    fn op_type(&self) -> OperationType {
        self.op_type
    }

    fn is_offline(&self) -> bool {
        self.offline
    }

    fn op_id(&self) -> OperationId {
        self.op_id
    }
}
