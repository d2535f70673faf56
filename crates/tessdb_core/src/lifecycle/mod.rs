//! Artifact lifecycle transactions.
//!
//! A maintenance operation (compaction, cleanup, upgrade) replaces a set
//! of original artifacts with newly produced ones under a lifecycle
//! transaction, so the swap becomes visible as a single all-or-nothing
//! unit.
//!
//! Two flavors are provided:
//! - [`TrackedTransaction`]: the single-party transaction driven by one
//!   task.
//! - [`CompositeLifecycleTransaction`] with
//!   [`PartialLifecycleTransaction`] handles: the coordination layer
//!   that lets N concurrently scheduled sub-tasks share one transaction.
//!   The composite commits the shared transaction once every part has
//!   committed; the first part to abort aborts it for everyone.

mod composite;
mod partial;
mod tracked;
mod transaction;

pub use composite::CompositeLifecycleTransaction;
pub use partial::PartialLifecycleTransaction;
pub use tracked::TrackedTransaction;
pub use transaction::{LifecycleTransaction, SharedTransaction, TransactionState};
