//! # tessdb Core
//!
//! Artifact lifecycle transactions for tessdb.
//!
//! This crate provides:
//! - Descriptors for the engine's immutable on-disk artifacts
//! - The single-party [`TrackedTransaction`] that tracks artifact-set
//!   changes and finalizes them atomically
//! - The composite/partial coordination layer that lets parallel
//!   maintenance sub-tasks share one transaction with all-or-nothing
//!   semantics

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod artifact;
mod error;
pub mod lifecycle;
mod types;

pub use artifact::{Artifact, ArtifactId};
pub use error::{CoreError, CoreResult};
pub use lifecycle::{
    CompositeLifecycleTransaction, LifecycleTransaction, PartialLifecycleTransaction,
    SharedTransaction, TrackedTransaction, TransactionState,
};
pub use types::{OperationId, OperationType};
