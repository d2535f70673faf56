//! Core type definitions for tessdb.

use std::fmt;
use uuid::Uuid;

/// Unique identifier for a lifecycle operation.
///
/// Every lifecycle transaction carries an operation id, as does every
/// partial handle registered into a composite transaction. Ids are
/// random 128-bit UUIDs and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Creates a new random operation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an operation ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Converts to a UUID.
    #[must_use]
    pub const fn to_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OperationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Classification of a lifecycle operation.
///
/// The operation type is fixed when the transaction is created and never
/// changes for the operation's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Merging several artifacts into fewer, denser ones.
    Compaction,
    /// Removing data that no longer belongs to this node.
    Cleanup,
    /// Rewriting artifacts into a newer format.
    Upgrade,
    /// Writing a new artifact from in-memory state.
    Flush,
    /// Operation of unknown provenance.
    Unknown,
}

impl OperationType {
    /// Returns the lowercase name of the operation type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compaction => "compaction",
            Self::Cleanup => "cleanup",
            Self::Upgrade => "upgrade",
            Self::Flush => "flush",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_ids_are_unique() {
        let a = OperationId::new();
        let b = OperationId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn operation_id_uuid_round_trip() {
        let uuid = Uuid::new_v4();
        let id = OperationId::from_uuid(uuid);
        assert_eq!(id.to_uuid(), uuid);
        assert_eq!(format!("{id}"), uuid.to_string());
    }

    #[test]
    fn operation_type_display() {
        assert_eq!(OperationType::Compaction.to_string(), "compaction");
        assert_eq!(OperationType::Cleanup.to_string(), "cleanup");
    }
}
