//! Artifact descriptors.
//!
//! An artifact is one immutable on-disk unit managed by the engine: a
//! sorted data file together with its in-memory reader. This module only
//! models the descriptor; the file format and checksum scheme live in the
//! storage layer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Stable identifier for an artifact.
///
/// Artifact IDs are assigned when an artifact is first written and are
/// never reused, even after the artifact is obsoleted and deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(pub u64);

impl ArtifactId {
    /// Creates a new artifact ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "artifact:{}", self.0)
    }
}

/// Descriptor of one immutable on-disk artifact.
///
/// Several descriptor instances may exist for the same artifact id over
/// the course of an operation (e.g. when a reader is reopened with new
/// metadata); `generation` distinguishes them. Equality and hashing are
/// by id only, so a replaced instance still matches the artifact it
/// describes.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Stable artifact identifier.
    pub id: ArtifactId,
    /// Path of the data file.
    pub path: PathBuf,
    /// Size of the data file in bytes.
    pub size_bytes: u64,
    /// Instance generation, bumped each time the tracked instance is
    /// replaced.
    pub generation: u64,
}

impl Artifact {
    /// Creates a first-generation artifact descriptor.
    #[must_use]
    pub fn new(id: ArtifactId, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            id,
            path: path.into(),
            size_bytes,
            generation: 0,
        }
    }

    /// Returns the artifact ID.
    #[must_use]
    pub const fn id(&self) -> ArtifactId {
        self.id
    }

    /// Returns a replacement instance for the same artifact with the
    /// generation bumped.
    #[must_use]
    pub fn next_generation(&self) -> Self {
        Self {
            generation: self.generation + 1,
            ..self.clone()
        }
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Artifact {}

impl Hash for Artifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, gen {})", self.id, self.path.display(), self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_id_display() {
        let id = ArtifactId::new(7);
        assert_eq!(format!("{id}"), "artifact:7");
    }

    #[test]
    fn equality_is_by_id() {
        let a = Artifact::new(ArtifactId::new(1), "/data/1.seg", 100);
        let b = a.next_generation();
        assert_eq!(a, b);
        assert_eq!(b.generation, 1);

        let c = Artifact::new(ArtifactId::new(2), "/data/1.seg", 100);
        assert_ne!(a, c);
    }
}
