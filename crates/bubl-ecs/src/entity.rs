//! Entity identifiers and the per-entity directory record.
//!
//! An [`EntityId`] is drawn from the world's monotonic allocator and is never
//! reused, so a destroyed entity's id stays invalid for the world's lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::archetype::ArchetypeId;
use crate::composite::CompositeType;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A world-unique entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    /// Raw numeric value.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Reconstruct from a raw value, e.g. one read back from a log.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Where an entity lives: which archetype and which row within that archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityLocation {
    pub archetype: ArchetypeId,
    pub row: usize,
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Directory entry for one live entity.
///
/// `ty` mirrors the owning archetype's composite type; it is kept alongside
/// the location so structural operations can compute the target type without
/// touching the archetype directory.
#[derive(Debug, Clone)]
pub(crate) struct EntityRecord {
    pub location: EntityLocation,
    pub ty: CompositeType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_ordering() {
        let a = EntityId::from_raw(3);
        let b = EntityId::from_raw(7);
        assert!(a < b);
        assert_eq!(a.to_string(), "e3");
        assert_eq!(format!("{b:?}"), "EntityId(7)");
        assert_eq!(b.index(), 7);
    }
}
