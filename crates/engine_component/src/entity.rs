//! Entity identity and allocation.
//!
//! An [`Entity`] is an opaque `u64` handle. It carries no data of its own;
//! the components attached to it live in the world that allocated it.

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Identities are handed out by an [`EntityAllocator`] in strictly increasing
/// order and are never reassigned, even after the entity is destroyed. A
/// handle to a destroyed entity therefore stays distinguishable from every
/// live one for the lifetime of its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// Wrap a raw identifier. Mostly useful in tests and for display round-trips.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Hands out monotonically increasing entity identities. Identities are
/// never recycled.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u64,
}

impl EntityAllocator {
    /// Creates a new allocator. The first identity handed out is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocates a fresh identity.
    pub fn allocate(&mut self) -> Entity {
        let id = self.next_id;
        self.next_id += 1;
        Entity(id)
    }

    /// Number of identities handed out so far, live or not.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
