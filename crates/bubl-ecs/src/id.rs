//! Monotonic identity allocation.
//!
//! Every identity in the ECS (component types, entities, archetypes) is drawn
//! from an [`IdAllocator`]. Allocators are owned by the structure that hands
//! out the ids -- the [`TypeRegistry`](crate::component::TypeRegistry) and the
//! [`World`](crate::world::World) -- so two worlds never share a counter.

use std::sync::atomic::{AtomicU32, Ordering};

// ---------------------------------------------------------------------------
// IdAllocator
// ---------------------------------------------------------------------------

/// A thread-safe, monotonically increasing `u32` counter.
///
/// Values are never reused. Running out of ids is fatal: [`next`](Self::next)
/// panics instead of wrapping around.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    /// Create an allocator whose first id is `0`.
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    /// Allocate the next id. No other caller will ever receive the same value.
    ///
    /// # Panics
    ///
    /// Panics if the `u32` id space is exhausted.
    pub fn next(&self) -> u32 {
        match self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                cur.checked_add(1)
            }) {
            Ok(id) => id,
            Err(_) => panic!("identity space exhausted: allocator overflowed u32::MAX"),
        }
    }

    /// The id the next call to [`next`](Self::next) would return.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
