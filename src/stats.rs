//! Read-only snapshot of global allocator usage, for tests and diagnostics.
//!
//! Not part of the hot path: acquiring a snapshot locks the global slab the
//! same way a cache refill or overflow flush would.

use crate::slab::NUM_CLASSES;
use crate::thread_cache;

/// A point-in-time view of the global slab and the arena backing it.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorStats {
    /// Total bytes currently mapped by the global arena, across every
    /// block it owns (slab chunks and any direct large allocations).
    pub arena_mapped_bytes: usize,
    /// Number of blocks currently tracked by the global arena.
    pub arena_block_count: usize,
    /// Number of free nodes currently sitting in the global slab for each
    /// of the 21 size classes, indexed the same way as
    /// [`crate::slab::SIZE_CLASSES`].
    pub global_free_nodes: [usize; NUM_CLASSES],
}

/// Snapshots the current state of the global arena and slab. Briefly locks
/// the global mutex.
pub fn stats() -> AllocatorStats {
    thread_cache::with_global_state(|arena, slab| AllocatorStats {
        arena_mapped_bytes: arena.mapped_bytes(),
        arena_block_count: arena.block_count(),
        global_free_nodes: slab.free_node_counts(),
    })
}
