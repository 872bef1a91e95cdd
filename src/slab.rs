//! Slab: fixed size classes carved out of [`Arena`](crate::arena::Arena)
//! chunks, served through per-class LIFO free lists.

use core::ptr::null_mut;

use crate::arena::Arena;

/// Ascending size-class bounds, in bytes. Twenty-one classes.
pub const SIZE_CLASSES: [usize; 21] = [
    8, 16, 32, 48, 64, 80, 96, 112, 128, 192, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768,
    65536, 1_048_576, 4_194_304,
];

/// Number of defined size classes.
pub const NUM_CLASSES: usize = SIZE_CLASSES.len();

/// Nodes carved into a class on each arena refill.
pub const SLAB_PREFETCH_COUNT: usize = 64;

/// Returns the smallest class index whose bound is `>= n`. Requests larger
/// than the largest class bound saturate to the last index (`refill` will
/// simply ask the page source for a correspondingly larger chunk).
///
/// Monotonic non-decreasing in `n`; always returns an index in
/// `[0, NUM_CLASSES - 1]`.
#[inline]
pub fn size_to_class(n: usize) -> usize {
    match SIZE_CLASSES.binary_search(&n) {
        Ok(idx) => idx,
        Err(idx) if idx < NUM_CLASSES => idx,
        Err(_) => NUM_CLASSES - 1,
    }
}

/// A free-list cell. Occupies the first machine word of an otherwise
/// unused payload region; while handed out to a caller the bytes belong to
/// the caller and `next` is meaningless.
///
/// `repr(C)` so that its layout (a single pointer-sized, pointer-aligned
/// field) is guaranteed identical to the thread cache's own node type;
/// batches of these cross that module boundary as untyped `*mut u8` chains.
#[repr(C)]
struct SlabNode {
    next: *mut SlabNode,
}

/// Twenty-one singly-linked LIFO free lists, one per size class, refilled
/// in `SLAB_PREFETCH_COUNT`-node batches from an [`Arena`].
pub struct Slab {
    free_lists: [*mut SlabNode; NUM_CLASSES],
}

// Safety: a `Slab` is only ever mutated by whoever holds the lock guarding
// it (the global slab's mutex, for the shared instance).
unsafe impl Send for Slab {}

impl Slab {
    /// Creates a slab with every free list empty. Call [`Slab::refill`]
    /// (directly, or implicitly via [`Slab::alloc`]) against a concrete
    /// arena before drawing allocations from it.
    pub const fn new() -> Self {
        Self {
            free_lists: [null_mut(); NUM_CLASSES],
        }
    }

    /// Resets every free list to empty. Does not return any outstanding
    /// nodes to the arena (the arena chunks backing them remain mapped
    /// until the arena itself is destroyed).
    pub fn init(&mut self) {
        self.free_lists = [null_mut(); NUM_CLASSES];
    }

    /// Allocates one arena chunk of `SIZE_CLASSES[c] * SLAB_PREFETCH_COUNT`
    /// bytes, slices it into `SLAB_PREFETCH_COUNT` contiguous nodes, and
    /// pushes them LIFO onto `free_lists[c]`. The chunk is owned by the
    /// arena; individual nodes are never returned to it.
    ///
    /// Returns `false` if the arena could not supply the chunk (caller
    /// should treat the class as still empty).
    pub fn refill(&mut self, arena: &mut Arena, c: usize) -> bool {
        let class_size = SIZE_CLASSES[c];
        let chunk_size = class_size * SLAB_PREFETCH_COUNT;
        let chunk = arena.alloc(chunk_size);
        if chunk.is_null() {
            return false;
        }

        for i in 0..SLAB_PREFETCH_COUNT {
            let node = unsafe { chunk.add(i * class_size) } as *mut SlabNode;
            unsafe { (*node).next = self.free_lists[c] };
            self.free_lists[c] = node;
        }
        true
    }

    /// Computes `c = size_to_class(n)`; refills the class if its free list
    /// is empty; pops the head and returns it. The returned bytes are
    /// uninitialized; at least `SIZE_CLASSES[c]` of them are usable.
    /// Returns null only if the underlying arena refill fails.
    pub fn alloc(&mut self, arena: &mut Arena, n: usize) -> *mut u8 {
        let c = size_to_class(n);
        if self.free_lists[c].is_null() && !self.refill(arena, c) {
            return null_mut();
        }
        let node = self.free_lists[c];
        self.free_lists[c] = unsafe { (*node).next };
        node as *mut u8
    }

    /// Computes `c = size_to_class(n)` and pushes `p` onto `free_lists[c]`.
    ///
    /// # Safety
    /// `p` must have come from `alloc(arena, n')` for some `n'` with the
    /// same class `c`; a mismatched size corrupts the free list. Null `p`
    /// is a no-op.
    pub unsafe fn free(&mut self, p: *mut u8, n: usize) {
        if p.is_null() {
            return;
        }
        let c = size_to_class(n);
        let node = p as *mut SlabNode;
        unsafe { (*node).next = self.free_lists[c] };
        self.free_lists[c] = node;
    }

    /// Whether the free list for class `c` currently has a node available
    /// without a refill. Used by the thread cache to decide when to lock.
    pub fn class_is_empty(&self, c: usize) -> bool {
        self.free_lists[c].is_null()
    }

    /// Counts the free nodes currently queued in each class. O(n) in the
    /// total number of queued nodes; intended for stats snapshots, not the
    /// hot path.
    pub fn free_node_counts(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0usize; NUM_CLASSES];
        for (c, count) in counts.iter_mut().enumerate() {
            let mut curr = self.free_lists[c];
            while !curr.is_null() {
                *count += 1;
                curr = unsafe { (*curr).next };
            }
        }
        counts
    }

    /// Pops up to `count` nodes of class `c` as a linked chain, refilling
    /// first if the list starts out empty. Returns `(actual_count, head)`;
    /// `head` is null iff `actual_count == 0`.
    pub fn pop_batch(&mut self, arena: &mut Arena, c: usize, count: usize) -> (usize, *mut u8) {
        if self.free_lists[c].is_null() && !self.refill(arena, c) {
            return (0, null_mut());
        }

        let head = self.free_lists[c];
        let mut tail = head;
        let mut popped = 1usize;
        while popped < count {
            let next = unsafe { (*tail).next };
            if next.is_null() {
                break;
            }
            tail = next;
            popped += 1;
        }
        self.free_lists[c] = unsafe { (*tail).next };
        unsafe { (*tail).next = null_mut() };
        (popped, head as *mut u8)
    }

    /// Pushes a chain of `count` nodes of class `c`, `head` first, onto the
    /// front of the free list. `head` must be the head of a chain exactly
    /// `count` nodes long, each already linked via its first machine word.
    pub fn push_batch(&mut self, c: usize, head: *mut u8, count: usize) {
        if head.is_null() || count == 0 {
            return;
        }
        let head = head as *mut SlabNode;
        let mut tail = head;
        for _ in 1..count {
            tail = unsafe { (*tail).next };
        }
        unsafe { (*tail).next = self.free_lists[c] };
        self.free_lists[c] = head;
    }
}

impl Default for Slab {
    fn default() -> Self {
        Self::new()
    }
}
