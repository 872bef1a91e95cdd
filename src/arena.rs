//! Arena: a doubly-linked list of page-granular [`Block`]s obtained from the
//! [`page_source`](crate::page_source), torn down in one pass by `destroy`.

use core::mem;
use core::ptr::null_mut;

use crate::page_source;

/// Header prepended to every arena-owned region. The payload begins
/// immediately after this header.
#[repr(C)]
struct Block {
    /// Total size of this block, header included, page-aligned.
    size: usize,
    prev: *mut Block,
    next: *mut Block,
}

/// A doubly-linked list of [`Block`]s, most-recently-allocated at the head.
///
/// Invariants: every block reachable from `head` is currently mapped;
/// `head`'s `prev` is always null; the list is acyclic.
pub struct Arena {
    head: *mut Block,
}

// Safety: an `Arena` is only ever mutated by its owner, which for the
// global arena means "whoever currently holds the global slab's mutex".
unsafe impl Send for Arena {}

impl Arena {
    /// Creates an arena with no blocks.
    pub const fn new() -> Self {
        Self { head: null_mut() }
    }

    /// Resets the arena to empty. Idempotent only when called on a
    /// zero-initialized arena (calling it on a populated arena leaks its
    /// blocks without unmapping them); use [`Arena::destroy`] for that.
    pub fn init(&mut self) {
        self.head = null_mut();
    }

    /// Requests `size_of::<Block>() + n` bytes from the page source, places
    /// the header at the start, links the new block at the head of the
    /// list, and returns a pointer to the byte immediately after the
    /// header. Returns null if the page source fails.
    pub fn alloc(&mut self, n: usize) -> *mut u8 {
        let required = mem::size_of::<Block>() + n;
        let raw = page_source::get_memory(required);
        if raw.is_null() {
            return null_mut();
        }

        let actual = page_source::aligned(required);
        let block = raw as *mut Block;
        unsafe {
            (*block).size = actual;
            (*block).prev = null_mut();
            (*block).next = self.head;
            if !self.head.is_null() {
                (*self.head).prev = block;
            }
        }
        self.head = block;

        unsafe { (block as *mut u8).add(mem::size_of::<Block>()) }
    }

    /// Locates the header one `Block` behind `p`, unlinks it, and unmaps it.
    ///
    /// # Safety
    /// `p` must have been returned by a prior call to [`Arena::alloc`] on
    /// this same arena and must not already have been freed. A null `p` is
    /// a no-op.
    pub unsafe fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let block = unsafe { (p as *mut Block).sub(1) };

        unsafe {
            if !(*block).prev.is_null() {
                (*(*block).prev).next = (*block).next;
            }
            if !(*block).next.is_null() {
                (*(*block).next).prev = (*block).prev;
            }
            if self.head == block {
                self.head = (*block).next;
            }

            let size = (*block).size;
            page_source::free_memory(block as *mut u8, size);
        }
    }

    /// Walks the list from `head`, unmapping every block, then clears
    /// `head`. Safe on an empty or freshly-initialized arena.
    pub fn destroy(&mut self) {
        let mut curr = self.head;
        while !curr.is_null() {
            let next = unsafe { (*curr).next };
            let size = unsafe { (*curr).size };
            page_source::free_memory(curr as *mut u8, size);
            curr = next;
        }
        self.head = null_mut();
    }

    /// True once `destroy` (or a fresh `init`) has left no blocks mapped.
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Number of blocks currently tracked by this arena. O(n); intended for
    /// tests and diagnostics, not the hot path.
    pub fn block_count(&self) -> usize {
        let mut count = 0;
        let mut curr = self.head;
        while !curr.is_null() {
            count += 1;
            curr = unsafe { (*curr).next };
        }
        count
    }

    /// Total bytes currently mapped across every tracked block, headers
    /// included. O(n); intended for tests and diagnostics.
    pub fn mapped_bytes(&self) -> usize {
        let mut total = 0;
        let mut curr = self.head;
        while !curr.is_null() {
            total += unsafe { (*curr).size };
            curr = unsafe { (*curr).next };
        }
        total
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.destroy();
    }
}
