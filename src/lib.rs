//! tc-slab-alloc
//!
//! A thread-caching, slab-backed general-purpose allocator for user-space
//! POSIX processes, layered as:
//!
//! - [`page_source`] - page-granular anonymous memory straight from the OS.
//! - [`arena`] - a doubly-linked list of blocks obtained from the page
//!   source, each handed out (and torn down) as a whole.
//! - [`slab`] - 21 fixed size classes, each a LIFO free list carved out of
//!   arena chunks.
//! - [`thread_cache`] - a per-thread batching front end over a single,
//!   mutex-guarded global slab.
//!
//! Most callers only need [`tc_alloc`]/[`tc_free`], or the [`GlobalAlloc`]
//! impl [`ThreadCachingAllocator`] for dropping this crate in as a
//! `#[global_allocator]`.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::alloc::{GlobalAlloc, Layout};

pub mod arena;
pub mod error;
pub mod page_source;
pub mod slab;
pub mod stats;
pub mod thread_cache;

pub use arena::Arena;
pub use error::MapError;
pub use slab::{Slab, NUM_CLASSES, SIZE_CLASSES};
pub use stats::{stats, AllocatorStats};
pub use thread_cache::{tc_alloc, tc_free};

/// A [`GlobalAlloc`] implementation over the crate's thread-caching
/// allocator. Zero-sized; every instance shares the same process-wide
/// thread caches and global slab.
///
/// ```
/// use tc_slab_alloc::ThreadCachingAllocator;
///
/// #[global_allocator]
/// static ALLOC: ThreadCachingAllocator = ThreadCachingAllocator;
/// ```
///
/// `Layout`'s alignment is not honored beyond what each size class already
/// guarantees (every class bound is a power of two or a multiple of 16; see
/// [`slab::SIZE_CLASSES`]). A request whose alignment exceeds its rounded-up
/// size class is rejected with a null return, same as any other allocation
/// failure.
pub struct ThreadCachingAllocator;

unsafe impl GlobalAlloc for ThreadCachingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let class = slab::size_to_class(layout.size());
        if layout.align() > slab::SIZE_CLASSES[class] {
            return core::ptr::null_mut();
        }
        tc_alloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { tc_free(ptr, layout.size()) };
    }
}
