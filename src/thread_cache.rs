//! Per-thread front cache over a shared, mutex-guarded global slab.
//!
//! Each thread owns a private [`ThreadCache`] of 21 free lists, one per size
//! class, each batching work to and from a single process-wide global slab.
//! The fast path (cache hit on alloc, no-overflow on free) never touches the
//! global mutex; it is only acquired on refill and on overflow-flush.

use core::cell::UnsafeCell;
use core::ptr::null_mut;
use std::sync::{Mutex, OnceLock};

use crate::arena::Arena;
use crate::slab::{self, Slab, NUM_CLASSES};

/// Default and only `batch_size` used by every `CacheLine` in this design;
/// not adaptive.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Number of nodes moved back to the global slab on overflow - half of
/// [`DEFAULT_BATCH_SIZE`], chosen so the cache stays warm rather than empty
/// after a flush.
pub const OVERFLOW_FLUSH_COUNT: usize = 16;

/// A free-list cell, matching the layout `slab` nodes use (the thread
/// cache moves raw node pointers between itself and the global slab
/// without knowing anything about their contents). `repr(C)` so its layout
/// is guaranteed identical to `slab::SlabNode` across the module boundary.
#[repr(C)]
struct Node {
    next: *mut Node,
}

/// One per-class entry in a [`ThreadCache`]. Cache-line aligned and padded
/// to 64 bytes so adjacent classes in the fixed array never share a cache
/// line.
#[repr(align(64))]
struct CacheLine {
    head: *mut Node,
    count: usize,
    batch_size: usize,
}

static_assertions::const_assert!(core::mem::size_of::<CacheLine>() <= 64);

impl CacheLine {
    const fn new() -> Self {
        Self {
            head: null_mut(),
            count: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[inline]
    fn pop(&mut self) -> *mut Node {
        let node = self.head;
        if !node.is_null() {
            self.head = unsafe { (*node).next };
            self.count -= 1;
        }
        node
    }

    #[inline]
    fn push(&mut self, node: *mut Node) {
        unsafe { (*node).next = self.head };
        self.head = node;
        self.count += 1;
    }
}

/// Per-thread cache of 21 [`CacheLine`]s, one per size class.
pub struct ThreadCache {
    lines: [CacheLine; NUM_CLASSES],
}

impl ThreadCache {
    const fn new() -> Self {
        // `CacheLine::new()` is `const`, but array-from-fn requires the
        // repeat-expression form since `CacheLine` isn't `Copy`.
        Self {
            lines: [const { CacheLine::new() }; NUM_CLASSES],
        }
    }
}

/// Global slab and the arena it refills from, behind one mutex. Mutated
/// only while that mutex is held.
struct GlobalState {
    arena: Arena,
    slab: Slab,
}

impl GlobalState {
    fn new() -> Self {
        let mut arena = Arena::new();
        arena.init();
        let mut slab = Slab::new();
        slab.init();
        Self { arena, slab }
    }
}

static GLOBAL: OnceLock<Mutex<GlobalState>> = OnceLock::new();

fn global() -> &'static Mutex<GlobalState> {
    GLOBAL.get_or_init(|| Mutex::new(GlobalState::new()))
}

thread_local! {
    static THREAD_CACHE: UnsafeCell<ThreadCache> = const { UnsafeCell::new(ThreadCache::new()) };
}

/// Runs `f` against this thread's cache, initializing it (and the global
/// slab/arena, via the once-guard above) on first touch.
///
/// # Safety
/// Not reentrant: `f` must not call back into `with_thread_cache` on the
/// same thread. `tc_alloc`/`tc_free` never do.
#[inline]
fn with_thread_cache<R>(f: impl FnOnce(&mut ThreadCache) -> R) -> R {
    THREAD_CACHE.with(|cell| {
        // Safety: this thread is the only accessor of its own cell, and we
        // never recurse into `with_thread_cache` while already inside it.
        unsafe { f(&mut *cell.get()) }
    })
}

/// Fast-path allocation. Ensures the thread cache (and, transitively, the
/// global slab/arena) are initialized, then:
///
/// 1. If the class has a cached node, pops and returns it - no lock taken.
/// 2. Otherwise locks the global slab, refilling it from the arena if
///    needed, transfers up to `batch_size` nodes into the thread cache,
///    unlocks, and returns one of them.
///
/// Returns null only if the underlying page source ultimately fails.
pub fn tc_alloc(n: usize) -> *mut u8 {
    let c = slab::size_to_class(n);

    with_thread_cache(|tc| {
        let line = &mut tc.lines[c];
        let out = if line.count > 0 {
            line.pop() as *mut u8
        } else {
            let mut guard = global().lock().unwrap_or_else(|e| e.into_inner());
            let (count, head) = guard.slab.pop_batch(&mut guard.arena, c, line.batch_size);
            drop(guard);

            if count == 0 {
                return null_mut();
            }

            // The batch arrives as one chain; thread it onto the cache list
            // node by node so `count` stays accurate and the chain order
            // (and thus subsequent LIFO reuse order) is preserved.
            let mut remaining = head as *mut Node;
            for _ in 0..count {
                let next = unsafe { (*remaining).next };
                line.push(remaining);
                remaining = next;
            }

            line.pop() as *mut u8
        };

        #[cfg(test)]
        debug_record_alloc(out, c);
        out
    })
}

/// Fast-path free. Ensures the thread cache is initialized, then:
///
/// 1. If the class's cached count is at or above `batch_size`, locks the
///    global slab, transfers exactly [`OVERFLOW_FLUSH_COUNT`] nodes from
///    the front of the thread list back to the front of the global list,
///    and unlocks.
/// 2. Pushes `p` onto the (now headroom-having) thread list.
///
/// Null `p` is a no-op. This function cannot fail.
///
/// # Safety
/// `p` must have come from `tc_alloc(n')` for some `n'` in the same size
/// class as `n`, and must not already have been freed.
pub unsafe fn tc_free(p: *mut u8, n: usize) {
    if p.is_null() {
        return;
    }
    let c = slab::size_to_class(n);
    #[cfg(test)]
    debug_check_free(p, c);

    with_thread_cache(|tc| {
        let line = &mut tc.lines[c];

        if line.count >= line.batch_size {
            let mut guard = global().lock().unwrap_or_else(|e| e.into_inner());

            let head = line.head;
            let mut tail = head;
            for _ in 1..OVERFLOW_FLUSH_COUNT {
                tail = unsafe { (*tail).next };
            }
            let rest = unsafe { (*tail).next };
            unsafe { (*tail).next = null_mut() };

            line.head = rest;
            line.count -= OVERFLOW_FLUSH_COUNT;

            guard
                .slab
                .push_batch(c, head as *mut u8, OVERFLOW_FLUSH_COUNT);
        }

        line.push(p as *mut Node);
    })
}

/// Runs `f` against the global arena and slab, holding the global mutex for
/// the duration. Used by [`crate::stats`] for read-only snapshots; not
/// called from the `tc_alloc`/`tc_free` fast paths themselves.
pub fn with_global_state<R>(f: impl FnOnce(&mut Arena, &mut Slab) -> R) -> R {
    let mut guard = global().lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard.arena, &mut guard.slab)
}

// Debug-only precondition checking (distilled spec §9's debug-build option).
// Production `tc_alloc`/`tc_free` never touch this; a caller that frees with
// the wrong size class is undefined behavior there, as specified. Here it is
// caught so this crate's own test suite can't silently corrupt a free list
// without failing loudly.
#[cfg(test)]
thread_local! {
    static DEBUG_CLASS_TABLE: core::cell::RefCell<std::collections::HashMap<usize, usize>> =
        core::cell::RefCell::new(std::collections::HashMap::new());
}

#[cfg(test)]
fn debug_record_alloc(p: *mut u8, class: usize) {
    if p.is_null() {
        return;
    }
    DEBUG_CLASS_TABLE.with(|t| {
        t.borrow_mut().insert(p as usize, class);
    });
}

#[cfg(test)]
fn debug_check_free(p: *mut u8, class: usize) {
    DEBUG_CLASS_TABLE.with(|t| {
        if let Some(recorded) = t.borrow_mut().remove(&(p as usize)) {
            assert_eq!(
                recorded, class,
                "tc_free called with a size mapping to class {class}, but this pointer was \
                 allocated as class {recorded}"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn single_thread_round_trip_all_example_sizes() {
        let sizes = [8usize, 16, 32, 64, 128, 256, 512, 1024, 4096, 8192];
        let mut ptrs = Vec::new();

        for &sz in sizes.iter() {
            let p = tc_alloc(sz);
            assert!(!p.is_null());
            unsafe { core::ptr::write_bytes(p, 0xAB, sz) };
            ptrs.push((p, sz));
        }

        for &(p, sz) in ptrs.iter() {
            unsafe {
                assert_eq!(*p, 0xAB);
                assert_eq!(*p.add(sz - 1), 0xAB);
            }
        }

        for &(p, sz) in ptrs.iter().rev() {
            unsafe { tc_free(p, sz) };
        }
    }

    #[test]
    fn distinct_pointers_while_simultaneously_live() {
        let mut ptrs = HashSet::new();
        let mut live = Vec::new();
        for _ in 0..500 {
            let p = tc_alloc(64);
            assert!(!p.is_null());
            assert!(ptrs.insert(p as usize), "pointer reused while still live");
            live.push(p);
        }
        for p in live {
            unsafe { tc_free(p, 64) };
        }
    }

    #[test]
    #[should_panic(expected = "allocated as class")]
    fn debug_side_table_catches_wrong_size_class_free() {
        let p = tc_alloc(8);
        assert!(!p.is_null());
        // Freeing with a size that maps to a different class than the one
        // `p` was allocated with must panic under the debug side table,
        // even though production builds treat this as caller UB.
        unsafe { tc_free(p, 4096) };
    }

    #[test]
    fn alloc_free_pair_is_net_zero_on_count() {
        // Indirect check: repeatedly alloc-then-immediately-free the same
        // class many times. If the thread cache leaked count we'd either
        // exhaust memory or eventually hand back a null pointer.
        for _ in 0..10_000 {
            let p = tc_alloc(32);
            assert!(!p.is_null());
            unsafe { tc_free(p, 32) };
        }
    }

    #[test]
    fn multi_thread_batch_fill_and_overflow() {
        let handles: Vec<_> = (0..4u32)
            .map(|tid| {
                std::thread::spawn(move || {
                    let magic = 0xDEAD_0000u32 + tid;
                    let mut ptrs = Vec::with_capacity(32);

                    // Exactly one batch size: fills the thread cache.
                    for _ in 0..32 {
                        let p = tc_alloc(64);
                        assert!(!p.is_null());
                        unsafe { (p as *mut u32).write(magic) };
                        ptrs.push(p);
                    }

                    for &p in ptrs.iter() {
                        unsafe { assert_eq!((p as *mut u32).read(), magic) };
                    }

                    // Free all 32 - triggers an overflow flush back to the
                    // global slab partway through.
                    for p in ptrs {
                        unsafe { tc_free(p, 64) };
                    }

                    // 16 more paired alloc/free cycles.
                    for _ in 0..16 {
                        let p = tc_alloc(64);
                        assert!(!p.is_null());
                        unsafe { (p as *mut u32).write(tid) };
                        unsafe { assert_eq!((p as *mut u32).read(), tid) };
                        unsafe { tc_free(p, 64) };
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    #[ignore] // slow: 4 threads x 100 rounds x 100 allocs, run with --ignored
    fn stress_mixed_sizes_four_threads() {
        let sizes = [8usize, 16, 32, 64, 128];

        let handles: Vec<_> = (0..4u8)
            .map(|tid| {
                std::thread::spawn(move || {
                    for round in 0..100 {
                        let mut tracked = Vec::with_capacity(100);
                        for i in 0..100 {
                            let sz = sizes[(tid as usize + round + i) % sizes.len()];
                            let p = tc_alloc(sz);
                            assert!(!p.is_null());
                            unsafe { core::ptr::write_bytes(p, tid, sz) };
                            tracked.push((p, sz));
                        }
                        for (p, sz) in tracked {
                            unsafe { tc_free(p, sz) };
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
