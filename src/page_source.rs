//! Page-granular backing store: anonymous memory obtained directly from the OS.
//!
//! Every allocation above this layer is ultimately backed by a region handed
//! out here. Regions are always a whole number of system pages. Above the
//! huge-page threshold we try `MAP_HUGETLB` first and silently fall back to
//! an ordinary anonymous mapping when the kernel can't satisfy it (no huge
//! pages configured, or the reservation is exhausted).

use core::ptr::null_mut;
use std::sync::OnceLock;

use crate::error::report_mapping_failure;

/// Threshold above which `get_memory` attempts a huge-page mapping first.
pub const HUGE_PAGE_THRESHOLD: usize = 2 * 1024 * 1024;

/// Fallback page size used only if `sysconf(_SC_PAGESIZE)` ever reports a
/// non-positive value. Not expected to trigger on any real POSIX system.
const FALLBACK_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The system page size, queried once via `sysconf` and cached.
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            FALLBACK_PAGE_SIZE
        }
    })
}

/// Rounds `n` up to the smallest multiple of the system page size that is
/// `>= n`.
#[inline]
pub fn aligned(n: usize) -> usize {
    let page_size = page_size();
    (n + page_size - 1) & !(page_size - 1)
}

/// Maps `aligned(n)` bytes of zero-filled, read/write anonymous memory.
///
/// When the aligned size is at least [`HUGE_PAGE_THRESHOLD`], a huge-page
/// mapping is attempted first; on failure (or below the threshold) an
/// ordinary anonymous private mapping is used instead. Returns null and
/// reports the OS error on total failure. Never returns a partially mapped
/// region.
pub fn get_memory(n: usize) -> *mut u8 {
    let size = aligned(n);
    if size == 0 {
        return null_mut();
    }

    if size >= HUGE_PAGE_THRESHOLD {
        let huge = unsafe {
            libc::mmap(
                null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB,
                -1,
                0,
            )
        };
        if huge != libc::MAP_FAILED {
            return huge as *mut u8;
        }
    }

    let ptr = unsafe {
        libc::mmap(
            null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        report_mapping_failure("get_memory", size);
        return null_mut();
    }

    ptr as *mut u8
}

/// Unmaps `aligned(n)` bytes starting at `p`. A null pointer or zero length
/// is a no-op. Unmap failure is logged but never propagated - the caller
/// must continue to treat the region as released.
pub fn free_memory(p: *mut u8, n: usize) {
    if p.is_null() || n == 0 {
        return;
    }
    let size = aligned(n);
    let result = unsafe { libc::munmap(p as *mut libc::c_void, size) };
    if result != 0 {
        crate::error::report_unmap_failure(p as usize, size);
    }
}
