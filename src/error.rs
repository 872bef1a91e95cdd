//! Diagnostic reporting.
//!
//! This allocator's fallible operations surface as a null pointer, never as
//! a `Result` - see the external interface table in the specification. This
//! module exists only to give the two recognized failure classes (mapping
//! failure, unmap failure) a consistent, structured report to the `log`
//! facade. It is not a general error type and is not returned from any
//! public function.

use std::fmt;

/// A mapping operation could not obtain memory from the OS.
#[derive(Debug, Clone, Copy)]
pub struct MapError {
    /// Name of the operation that failed (`"get_memory"`, `"refill"`, ...).
    pub operation: &'static str,
    /// Requested size, in bytes, that could not be satisfied.
    pub requested: usize,
    /// `errno` captured immediately after the failing syscall.
    pub os_error: std::io::Error,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: failed to map {} bytes: {}",
            self.operation, self.requested, self.os_error
        )
    }
}

impl std::error::Error for MapError {}

/// Reports a mapping failure to the diagnostic stream. The caller still
/// receives a null pointer; this only records the `errno` context.
#[cold]
pub fn report_mapping_failure(operation: &'static str, requested: usize) {
    let err = MapError {
        operation,
        requested,
        os_error: std::io::Error::last_os_error(),
    };
    #[cfg(feature = "log")]
    log::error!("{err}");
    #[cfg(not(feature = "log"))]
    let _ = err;
}

/// Reports an unmap failure. Best-effort: the allocator continues to treat
/// the region as released regardless of what this logs.
#[cold]
pub fn report_unmap_failure(addr: usize, size: usize) {
    let os_error = std::io::Error::last_os_error();
    #[cfg(feature = "log")]
    log::warn!("munmap failed for region at {addr:#x} ({size} bytes): {os_error}");
    #[cfg(not(feature = "log"))]
    {
        let _ = (addr, size, os_error);
    }
}
