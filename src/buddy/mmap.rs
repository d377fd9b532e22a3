//! Anonymous memory mapping for the `std` construction path.
//!
//! The teacher (`SFBdragon-tauos`) is a `#![no_std]` kernel and never maps
//! memory itself - it is handed physical frames by the boot loader. This
//! allocator's standalone `create` entry point, used when no caller-supplied
//! backing memory is available, instead reaches for `libc::mmap`, following
//! the anonymous-mapping pattern used by `jgespiga-memalloc`'s region
//! acquisition.

use core::ffi::c_void;
use core::ptr::NonNull;

use super::error::BuddyError;

/// Maps `len` bytes of anonymous, zeroed, read/write memory.
///
/// Returns [`BuddyError::MappingFailed`] on failure rather than aborting -
/// callers that want construction to be fatal on mapping failure should
/// `.expect()` or `.unwrap()` at the call site (mirroring the distilled
/// spec's "eager" vs. "explicit" construction factories).
pub fn map_anonymous(len: usize) -> Result<NonNull<u8>, BuddyError> {
    let addr = unsafe {
        libc::mmap(
            core::ptr::null_mut::<c_void>(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if addr == libc::MAP_FAILED {
        return Err(BuddyError::MappingFailed);
    }

    NonNull::new(addr as *mut u8).ok_or(BuddyError::MappingFailed)
}

/// Unmaps a region previously obtained from [`map_anonymous`].
///
/// # Safety
/// `addr` must have been returned by [`map_anonymous`] with the same `len`,
/// and must not be accessed after this call.
pub unsafe fn unmap(addr: NonNull<u8>, len: usize) {
    libc::munmap(addr.as_ptr() as *mut c_void, len);
}
