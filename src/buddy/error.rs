//! Error type for the buddy allocator's public surface.
//!
//! The teacher's `Talloc` uses the nightly `core::alloc::AllocError` via the
//! unstable `Allocator` trait. That API is not available on stable, so this
//! crate defines its own error enum and only implements the stable
//! [`core::alloc::GlobalAlloc`] trait (see [`super::lock`]).

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuddyError {
    /// No free block large enough to satisfy the request remains in any region.
    OutOfMemory,
    /// The requested size exceeds the allocator's largest block size.
    RequestTooLarge,
    /// The backing memory could not be mapped (only returned by the `std` mmap path).
    MappingFailed,
}

impl fmt::Display for BuddyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuddyError::OutOfMemory => write!(f, "buddy allocator: no free block large enough"),
            BuddyError::RequestTooLarge => write!(f, "buddy allocator: request exceeds max block size"),
            BuddyError::MappingFailed => write!(f, "buddy allocator: failed to map backing memory"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BuddyError {}
