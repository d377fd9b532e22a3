//! A binary buddy memory allocator, usable as a `#[global_allocator]` via
//! [`buddy::Lock`] or driven directly through [`buddy::BuddyAllocator`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod buddy;

