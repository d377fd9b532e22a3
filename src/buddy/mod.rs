//! A binary buddy memory allocator: carves a fixed, contiguous region of
//! memory into power-of-two-sized blocks with compact bitmap metadata.
//!
//! See [`allocator::BuddyAllocator`] for the core state machine,
//! [`config::BuddyConfig`] for construction-time parameters, and
//! [`lock::Lock`] for a `#[global_allocator]`-installable wrapper.

pub mod allocator;
pub mod bitops;
pub mod config;
pub mod error;
pub mod freelists;
pub mod geometry;
pub mod llist;
pub mod lock;
pub mod metadata;

#[cfg(feature = "std")]
pub mod mmap;

pub use allocator::BuddyAllocator;
pub use config::{BuddyConfig, ConfigError, SizeEncoding};
pub use error::BuddyError;
pub use lock::Lock;
