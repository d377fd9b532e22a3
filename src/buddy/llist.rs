//! Intrusive, circular, doubly-linked free list.
//!
//! Every node here lives inside a free block of memory the allocator itself
//! owns, so there is no generic payload - a node *is* its own two pointers.
//!
//! Each list is headed by a sentinel whose `next`/`prev` point to itself
//! when the list is empty. Blocks are pushed to the back and popped from
//! the front, giving FIFO reuse order within a level.
//!
//! # Safety
//!
//! Nodes must never be moved after being linked, and callers must not hold
//! references to more than one node while mutating the list (aliasing
//! mutable pointers).

use core::cell::Cell;
use core::ptr::NonNull;

/// A node in the free list: either a sentinel (list head) or a free block's
/// header, reinterpreted in place.
#[derive(Debug)]
pub struct FreeNode {
    pub next: Cell<NonNull<FreeNode>>,
    pub prev: Cell<NonNull<FreeNode>>,
}

impl FreeNode {
    /// Initializes `sentinel` as an empty list head in place.
    #[inline]
    pub fn init_sentinel(sentinel: NonNull<FreeNode>) {
        unsafe {
            (*sentinel.as_ptr()).next.set(sentinel);
            (*sentinel.as_ptr()).prev.set(sentinel);
        }
    }

    /// Returns whether the list headed by `sentinel` has no linked blocks.
    #[inline]
    pub fn is_empty(sentinel: NonNull<FreeNode>) -> bool {
        unsafe { (*sentinel.as_ptr()).next.get() == sentinel }
    }

    /// Links `node` in at the back of the list headed by `sentinel`.
    ///
    /// # Safety
    /// `node` must be valid for writes as a `FreeNode` and not already
    /// linked into any list.
    pub unsafe fn push_back(sentinel: NonNull<FreeNode>, node: NonNull<FreeNode>) {
        let tail = (*sentinel.as_ptr()).prev.get();
        (*node.as_ptr()).prev.set(tail);
        (*node.as_ptr()).next.set(sentinel);
        (*tail.as_ptr()).next.set(node);
        (*sentinel.as_ptr()).prev.set(node);
    }

    /// Unlinks and returns the front node of the list headed by `sentinel`,
    /// or `None` if the list is empty.
    pub fn pop_first(sentinel: NonNull<FreeNode>) -> Option<NonNull<FreeNode>> {
        if Self::is_empty(sentinel) {
            return None;
        }
        unsafe {
            let first = (*sentinel.as_ptr()).next.get();
            Self::remove(first);
            Some(first)
        }
    }

    /// Unlinks `node` from whichever list it currently belongs to, leaving
    /// it as an isolated self-referential node.
    ///
    /// # Safety
    /// `node` must currently be linked into a valid list (or be its own
    /// sentinel, in which case this is a no-op).
    pub unsafe fn remove(node: NonNull<FreeNode>) {
        let prev = (*node.as_ptr()).prev.get();
        let next = (*node.as_ptr()).next.get();
        (*prev.as_ptr()).next.set(next);
        (*next.as_ptr()).prev.set(prev);
        (*node.as_ptr()).prev.set(node);
        (*node.as_ptr()).next.set(node);
    }
}
