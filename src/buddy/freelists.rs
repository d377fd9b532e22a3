//! The per-`(region, level)` array of free-list sentinels.
//!
//! One [`FreeNode`] sentinel exists for every region/level pair; its storage
//! lives inline in the allocator's control block (see
//! [`super::control`]), laid out `region`-major then `level`-minor.

use core::ptr::NonNull;

use super::llist::FreeNode;

pub struct FreeLists<'a> {
    num_levels: usize,
    sentinels: &'a [FreeNode],
}

impl<'a> FreeLists<'a> {
    /// Wraps `sentinels` (one entry per `(region, level)` pair, `region`-major)
    /// as a free-list array. Each sentinel must already be initialized via
    /// [`FreeNode::init_sentinel`] - see [`Self::init_all`] for the common case.
    ///
    /// # Safety
    /// `sentinels.len()` must equal `num_regions * num_levels`.
    pub(super) unsafe fn new(sentinels: &'a [FreeNode], num_levels: usize) -> Self {
        Self { num_levels, sentinels }
    }

    /// Initializes every sentinel in `sentinels` as an empty list head.
    ///
    /// # Safety
    /// `sentinels` must be valid for writes as `FreeNode`s and not currently
    /// linked into any list.
    pub(super) unsafe fn init_all(sentinels: &'a [FreeNode]) {
        for sentinel in sentinels {
            let ptr = NonNull::from(sentinel);
            FreeNode::init_sentinel(ptr);
        }
    }

    #[inline]
    fn index(&self, region: usize, level: u8) -> usize {
        region * self.num_levels + level as usize
    }

    #[inline]
    fn sentinel(&self, region: usize, level: u8) -> NonNull<FreeNode> {
        NonNull::from(&self.sentinels[self.index(region, level)])
    }

    /// Whether the free list at `(region, level)` has no blocks.
    #[inline]
    pub fn is_empty(&self, region: usize, level: u8) -> bool {
        FreeNode::is_empty(self.sentinel(region, level))
    }

    /// Pushes `node` onto the back of the free list at `(region, level)`.
    ///
    /// # Safety
    /// `node` must be valid for writes as a `FreeNode` and not already linked.
    #[inline]
    pub unsafe fn push_back(&self, region: usize, level: u8, node: NonNull<FreeNode>) {
        FreeNode::push_back(self.sentinel(region, level), node);
    }

    /// Pops the front block off the free list at `(region, level)`.
    #[inline]
    pub fn pop_first(&self, region: usize, level: u8) -> Option<NonNull<FreeNode>> {
        FreeNode::pop_first(self.sentinel(region, level))
    }
}
