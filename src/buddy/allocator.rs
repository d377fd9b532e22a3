//! The buddy allocator's core state machine: `allocate`, `deallocate`,
//! `deallocate_range`, `fill`, and the lazy list.
//!
//! Mirrors `Talloc`'s style of holding raw pointers into externally-owned
//! storage and recomputing bitmap/free-list views on demand, rather than
//! storing long-lived borrows - the control block and backing region are
//! not necessarily owned by this struct (see [`BuddyAllocator::from_raw_parts`]).

use core::ptr::NonNull;

use super::config::{BuddyConfig, SizeEncoding};
use super::error::BuddyError;
use super::freelists::FreeLists;
use super::geometry;
use super::llist::FreeNode;
use super::metadata::Metadata;

/// A binary buddy allocator managing `cfg.num_regions()` contiguous,
/// equally-sized regions of memory.
pub struct BuddyAllocator {
    cfg: BuddyConfig,
    backing_start: NonNull<u8>,
    free_map: NonNull<u8>,
    size_map: NonNull<u8>,
    sentinels: NonNull<FreeNode>,
    lazy_sentinel: NonNull<FreeNode>,
    lazy_count: usize,
    free_size: usize,
    owns_control: bool,
    owns_backing: bool,
}

// SAFETY: BuddyAllocator has no internal synchronization; callers must
// serialize access themselves (see crate::buddy::lock::Lock for a mutex
// wrapper). Send is sound because the raw pointers here are not tied to
// any thread-local state.
unsafe impl Send for BuddyAllocator {}

impl Drop for BuddyAllocator {
    fn drop(&mut self) {
        #[cfg(feature = "std")]
        {
            if self.owns_backing {
                unsafe { super::mmap::unmap(self.backing_start, self.cfg.total_capacity()) };
            }
            if self.owns_control {
                unsafe { super::mmap::unmap(self.control_base(), self.control_len()) };
            }
        }
    }
}

impl BuddyAllocator {
    /// Builds an allocator over caller-supplied, pre-reserved control and
    /// backing memory.
    ///
    /// `control` must point to at least `cfg.control_bytes() + BuddyConfig::LIST_NODE_SIZE`
    /// bytes (the extra node is the lazy list's sentinel); `backing_start` to
    /// `cfg.total_capacity()` bytes. If `start_full`, every region starts
    /// fully allocated (as if externally tracked); otherwise every region's
    /// whole-region block is threaded onto its level-0 free list.
    ///
    /// # Safety
    /// `control` and `backing_start` must be valid, non-overlapping, and
    /// sized as above for the lifetime of the returned allocator. `control`
    /// must additionally be aligned to `align_of::<usize>()` (the free-list
    /// sentinels are placed at an offset within it).
    pub unsafe fn from_raw_parts(
        cfg: BuddyConfig,
        control: NonNull<u8>,
        backing_start: NonNull<u8>,
        start_full: bool,
    ) -> Self {
        let free_map_len = cfg.free_bitmap_bytes() * cfg.num_regions();
        let size_map_len = size_map_bytes_total(&cfg);
        let sentinel_count = cfg.num_regions() * cfg.num_levels();

        let free_map = control;
        let size_map = NonNull::new_unchecked(control.as_ptr().add(free_map_len));
        let sentinels_offset = round_up(free_map_len + size_map_len, core::mem::align_of::<FreeNode>());
        let sentinels = NonNull::new_unchecked(control.as_ptr().add(sentinels_offset)).cast::<FreeNode>();
        let lazy_sentinel = NonNull::new_unchecked(sentinels.as_ptr().add(sentinel_count));

        let mut this = Self {
            cfg,
            backing_start,
            free_map,
            size_map,
            sentinels,
            lazy_sentinel,
            lazy_count: 0,
            free_size: 0,
            owns_control: false,
            owns_backing: false,
        };

        this.metadata().reset(start_full);
        FreeLists::init_all(this.sentinels_slice());
        FreeNode::init_sentinel(this.lazy_sentinel);

        if start_full {
            this.free_size = 0;
        } else {
            this.free_size = cfg.total_capacity();
            for region in 0..cfg.num_regions() {
                let node = this.node_at(region, 0);
                this.free_lists().push_back(region, 0, node);
            }
        }

        this
    }

    /// Builds an allocator, mapping anonymously whichever of `control` and
    /// `backing` is `None`; a caller-supplied half is used as-is and is not
    /// unmapped on `Drop`. Either, both, or neither may be supplied
    /// independently - e.g. a caller with its own pre-reserved backing
    /// region can still let the allocator map its own control block.
    ///
    /// Requires the `std` feature.
    #[cfg(feature = "std")]
    pub fn create(
        cfg: BuddyConfig,
        control: Option<NonNull<u8>>,
        backing: Option<NonNull<u8>>,
        start_full: bool,
    ) -> Result<Self, BuddyError> {
        let control_len = cfg.control_bytes() + BuddyConfig::LIST_NODE_SIZE;

        let (control_ptr, owns_control) = match control {
            Some(ptr) => (ptr, false),
            None => (super::mmap::map_anonymous(control_len)?, true),
        };

        let (backing_ptr, owns_backing) = match backing {
            Some(ptr) => (ptr, false),
            None => match super::mmap::map_anonymous(cfg.total_capacity()) {
                Ok(ptr) => (ptr, true),
                Err(e) => {
                    if owns_control {
                        unsafe { super::mmap::unmap(control_ptr, control_len) };
                    }
                    return Err(e);
                }
            },
        };

        let mut this = unsafe { Self::from_raw_parts(cfg, control_ptr, backing_ptr, start_full) };
        this.owns_control = owns_control;
        this.owns_backing = owns_backing;
        Ok(this)
    }

    /// As [`Self::create`], but aborts the process on mapping failure
    /// instead of returning an error - the "eager" construction factory
    /// for callers that have no recovery path at startup.
    #[cfg(feature = "std")]
    pub fn create_or_panic(
        cfg: BuddyConfig,
        control: Option<NonNull<u8>>,
        backing: Option<NonNull<u8>>,
        start_full: bool,
    ) -> Self {
        Self::create(cfg, control, backing, start_full).expect("buddy allocator: failed to map memory")
    }

    #[cfg(feature = "std")]
    fn control_base(&self) -> NonNull<u8> {
        self.free_map
    }

    #[cfg(feature = "std")]
    fn control_len(&self) -> usize {
        self.cfg.control_bytes() + BuddyConfig::LIST_NODE_SIZE
    }

    fn metadata(&mut self) -> Metadata<'_> {
        let free_len = self.cfg.free_bitmap_bytes() * self.cfg.num_regions();
        let size_len = size_map_bytes_total(&self.cfg);
        unsafe {
            let free_slice = core::slice::from_raw_parts_mut(self.free_map.as_ptr(), free_len);
            let size_slice = core::slice::from_raw_parts_mut(self.size_map.as_ptr(), size_len);
            Metadata::new(self.cfg, free_slice, size_slice)
        }
    }

    fn sentinels_slice(&self) -> &[FreeNode] {
        let count = self.cfg.num_regions() * self.cfg.num_levels();
        unsafe { core::slice::from_raw_parts(self.sentinels.as_ptr(), count) }
    }

    fn free_lists(&self) -> FreeLists<'_> {
        unsafe { FreeLists::new(self.sentinels_slice(), self.cfg.num_levels()) }
    }

    fn node_at(&self, region: usize, offset: usize) -> NonNull<FreeNode> {
        unsafe {
            let region_base = self.backing_start.as_ptr().add(region * self.cfg.region_size());
            NonNull::new_unchecked(region_base.add(offset)).cast()
        }
    }

    fn locate(&self, ptr: NonNull<u8>) -> Option<(usize, usize)> {
        let base = self.backing_start.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        if addr < base || addr >= base + self.cfg.total_capacity() {
            return None;
        }
        let rel = addr - base;
        Some((rel / self.cfg.region_size(), rel % self.cfg.region_size()))
    }

    /// Returns a block of at least `size_of_level(find_smallest_block_level(size))`
    /// bytes, aligned to that same block size.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, BuddyError> {
        let target_level =
            geometry::find_smallest_block_level(&self.cfg, size).ok_or(BuddyError::RequestTooLarge)?;

        if size <= self.cfg.min_block_size() {
            if let Some(node) = self.pop_lazy() {
                #[cfg(feature = "trace")]
                log::trace!("allocate({size}): served from lazy list at {:p}", node);
                return Ok(node.cast());
            }
        }

        for region in 0..self.cfg.num_regions() {
            if let Some(ptr) = self.allocate_in_region(region, target_level) {
                self.free_size -= geometry::size_of_level(&self.cfg, target_level);
                #[cfg(feature = "trace")]
                log::trace!("allocate({size}): region {region} level {target_level} -> {:p}", ptr);
                return Ok(ptr);
            }
        }
        #[cfg(feature = "trace")]
        log::trace!("allocate({size}): out of memory across {} regions", self.cfg.num_regions());
        Err(BuddyError::OutOfMemory)
    }

    fn allocate_in_region(&mut self, region: usize, target_level: u8) -> Option<NonNull<u8>> {
        let mut lvl = target_level;
        loop {
            if !self.free_lists().is_empty(region, lvl) {
                break;
            }
            if lvl == 0 {
                return None;
            }
            lvl -= 1;
        }

        while lvl < target_level {
            let block = self.free_lists().pop_first(region, lvl)?;
            let offset = self.offset_of(region, block);
            let block_idx = geometry::block_index(&self.cfg, offset, lvl);
            self.metadata().set_split_block(region, block_idx, true);
            if lvl > 0 {
                self.metadata().flip_allocated_block(region, Metadata::map_index(block_idx));
            }

            let half = geometry::size_of_level(&self.cfg, lvl + 1);
            let upper = unsafe { NonNull::new_unchecked((block.as_ptr() as *mut u8).add(half)).cast() };
            unsafe {
                self.free_lists().push_back(region, lvl + 1, block);
                self.free_lists().push_back(region, lvl + 1, upper);
            }
            lvl += 1;
        }

        let block = self.free_lists().pop_first(region, target_level)?;
        let offset = self.offset_of(region, block);
        let block_idx = geometry::block_index(&self.cfg, offset, target_level);
        if target_level > 0 {
            self.metadata().flip_allocated_block(region, Metadata::map_index(block_idx));
        }
        if matches!(self.cfg.size_encoding(), SizeEncoding::Nibble | SizeEncoding::Byte) {
            self.metadata().set_level(region, offset, target_level);
        }
        Some(block.cast())
    }

    fn offset_of(&self, region: usize, node: NonNull<FreeNode>) -> usize {
        let region_base = unsafe { self.backing_start.as_ptr().add(region * self.cfg.region_size()) };
        (node.as_ptr() as usize) - (region_base as usize)
    }

    /// Deallocates a block previously returned by [`Self::allocate`],
    /// recovering its size via [`Self::get_alloc_size`].
    pub fn deallocate(&mut self, ptr: NonNull<u8>) {
        let size = self.get_alloc_size(ptr);
        self.deallocate_sized(ptr, size);
    }

    /// Deallocates a block of known `size`. A pointer outside the managed
    /// range is silently ignored; a pointer inside the range that doesn't
    /// fall on a block boundary is a caller contract violation (undefined
    /// which block gets freed).
    pub fn deallocate_sized(&mut self, ptr: NonNull<u8>, size: usize) {
        let Some((region, offset)) = self.locate(ptr) else { return };

        if size <= self.cfg.min_block_size() && self.lazy_count < self.cfg.lazy_threshold() {
            self.push_lazy(ptr.cast());
            return;
        }

        let rounded = geometry::round_up_pow2(size);
        if let Some(level) = geometry::find_smallest_block_level(&self.cfg, rounded) {
            let block_size = geometry::size_of_level(&self.cfg, level);
            if block_size == rounded && offset % block_size == 0 {
                self.deallocate_internal(region, offset, level);
                return;
            }
        }
        self.deallocate_range(ptr, size);
    }

    fn deallocate_internal(&mut self, region: usize, offset: usize, level: u8) {
        let mut offset = offset;
        let mut level = level;

        if level > 0 {
            let block_idx = geometry::block_index(&self.cfg, offset, level);
            self.metadata().flip_allocated_block(region, Metadata::map_index(block_idx));
        }

        while level > 0 {
            let block_idx = geometry::block_index(&self.cfg, offset, level);
            let pair = Metadata::map_index(block_idx);
            if self.metadata().block_is_allocated(region, pair) {
                break;
            }

            let buddy_offset = geometry::get_buddy(&self.cfg, offset, level);
            let buddy_node = self.node_at(region, buddy_offset);
            unsafe { FreeNode::remove(buddy_node) };
            if buddy_offset < offset {
                offset = buddy_offset;
            }
            level -= 1;

            let parent_idx = geometry::block_index(&self.cfg, offset, level);
            self.metadata().set_split_block(region, parent_idx, false);
            if level > 0 {
                self.metadata().flip_allocated_block(region, Metadata::map_index(parent_idx));
            }
        }

        let final_idx = geometry::block_index(&self.cfg, offset, level);
        self.metadata().set_split_block(region, final_idx, false);

        let node = self.node_at(region, offset);
        unsafe { self.free_lists().push_back(region, level, node) };
        self.free_size += geometry::size_of_level(&self.cfg, level);

        #[cfg(feature = "trace")]
        log::trace!("deallocate: region {region} coalesced to level {level} at offset {offset:#x}");
    }

    /// Deallocates an arbitrary-length span that may not correspond to a
    /// single aligned power-of-two block, as can happen when a caller
    /// registered a larger externally-tracked range (e.g. via [`Self::fill`]
    /// followed by manual bookkeeping) and is now returning part of it.
    pub fn deallocate_range(&mut self, ptr: NonNull<u8>, size: usize) {
        let Some((region, start_offset)) = self.locate(ptr) else { return };
        let min = self.cfg.min_block_size();
        let mut aligned_start = round_up(start_offset, min);
        let end = round_down(start_offset + size, min);

        while aligned_start < end {
            let remaining = end - aligned_start;
            let max_level = match geometry::find_smallest_block_level(&self.cfg, remaining) {
                Some(l) => l,
                None => break,
            };
            let max_level_size = geometry::size_of_level(&self.cfg, max_level);

            let chosen_level = if max_level_size == remaining && aligned_start % max_level_size == 0 {
                max_level
            } else {
                geometry::level_alignment(&self.cfg, aligned_start, max_level + 1)
            };
            let block_size = geometry::size_of_level(&self.cfg, chosen_level);

            self.clear_descendants(region, aligned_start, chosen_level);
            self.deallocate_internal(region, aligned_start, chosen_level);

            aligned_start += block_size;
        }
    }

    /// Clears stale free-map and split-map bits for every block strictly
    /// below `chosen_level` within the subtree rooted at `offset`. Needed
    /// before [`Self::deallocate_internal`] can safely merge a block that
    /// was carved out of a larger, externally-tracked allocation.
    fn clear_descendants(&mut self, region: usize, offset: usize, chosen_level: u8) {
        let num_levels = self.cfg.num_levels() as u8;
        let block_size = geometry::size_of_level(&self.cfg, chosen_level);

        for ld in (chosen_level + 1)..num_levels {
            let step = geometry::size_of_level(&self.cfg, ld);
            let count = block_size / step;
            for k in 0..count {
                let o = offset + k * step;
                let idx = geometry::block_index(&self.cfg, o, ld);
                self.metadata().clear_free_pair(region, Metadata::map_index(idx));
                if ld < num_levels - 1 {
                    self.metadata().set_split_block(region, idx, false);
                }
            }
        }
    }

    /// Re-initializes every region to "fully allocated": free-map cleared,
    /// split/size-map marked full, every free list emptied, `free_size`
    /// reset to zero. For handing control of an already-populated region to
    /// the allocator with everything externally tracked as in use.
    pub fn fill(&mut self) {
        self.metadata().reset(true);
        unsafe {
            FreeLists::init_all(self.sentinels_slice());
            FreeNode::init_sentinel(self.lazy_sentinel);
        }
        self.lazy_count = 0;
        self.free_size = 0;

        #[cfg(feature = "trace")]
        log::trace!("fill: {} regions marked fully allocated", self.cfg.num_regions());
    }

    /// Drains the lazy list, actually merging each deferred leaf-sized free
    /// back into the main free-list/bitmap state. Must be called before any
    /// operation that needs to observe true free state (conservation
    /// checks, `fill`).
    pub fn empty_lazy_list(&mut self) {
        let leaf_level = (self.cfg.num_levels() - 1) as u8;
        while let Some(node) = FreeNode::pop_first(self.lazy_sentinel) {
            self.lazy_count -= 1;
            if let Some((region, offset)) = self.locate(node.cast()) {
                self.deallocate_internal(region, offset, leaf_level);
            }
        }
    }

    fn pop_lazy(&mut self) -> Option<NonNull<FreeNode>> {
        let node = FreeNode::pop_first(self.lazy_sentinel)?;
        self.lazy_count -= 1;
        Some(node)
    }

    fn push_lazy(&mut self, node: NonNull<FreeNode>) {
        unsafe { FreeNode::push_back(self.lazy_sentinel, node) };
        self.lazy_count += 1;
    }

    /// Recovers the size of the live allocation containing `ptr`, or `0` if
    /// `ptr` is outside the managed range.
    pub fn get_alloc_size(&mut self, ptr: NonNull<u8>) -> usize {
        match self.locate(ptr) {
            Some((region, offset)) => {
                let level = self.metadata().get_level(region, offset);
                geometry::size_of_level(&self.cfg, level)
            }
            None => 0,
        }
    }

    /// Total bytes currently free across all regions and levels, excluding
    /// the lazy list's deferred count (see the distilled spec's conservation
    /// invariant note on the lazy list's reserved contribution).
    pub fn free_size(&self) -> usize {
        self.free_size
    }

    pub fn config(&self) -> &BuddyConfig {
        &self.cfg
    }
}

fn size_map_bytes_total(cfg: &BuddyConfig) -> usize {
    let per_region = match cfg.size_encoding() {
        SizeEncoding::SplitBitmap => cfg.split_bitmap_bytes(),
        SizeEncoding::Nibble | SizeEncoding::Byte => cfg.size_map_bytes(),
    };
    per_region * cfg.num_regions()
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

fn round_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buddy::config::SizeEncoding;
    use std::alloc::{alloc, dealloc, Layout};

    struct Harness {
        alloc: BuddyAllocator,
        control_layout: Layout,
        control_ptr: *mut u8,
        backing_layout: Layout,
        backing_ptr: *mut u8,
    }

    impl Harness {
        fn new(cfg: BuddyConfig, start_full: bool) -> Self {
            let control_len = cfg.control_bytes() + BuddyConfig::LIST_NODE_SIZE;
            let control_layout = Layout::from_size_align(control_len, 16).unwrap();
            let backing_layout = Layout::from_size_align(cfg.total_capacity(), cfg.min_block_size()).unwrap();
            unsafe {
                let control_ptr = alloc(control_layout);
                let backing_ptr = alloc(backing_layout);
                let alloc = BuddyAllocator::from_raw_parts(
                    cfg,
                    NonNull::new_unchecked(control_ptr),
                    NonNull::new_unchecked(backing_ptr),
                    start_full,
                );
                Self { alloc, control_layout, control_ptr, backing_layout, backing_ptr }
            }
        }

        fn base(&self) -> *mut u8 {
            self.backing_ptr
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            unsafe {
                dealloc(self.control_ptr, self.control_layout);
                dealloc(self.backing_ptr, self.backing_layout);
            }
        }
    }

    fn five_level_cfg() -> BuddyConfig {
        // minBlockSizeLog2=4, maxBlockSizeLog2=8 -> 256 byte region, 16 byte leaves
        BuddyConfig::new(4, 8, 1, SizeEncoding::SplitBitmap, 0).unwrap()
    }

    #[test]
    fn s1_two_leaf_allocations_then_free_coalesce_to_one_block() {
        let mut h = Harness::new(five_level_cfg(), false);
        let p0 = h.alloc.allocate(16).unwrap();
        let p1 = h.alloc.allocate(16).unwrap();
        assert_eq!(p0.as_ptr(), h.base());
        assert_eq!(p1.as_ptr(), unsafe { h.base().add(16) });

        h.alloc.deallocate_sized(p0, 16);
        h.alloc.deallocate_sized(p1, 16);
        h.alloc.empty_lazy_list();

        assert!(!h.alloc.free_lists().is_empty(0, 0));
        for level in 1..h.alloc.config().num_levels() as u8 {
            assert!(h.alloc.free_lists().is_empty(0, level));
        }
    }

    #[test]
    fn s2_whole_region_allocation_exhausts_region() {
        let mut h = Harness::new(five_level_cfg(), false);
        let p = h.alloc.allocate(256).unwrap();
        assert_eq!(p.as_ptr(), h.base());
        assert!(matches!(h.alloc.allocate(16), Err(BuddyError::OutOfMemory)));
    }

    #[test]
    fn s3_split_allocations_recombine_after_reverse_order_free() {
        let mut h = Harness::new(five_level_cfg(), false);
        let a = h.alloc.allocate(64).unwrap();
        let b = h.alloc.allocate(64).unwrap();
        let c = h.alloc.allocate(128).unwrap();
        assert_eq!(a.as_ptr(), h.base());
        assert_eq!(b.as_ptr(), unsafe { h.base().add(64) });
        assert_eq!(c.as_ptr(), unsafe { h.base().add(128) });

        h.alloc.deallocate_sized(c, 128);
        h.alloc.deallocate_sized(b, 64);
        h.alloc.deallocate_sized(a, 64);
        h.alloc.empty_lazy_list();

        assert!(!h.alloc.free_lists().is_empty(0, 0));
    }

    #[test]
    fn s4_48_byte_request_rounds_to_64_byte_aligned_block() {
        let mut h = Harness::new(five_level_cfg(), false);
        let p = h.alloc.allocate(48).unwrap();
        assert_eq!((p.as_ptr() as usize - h.base() as usize) % 64, 0);
    }

    #[test]
    fn s5_region_exhausts_after_sixteen_leaf_allocations() {
        let mut h = Harness::new(five_level_cfg(), false);
        for _ in 0..16 {
            h.alloc.allocate(16).unwrap();
        }
        assert!(matches!(h.alloc.allocate(16), Err(BuddyError::OutOfMemory)));
    }

    #[test]
    fn s6_lazy_list_reuses_pointer_without_real_merge() {
        let cfg = BuddyConfig::new(4, 8, 1, SizeEncoding::SplitBitmap, 2).unwrap();
        let mut h = Harness::new(cfg, false);

        let p = h.alloc.allocate(16).unwrap();
        h.alloc.deallocate_sized(p, 16);
        let p2 = h.alloc.allocate(16).unwrap();
        assert_eq!(p, p2);
    }

    #[test]
    fn fill_then_allocate_fails_until_drained_and_reset() {
        let mut h = Harness::new(five_level_cfg(), false);
        h.alloc.fill();
        assert!(matches!(h.alloc.allocate(16), Err(BuddyError::OutOfMemory)));
    }

    #[test]
    fn byte_size_map_reports_allocation_size() {
        let cfg = BuddyConfig::new(4, 8, 1, SizeEncoding::Byte, 0).unwrap();
        let mut h = Harness::new(cfg, false);
        let p = h.alloc.allocate(64).unwrap();
        assert_eq!(h.alloc.get_alloc_size(p), 64);
    }

    #[test]
    fn out_of_range_pointer_deallocate_is_a_no_op() {
        let mut h = Harness::new(five_level_cfg(), false);
        let bogus = NonNull::new(0x1000 as *mut u8).unwrap();
        h.alloc.deallocate_sized(bogus, 16); // must not panic
    }

    #[test]
    fn invariant_conservation_holds_across_allocate_and_free_cycles() {
        let mut h = Harness::new(five_level_cfg(), false);
        let cap = h.alloc.config().total_capacity();
        assert_eq!(h.alloc.free_size(), cap);

        let a = h.alloc.allocate(64).unwrap();
        let b = h.alloc.allocate(64).unwrap();
        assert_eq!(h.alloc.free_size(), cap - 64 - 64);
        let c = h.alloc.allocate(32).unwrap();
        assert_eq!(h.alloc.free_size(), cap - 64 - 64 - 32);

        h.alloc.deallocate_sized(c, 32);
        h.alloc.deallocate_sized(a, 64);
        h.alloc.deallocate_sized(b, 64);
        assert_eq!(h.alloc.free_size(), cap);
    }

    #[test]
    fn invariant_fill_is_idempotent() {
        let mut h = Harness::new(five_level_cfg(), false);
        let free_len = h.alloc.cfg.free_bitmap_bytes() * h.alloc.cfg.num_regions();
        let size_len = size_map_bytes_total(&h.alloc.cfg);

        h.alloc.fill();
        let free_snapshot: Vec<u8> =
            unsafe { core::slice::from_raw_parts(h.alloc.free_map.as_ptr(), free_len) }.to_vec();
        let size_snapshot: Vec<u8> =
            unsafe { core::slice::from_raw_parts(h.alloc.size_map.as_ptr(), size_len) }.to_vec();
        let free_size_after_first = h.alloc.free_size();
        let lazy_count_after_first = h.alloc.lazy_count;

        h.alloc.fill();
        let free_again: Vec<u8> =
            unsafe { core::slice::from_raw_parts(h.alloc.free_map.as_ptr(), free_len) }.to_vec();
        let size_again: Vec<u8> =
            unsafe { core::slice::from_raw_parts(h.alloc.size_map.as_ptr(), size_len) }.to_vec();

        assert_eq!(free_snapshot, free_again);
        assert_eq!(size_snapshot, size_again);
        assert_eq!(free_size_after_first, h.alloc.free_size());
        assert_eq!(lazy_count_after_first, h.alloc.lazy_count);
    }

    #[test]
    fn invariant_split_map_reflects_live_splits_and_clears_on_full_coalesce() {
        let mut h = Harness::new(five_level_cfg(), false);

        let p = h.alloc.allocate(64).unwrap();
        assert!(h.alloc.metadata().is_split(0, 0)); // region root split into two 128s
        assert!(h.alloc.metadata().is_split(0, 1)); // lower 128 split into two 64s

        h.alloc.deallocate_sized(p, 64);
        assert!(!h.alloc.metadata().is_split(0, 0));
        assert!(!h.alloc.metadata().is_split(0, 1));
    }

    #[test]
    #[cfg(feature = "std")]
    fn create_allows_independently_supplied_backing_with_mapped_control() {
        let cfg = five_level_cfg();
        let backing_layout = Layout::from_size_align(cfg.total_capacity(), cfg.min_block_size()).unwrap();
        let backing_ptr = unsafe { alloc(backing_layout) };
        let backing = NonNull::new(backing_ptr).unwrap();

        let mut a = BuddyAllocator::create(cfg, None, Some(backing), false).unwrap();
        let p = a.allocate(16).unwrap();
        assert_eq!(p.as_ptr(), backing_ptr);
        drop(a); // must unmap only the control block it owns, not the caller's backing

        unsafe { dealloc(backing_ptr, backing_layout) };
    }
}
