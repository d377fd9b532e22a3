//! The three overlapping bitmap encodings backing a region's allocation
//! state: the free-map (always active), and exactly one of the split-map
//! or size-map (chosen by [`SizeEncoding`] at construction).
//!
//! All storage here is externally owned - raw byte slices carved out of
//! the allocator's control block (see [`super::control`]) - so this module
//! never allocates.

use super::bitops;
use super::config::{BuddyConfig, SizeEncoding};
use super::geometry;

/// Owns the free-map and the active split-map/size-map storage for every
/// region of one allocator instance.
pub struct Metadata<'a> {
    cfg: BuddyConfig,
    free_map: &'a mut [u8],
    size_store: SizeStore<'a>,
}

enum SizeStore<'a> {
    SplitBitmap(&'a mut [u8]),
    Nibble(&'a mut [u8]),
    Byte(&'a mut [u8]),
}

impl<'a> Metadata<'a> {
    /// Builds a `Metadata` view over externally-owned storage.
    ///
    /// # Safety
    /// `free_map` must be at least `cfg.free_bitmap_bytes() * cfg.num_regions()`
    /// bytes, and `size_store`'s slice must be sized to match `cfg.size_encoding()`.
    pub(super) unsafe fn new(cfg: BuddyConfig, free_map: &'a mut [u8], size_map: &'a mut [u8]) -> Self {
        let size_store = match cfg.size_encoding() {
            SizeEncoding::SplitBitmap => SizeStore::SplitBitmap(size_map),
            SizeEncoding::Nibble => SizeStore::Nibble(size_map),
            SizeEncoding::Byte => SizeStore::Byte(size_map),
        };
        Self { cfg, free_map, size_store }
    }

    /// Maps a global block index to its sibling-pair index in the free-map.
    ///
    /// Two layouts are possible here (see the distilled spec's open
    /// question): `(i - 1) / 2 + 1` with `i == 0` special-cased to `0`, or
    /// the simpler `(i - 1) / 2`. This crate follows the latter, matching
    /// `ibuddy.cpp`'s `map_index`; the root block (`i == 0`) never has a
    /// pair bit of its own and must not be passed here.
    #[inline]
    pub fn map_index(block_idx: usize) -> usize {
        debug_assert!(block_idx > 0, "the root block has no sibling pair");
        (block_idx - 1) / 2
    }

    /// Reads the free-map pair bit for `pair_idx` in `region`.
    ///
    /// Despite the name (kept from the distilled spec's external surface),
    /// this is a raw XOR-encoded bit read, not a semantic "is allocated"
    /// query in isolation - see the module-level docs on the free-map's
    /// invariant.
    #[inline]
    pub fn block_is_allocated(&self, region: usize, pair_idx: usize) -> bool {
        bitops::get_bit(self.free_map, self.free_bit(region, pair_idx))
    }

    /// Flips the free-map pair bit for `pair_idx` in `region`. This is the
    /// only mutator the free-map uses during normal allocate/deallocate.
    #[inline]
    pub fn flip_allocated_block(&mut self, region: usize, pair_idx: usize) {
        let bit = self.free_bit(region, pair_idx);
        bitops::flip_bit(self.free_map, bit);
    }

    /// Unconditionally clears a free-map pair bit to "homogeneous".
    ///
    /// Unlike [`Self::flip_allocated_block`] this does not XOR - it is only
    /// for `deallocate_range`'s cleanup of descendant metadata left stale by
    /// a coarser-grained allocation, where the correct reset is "unknown,
    /// make it zero" rather than "toggle relative to history".
    #[inline]
    pub fn clear_free_pair(&mut self, region: usize, pair_idx: usize) {
        let bit = self.free_bit(region, pair_idx);
        bitops::clear_bit(self.free_map, bit);
    }

    #[inline]
    fn free_bit(&self, region: usize, pair_idx: usize) -> usize {
        region * self.cfg.free_bitmap_bytes() * 8 + pair_idx
    }

    /// Returns whether the internal node `block_idx` in `region` is split.
    /// Only meaningful under [`SizeEncoding::SplitBitmap`]; always `false`
    /// otherwise (the size-map encodings don't track this explicitly).
    #[inline]
    pub fn is_split(&self, region: usize, block_idx: usize) -> bool {
        match &self.size_store {
            SizeStore::SplitBitmap(bytes) => {
                bitops::get_bit(bytes, self.split_bit(region, block_idx))
            }
            _ => false,
        }
    }

    /// Sets whether the internal node `block_idx` in `region` is split.
    /// A no-op under the size-map encodings.
    #[inline]
    pub fn set_split_block(&mut self, region: usize, block_idx: usize, split: bool) {
        if let SizeStore::SplitBitmap(bytes) = &mut self.size_store {
            let bit = region * self.cfg.split_bitmap_bytes() * 8 + block_idx;
            bitops::write_bit(bytes, bit, split);
        }
    }

    #[inline]
    fn split_bit(&self, region: usize, block_idx: usize) -> usize {
        region * self.cfg.split_bitmap_bytes() * 8 + block_idx
    }

    /// Directly stores `level` for the leaf containing `offset_in_region`.
    /// Only meaningful under the size-map encodings; a no-op under
    /// [`SizeEncoding::SplitBitmap`] (there, the split-map itself carries
    /// the information and `get_level` recovers it by scanning).
    pub fn set_level(&mut self, region: usize, offset_in_region: usize, level: u8) {
        let leaf = self.leaf_index(region, offset_in_region);
        match &mut self.size_store {
            SizeStore::SplitBitmap(_) => {}
            SizeStore::Nibble(bytes) => bitops::set_nibble(bytes, leaf, level),
            SizeStore::Byte(bytes) => bytes[leaf] = level,
        }
    }

    /// Recovers the level of the block containing `offset_in_region`.
    ///
    /// Under the size-map encodings this is a direct lookup. Under the
    /// split-bitmap encoding, it walks from the leaf's shallowest ancestor
    /// toward the leaf, returning the deepest level whose parent is marked
    /// split (ported from `ibuddy.cpp::get_level`).
    pub fn get_level(&self, region: usize, offset_in_region: usize) -> u8 {
        match &self.size_store {
            SizeStore::SplitBitmap(bytes) => {
                let num_levels = self.cfg.num_levels() as u8;
                for level in (1..num_levels).rev() {
                    let parent_idx = geometry::block_index(&self.cfg, offset_in_region, level - 1);
                    let bit = region * self.cfg.split_bitmap_bytes() * 8 + parent_idx;
                    if bitops::get_bit(bytes, bit) {
                        return level;
                    }
                }
                0
            }
            SizeStore::Nibble(bytes) => bitops::get_nibble(bytes, self.leaf_index(region, offset_in_region)),
            SizeStore::Byte(bytes) => bytes[self.leaf_index(region, offset_in_region)],
        }
    }

    #[inline]
    fn leaf_index(&self, region: usize, offset_in_region: usize) -> usize {
        region * self.cfg.leaves_per_region() + offset_in_region / self.cfg.min_block_size()
    }

    /// Resets every region's free-map, split/size-map to the "fully
    /// allocated" pattern used by [`super::BuddyAllocator::fill`] and by
    /// construction when `start_full` is set.
    pub fn reset(&mut self, start_full: bool) {
        let free_pattern = if start_full { 0x00 } else { 0x55 };
        self.free_map.fill(free_pattern);
        match &mut self.size_store {
            SizeStore::SplitBitmap(bytes) => bytes.fill(if start_full { 0xFF } else { 0x00 }),
            SizeStore::Nibble(bytes) | SizeStore::Byte(bytes) => {
                bytes.fill(if start_full { 0xFF } else { 0x00 })
            }
        }
    }
}
