//! Construction-time configuration for a [`super::BuddyAllocator`].
//!
//! The original implementation parameterizes its allocator on a C++
//! template struct of compile-time integers (`minBlockSizeLog2`,
//! `maxBlockSizeLog2`, `numRegions`, `sizeBits`). A literal translation to
//! Rust const generics would need array lengths computed from const generic
//! expressions, which requires the unstable `generic_const_exprs` feature.
//! Instead, following `Talloc::slice_bytes`/`Talloc::extend`'s approach of
//! computing layout at construction time, `BuddyConfig` is an ordinary
//! runtime-validated record and every bitmap/free-list length is derived
//! from it once, at `BuddyAllocator::create`/`try_new` time.

/// Selects which of the two alternative per-leaf metadata encodings is
/// active. Only one is ever live in a given allocator; the other's storage
/// simply doesn't exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeEncoding {
    /// `sizeBits == 0`: one bit per internal tree node, set iff that node
    /// has been split into its two children.
    SplitBitmap,
    /// `sizeBits == 4`: one nibble per leaf, holding that leaf's owning
    /// block's level directly. Requires `num_levels() <= 17`.
    Nibble,
    /// `sizeBits == 8`: one byte per leaf, holding that leaf's owning
    /// block's level directly.
    Byte,
}

impl SizeEncoding {
    /// Bits occupied per leaf by this encoding, or `0` for [`SplitBitmap`](Self::SplitBitmap)
    /// (whose storage is sized per internal node, not per leaf).
    const fn leaf_bits(self) -> usize {
        match self {
            SizeEncoding::SplitBitmap => 0,
            SizeEncoding::Nibble => 4,
            SizeEncoding::Byte => 8,
        }
    }
}

/// Error returned when a [`BuddyConfig`] fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `min_block_size_log2` was smaller than 4.
    MinBlockTooSmall,
    /// `max_block_size_log2` was not strictly greater than `min_block_size_log2`.
    MaxNotGreaterThanMin,
    /// `num_regions` was zero.
    NoRegions,
    /// `SizeEncoding::Nibble` was selected with more than 17 levels.
    TooManyLevelsForNibble,
    /// The smallest block is too small to hold two free-list pointers.
    MinBlockTooSmallForListNode,
}

/// Construction-time-fixed parameters for a buddy allocator instance.
///
/// See the module documentation for why this is a runtime record rather
/// than a set of const generics.
#[derive(Debug, Clone, Copy)]
pub struct BuddyConfig {
    min_block_size_log2: u8,
    max_block_size_log2: u8,
    num_regions: usize,
    size_encoding: SizeEncoding,
    lazy_threshold: usize,
}

impl BuddyConfig {
    /// Size, in bytes, of an intrusive free-list node: two machine pointers.
    pub const LIST_NODE_SIZE: usize = 2 * core::mem::size_of::<usize>();

    /// Validate and construct a `BuddyConfig`.
    pub fn new(
        min_block_size_log2: u8,
        max_block_size_log2: u8,
        num_regions: usize,
        size_encoding: SizeEncoding,
        lazy_threshold: usize,
    ) -> Result<Self, ConfigError> {
        if min_block_size_log2 < 4 {
            return Err(ConfigError::MinBlockTooSmall);
        }
        if max_block_size_log2 <= min_block_size_log2 {
            return Err(ConfigError::MaxNotGreaterThanMin);
        }
        if num_regions == 0 {
            return Err(ConfigError::NoRegions);
        }
        let num_levels = (max_block_size_log2 - min_block_size_log2) as usize + 1;
        if matches!(size_encoding, SizeEncoding::Nibble) && num_levels > 17 {
            return Err(ConfigError::TooManyLevelsForNibble);
        }
        if (1usize << min_block_size_log2) < Self::LIST_NODE_SIZE {
            return Err(ConfigError::MinBlockTooSmallForListNode);
        }

        Ok(Self {
            min_block_size_log2,
            max_block_size_log2,
            num_regions,
            size_encoding,
            lazy_threshold,
        })
    }

    #[inline]
    pub const fn min_block_size_log2(&self) -> u8 {
        self.min_block_size_log2
    }
    #[inline]
    pub const fn max_block_size_log2(&self) -> u8 {
        self.max_block_size_log2
    }
    #[inline]
    pub const fn num_regions(&self) -> usize {
        self.num_regions
    }
    #[inline]
    pub const fn size_encoding(&self) -> SizeEncoding {
        self.size_encoding
    }
    #[inline]
    pub const fn lazy_threshold(&self) -> usize {
        self.lazy_threshold
    }

    /// `numLevels = maxBlockSizeLog2 - minBlockSizeLog2 + 1`. Level 0 is the
    /// whole region, level `num_levels() - 1` is a leaf.
    #[inline]
    pub const fn num_levels(&self) -> usize {
        (self.max_block_size_log2 - self.min_block_size_log2) as usize + 1
    }

    #[inline]
    pub const fn min_block_size(&self) -> usize {
        1 << self.min_block_size_log2
    }

    /// Size in bytes of one region (the whole-region, level-0 block size).
    #[inline]
    pub const fn region_size(&self) -> usize {
        1 << self.max_block_size_log2
    }

    /// Total number of leaves (level `num_levels() - 1` blocks) per region.
    #[inline]
    pub const fn leaves_per_region(&self) -> usize {
        1 << (self.num_levels() - 1)
    }

    /// Total managed capacity across all regions.
    #[inline]
    pub const fn total_capacity(&self) -> usize {
        self.region_size() * self.num_regions
    }

    /// Bytes needed for one region's free-map: one bit per sibling pair in
    /// the complete binary tree of `num_levels()` levels.
    #[inline]
    pub const fn free_bitmap_bytes(&self) -> usize {
        let total_nodes = (1usize << self.num_levels()) - 1;
        (total_nodes + 15) / 16
    }

    /// Bytes needed for one region's split-map, or `0` if the size-map
    /// encoding is active instead.
    #[inline]
    pub const fn split_bitmap_bytes(&self) -> usize {
        match self.size_encoding {
            SizeEncoding::SplitBitmap => {
                let internal_nodes = (1usize << (self.num_levels() - 1)) - 1;
                (internal_nodes + 7) / 8
            }
            _ => 0,
        }
    }

    /// Bytes needed for one region's size-map, or `0` if the split-bitmap
    /// encoding is active instead.
    #[inline]
    pub const fn size_map_bytes(&self) -> usize {
        let leaf_bits = self.size_encoding.leaf_bits();
        if leaf_bits == 0 {
            return 0;
        }
        (self.leaves_per_region() * leaf_bits + 7) / 8
    }

    /// Total control-block bytes required for the free-map, split/size-map,
    /// and free-list sentinels across all regions.
    pub const fn control_bytes(&self) -> usize {
        let per_region_maps = self.free_bitmap_bytes() + self.split_bitmap_bytes() + self.size_map_bytes();
        let sentinels = self.num_regions * self.num_levels() * Self::LIST_NODE_SIZE;
        per_region_maps * self.num_regions + sentinels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(size_encoding: SizeEncoding) -> BuddyConfig {
        // minBlockSizeLog2 = 4, maxBlockSizeLog2 = 8, numRegions = 1, numLevels = 5
        BuddyConfig::new(4, 8, 1, size_encoding, 0).unwrap()
    }

    #[test]
    fn rejects_invalid_configs() {
        assert_eq!(
            BuddyConfig::new(3, 8, 1, SizeEncoding::SplitBitmap, 0),
            Err(ConfigError::MinBlockTooSmall)
        );
        assert_eq!(
            BuddyConfig::new(8, 8, 1, SizeEncoding::SplitBitmap, 0),
            Err(ConfigError::MaxNotGreaterThanMin)
        );
        assert_eq!(
            BuddyConfig::new(4, 8, 0, SizeEncoding::SplitBitmap, 0),
            Err(ConfigError::NoRegions)
        );
        assert_eq!(
            BuddyConfig::new(4, 30, 1, SizeEncoding::Nibble, 0),
            Err(ConfigError::TooManyLevelsForNibble)
        );
    }

    #[test]
    fn derived_sizes_match_five_level_example() {
        let c = cfg(SizeEncoding::SplitBitmap);
        assert_eq!(c.num_levels(), 5);
        assert_eq!(c.min_block_size(), 16);
        assert_eq!(c.region_size(), 256);
        assert_eq!(c.leaves_per_region(), 16);
        // total_nodes = 2^5 - 1 = 31, free bitmap bits = 31 -> ceil(31/16) = 2 bytes
        assert_eq!(c.free_bitmap_bytes(), 2);
        // internal_nodes = 2^4 - 1 = 15 -> ceil(15/8) = 2 bytes
        assert_eq!(c.split_bitmap_bytes(), 2);
        assert_eq!(c.size_map_bytes(), 0);
    }

    #[test]
    fn size_map_byte_encoding_sizes_per_leaf() {
        let c = cfg(SizeEncoding::Byte);
        assert_eq!(c.split_bitmap_bytes(), 0);
        assert_eq!(c.size_map_bytes(), 16); // 16 leaves * 8 bits / 8
    }

    #[test]
    fn size_map_nibble_encoding_packs_two_per_byte() {
        let c = cfg(SizeEncoding::Nibble);
        assert_eq!(c.size_map_bytes(), 8); // 16 leaves * 4 bits / 8
    }
}
