//! Address-space classification and power-of-two size bucketing.
//!
//! Every resource request is reduced to a `(RegionType, size class)` pair.
//! The class index batches same-sized requests so the ledgers only count
//! "how many windows of each power-of-two size" instead of tracking
//! individual BARs.

/// The three PCI address spaces a BAR can decode.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RegionType {
    Io,
    Memory,
    Prefetchable,
}

pub const REGION_TYPE_COUNT: usize = 3;

/// Number of size-class buckets per region ledger. With 32-bit sizes the
/// largest reachable class is `31 - granularity_shift`, so 32 always covers
/// the range.
pub const SIZE_CLASS_COUNT: usize = 32;

impl RegionType {
    pub const ALL: [RegionType; REGION_TYPE_COUNT] =
        [RegionType::Io, RegionType::Memory, RegionType::Prefetchable];

    pub const fn index(self) -> usize {
        match self {
            RegionType::Io => 0,
            RegionType::Memory => 1,
            RegionType::Prefetchable => 2,
        }
    }

    /// Allocation granularity as a shift: I/O space is bucketed in 4-byte
    /// units, memory in 4KiB units.
    pub const fn granularity_shift(self) -> u32 {
        match self {
            RegionType::Io => 2,
            RegionType::Memory | RegionType::Prefetchable => 12,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RegionType::Io => "io",
            RegionType::Memory => "mem",
            RegionType::Prefetchable => "prefmem",
        }
    }
}

/// Classifies a raw BAR value by its low-order type bits.
///
/// Bit 0 is the I/O space indicator; bit 3 marks prefetchable memory. Pure
/// and total: every 32-bit value maps to one of the three regions.
pub const fn classify(raw_bar: u32) -> RegionType {
    if raw_bar & 0x1 != 0 {
        RegionType::Io
    } else if raw_bar & 0x8 != 0 {
        RegionType::Prefetchable
    } else {
        RegionType::Memory
    }
}

/// Maps a power-of-two byte size to its size-class bucket.
///
/// Sizes below the region granularity all land in class 0. Callers must
/// round non-power-of-two sizes up first ([`round_up_pow2`]); device BARs
/// are powers of two by the sizing protocol and never need it.
pub fn size_to_class(size: u32, region: RegionType) -> usize {
    debug_assert!(size.is_power_of_two());
    (size.ilog2().saturating_sub(region.granularity_shift())) as usize
}

/// Inverse of [`size_to_class`] for in-range classes.
pub fn class_to_size(class: usize, region: RegionType) -> u32 {
    debug_assert!(class < SIZE_CLASS_COUNT);
    1u32 << (class as u32 + region.granularity_shift())
}

/// Rounds up to the next power of two; used only for bridge window sizes.
/// Takes and returns `u64` because aggregate demand behind a bridge can
/// legitimately exceed the 32-bit address space.
pub fn round_up_pow2(n: u64) -> u64 {
    n.max(1).next_power_of_two()
}
