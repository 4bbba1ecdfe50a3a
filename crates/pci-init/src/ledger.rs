//! Per-bus resource ledgers: demand aggregation (bottom-up) and the bucket
//! cursors later drained by the assigner.
//!
//! A ledger never tracks individual requests. Each region keeps a histogram
//! of size-class counts; folding a BAR in is one increment, and the top-down
//! pass later turns the same histogram into addresses. The arena of ledgers
//! is transient: built fresh per layout pass, discarded once addresses are
//! committed.

use tracing::{debug, warn};

use crate::classify::{
    class_to_size, classify, round_up_pow2, size_to_class, RegionType, REGION_TYPE_COUNT,
    SIZE_CLASS_COUNT,
};
use crate::config::{ConfigAccess, HeaderKind};
use crate::device::{slot_offset, BarSlot, DeviceRecord, BAR_SLOTS, NUM_SLOTS, ROM_SLOT};
use crate::{PciBdf, PciInitError};

/// Demand accounting for one region type on one bus.
#[derive(Debug, Clone)]
pub struct RegionLedger {
    region: RegionType,
    counts: [u32; SIZE_CLASS_COUNT],
    /// Wider than the address space on purpose: aggregate demand from valid
    /// 32-bit BARs can exceed 4 GiB, and the planner must see the true total
    /// to reject it.
    sum: u64,
    max_item: u32,
    window: u32,
    base: u32,
    bucket_base: [u32; SIZE_CLASS_COUNT],
    bucket_used: [u32; SIZE_CLASS_COUNT],
}

impl RegionLedger {
    fn new(region: RegionType) -> Self {
        Self {
            region,
            counts: [0; SIZE_CLASS_COUNT],
            sum: 0,
            max_item: 0,
            window: 0,
            base: 0,
            bucket_base: [0; SIZE_CLASS_COUNT],
            bucket_used: [0; SIZE_CLASS_COUNT],
        }
    }

    /// Folds one power-of-two request into the histogram. Sub-granularity
    /// sizes round up to the class granularity, so `sum` reflects what the
    /// assigner will actually consume.
    pub fn add(&mut self, size: u32) {
        let class = size_to_class(size, self.region);
        let rounded = class_to_size(class, self.region);
        self.counts[class] += 1;
        self.sum += u64::from(rounded);
        self.max_item = self.max_item.max(rounded);
    }

    /// Folds a bridge window into this (parent) ledger. A window wider than
    /// 32 bits still counts toward the sum so root planning rejects the
    /// layout, but it cannot enter the histogram and is never drained.
    fn add_window(&mut self, window: u64) {
        self.sum += window;
        if let Ok(window) = u32::try_from(window) {
            self.counts[size_to_class(window, self.region)] += 1;
            self.max_item = self.max_item.max(window);
        }
    }

    /// Total rounded demand on this ledger.
    pub fn sum(&self) -> u64 {
        self.sum
    }

    /// Largest single request seen; the alignment the ledger's base needs.
    pub fn max_item(&self) -> u32 {
        self.max_item
    }

    /// Rounded bridge window size; meaningful only on non-root buses after
    /// [`propagate_windows`].
    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Seeds the per-class allocation cursors: largest class first, each
    /// non-empty bucket gets the running cursor as its base. Every address
    /// later handed out is a sum of sizes that are all multiples of it, so
    /// natural alignment needs no extra arithmetic (provided `base` itself
    /// is aligned to [`Self::max_item`]).
    pub fn seed(&mut self, base: u32) {
        debug_assert!(self.max_item == 0 || base % self.max_item == 0 || self.region == RegionType::Io);
        self.base = base;
        let mut cursor = base;
        for class in (0..SIZE_CLASS_COUNT).rev() {
            if self.counts[class] == 0 {
                continue;
            }
            self.bucket_base[class] = cursor;
            cursor += self.counts[class] * class_to_size(class, self.region);
        }
    }

    /// Drains one slot of `size` from the seeded histogram.
    ///
    /// # Panics
    ///
    /// Panics if the bucket was never filled for this size, i.e. the drain
    /// does not mirror the aggregation that built the histogram.
    pub fn take(&mut self, size: u32) -> u32 {
        let class = size_to_class(size, self.region);
        assert!(
            self.bucket_used[class] < self.counts[class],
            "size-class {} drained past its fill count",
            class
        );
        let addr =
            self.bucket_base[class] + self.bucket_used[class] * class_to_size(class, self.region);
        self.bucket_used[class] += 1;
        addr
    }
}

/// Ledger set for one bus plus its place in the tree.
#[derive(Debug, Clone)]
pub struct BusLedger {
    regions: [RegionLedger; REGION_TYPE_COUNT],
    /// The bridge whose secondary bus this is; `None` for bus 0.
    pub bridge: Option<PciBdf>,
    /// Parent bus number (0 for the root itself).
    pub primary: u8,
}

impl BusLedger {
    fn new() -> Self {
        Self {
            regions: [
                RegionLedger::new(RegionType::Io),
                RegionLedger::new(RegionType::Memory),
                RegionLedger::new(RegionType::Prefetchable),
            ],
            bridge: None,
            primary: 0,
        }
    }

    pub fn region(&self, region: RegionType) -> &RegionLedger {
        &self.regions[region.index()]
    }

    pub fn region_mut(&mut self, region: RegionType) -> &mut RegionLedger {
        &mut self.regions[region.index()]
    }
}

/// Transient arena of ledgers indexed by bus number.
#[derive(Debug)]
pub struct LedgerArena {
    buses: Vec<BusLedger>,
}

impl LedgerArena {
    /// Builds a zeroed arena for buses `0..bus_count`.
    ///
    /// Allocation failure is survivable for the platform (it just boots
    /// without PCI resources assigned), so it is reported rather than
    /// aborted on.
    pub fn new(bus_count: usize) -> Result<Self, PciInitError> {
        let mut buses = Vec::new();
        if buses.try_reserve_exact(bus_count).is_err() {
            warn!(bus_count, "could not reserve PCI ledger arena; continuing without PCI");
            return Err(PciInitError::ArenaExhausted);
        }
        buses.resize_with(bus_count, BusLedger::new);
        Ok(Self { buses })
    }

    pub fn last_bus(&self) -> u8 {
        (self.buses.len() - 1) as u8
    }

    pub fn bus(&self, bus: u8) -> &BusLedger {
        &self.buses[usize::from(bus)]
    }

    pub fn bus_mut(&mut self, bus: u8) -> &mut BusLedger {
        &mut self.buses[usize::from(bus)]
    }

    /// Records each bridge as the owner of its secondary bus.
    pub fn link_bridges(&mut self, records: &[DeviceRecord]) {
        for record in records {
            let Some(buses) = record.bridge_buses else {
                continue;
            };
            if buses.secondary == 0 {
                continue;
            }
            let ledger = self.bus_mut(buses.secondary);
            ledger.bridge = Some(record.bdf);
            ledger.primary = record.bdf.bus();
        }
    }

    /// Splits out a parent/child ledger pair. Bus numbering guarantees
    /// `primary < bus`, which is what makes the split well-formed.
    pub fn parent_and_bus_mut(&mut self, bus: u8) -> (&mut BusLedger, &mut BusLedger) {
        let primary = usize::from(self.bus(bus).primary);
        let (left, right) = self.buses.split_at_mut(usize::from(bus));
        (&mut left[primary], &mut right[0])
    }
}

/// Phase A: sizes every BAR and ROM slot of every non-bridge function and
/// folds the demand into the owning bus's ledger.
///
/// Each slot is probed by writing all-ones, reading the size mask back, and
/// restoring the original value; a zero readback means the slot is
/// unimplemented and is silently skipped.
pub fn size_devices(
    access: &mut impl ConfigAccess,
    records: &mut [DeviceRecord],
    arena: &mut LedgerArena,
) -> Result<(), PciInitError> {
    for record in records.iter_mut() {
        if record.header != HeaderKind::Normal {
            continue;
        }
        size_function(access, record, arena)?;
    }
    Ok(())
}

fn size_function(
    access: &mut impl ConfigAccess,
    record: &mut DeviceRecord,
    arena: &mut LedgerArena,
) -> Result<(), PciInitError> {
    let bdf = record.bdf;
    let mut slot = 0;

    while slot < NUM_SLOTS {
        let offset = slot_offset(slot);
        let old = access.read_config_dword(bdf, offset);
        access.write_config_dword(bdf, offset, !0);
        let probed = access.read_config_dword(bdf, offset);
        access.write_config_dword(bdf, offset, old);

        if slot == ROM_SLOT {
            // The ROM register reserves its low 11 bits (enable + padding).
            let mask = probed & !0x7FF;
            if mask != 0 {
                let size = (!mask).wrapping_add(1);
                record.slots[slot] = BarSlot { raw: old, size, is_64bit: false, addr: None };
                arena.bus_mut(bdf.bus()).region_mut(RegionType::Memory).add(size);
                debug!(%bdf, size, "sized expansion ROM");
            }
            slot += 1;
            continue;
        }

        if probed == 0 {
            slot += 1;
            continue;
        }

        let region = classify(probed);
        let (size, is_64bit) = match region {
            RegionType::Io => ((!(probed & !0x3)).wrapping_add(1), false),
            RegionType::Memory | RegionType::Prefetchable => {
                // Memory type bits [2:1] == 10 marks a 64-bit BAR occupying
                // this slot and the next.
                let is_64bit = (probed & 0x6) == 0x4;
                ((!(probed & !0xF)).wrapping_add(1), is_64bit)
            }
        };

        if is_64bit {
            if slot + 1 >= BAR_SLOTS {
                return Err(PciInitError::UnsupportedResource { bdf, slot });
            }
            let hi_offset = slot_offset(slot + 1);
            let old_hi = access.read_config_dword(bdf, hi_offset);
            access.write_config_dword(bdf, hi_offset, !0);
            let probed_hi = access.read_config_dword(bdf, hi_offset);
            access.write_config_dword(bdf, hi_offset, old_hi);
            // Checked precondition: everything must fit 32-bit space. A
            // nonzero upper size mask is refused, never truncated.
            if probed_hi != 0 {
                return Err(PciInitError::UnsupportedResource { bdf, slot });
            }
        }

        record.slots[slot] = BarSlot { raw: old, size, is_64bit, addr: None };
        arena.bus_mut(bdf.bus()).region_mut(region).add(size);
        debug!(%bdf, slot, region = region.name(), size, "sized BAR");

        slot += if is_64bit { 2 } else { 1 };
    }

    Ok(())
}

/// Phase B: visits buses highest-first and folds each bridge's rounded
/// window into its parent's ledger as if it were a single BAR.
///
/// Windows are clamped to the architectural minimums (bridges cannot decode
/// less than 4KiB of I/O or 1MiB of memory) and rounded up to a power of
/// two, which is also what keeps them alignable by the bucket walk.
pub fn propagate_windows(arena: &mut LedgerArena) {
    for bus in (1..=arena.last_bus()).rev() {
        let Some(bridge) = arena.bus(bus).bridge else {
            continue;
        };
        let (parent, child) = arena.parent_and_bus_mut(bus);
        for region in RegionType::ALL {
            let min = match region {
                RegionType::Io => pc_constants::PCI_BRIDGE_IO_MIN,
                RegionType::Memory | RegionType::Prefetchable => pc_constants::PCI_BRIDGE_MEM_MIN,
            };
            let ledger = child.region_mut(region);
            let window = round_up_pow2(ledger.sum().max(u64::from(min)));
            // A window past 32 bits can never pass root planning, so the
            // clamped register value below is never committed or drained.
            ledger.window = u32::try_from(window).unwrap_or(u32::MAX);
            parent.region_mut(region).add_window(window);
            debug!(%bridge, region = region.name(), window, "reserved bridge window");
        }
    }
}
