//! Top-down address assigner: turns seeded ledgers into a concrete layout.
//!
//! The output is pure data. Nothing here touches hardware; the commit step
//! replays the plan only after every bus and every BAR has an address.

use tracing::debug;

use crate::classify::RegionType;
use crate::config::HeaderKind;
use crate::device::DeviceRecord;
use crate::ledger::LedgerArena;
use crate::plan::RootWindows;
use crate::PciBdf;

/// A half-open `[base, base + size)` window.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WindowRange {
    pub base: u32,
    pub size: u32,
}

impl WindowRange {
    pub fn end_exclusive(&self) -> u32 {
        self.base + self.size
    }

    pub fn contains(&self, other: &WindowRange) -> bool {
        self.base <= other.base && other.end_exclusive() <= self.end_exclusive()
    }
}

/// One concrete BAR (or expansion ROM) address.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BarAssignment {
    pub bdf: PciBdf,
    pub slot: usize,
    pub region: RegionType,
    pub address: u32,
    pub size: u32,
    pub is_64bit: bool,
}

/// Window registers to program into one bridge.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BridgeWindows {
    pub bdf: PciBdf,
    pub io: WindowRange,
    pub memory: WindowRange,
    pub prefetchable: WindowRange,
}

impl BridgeWindows {
    pub fn window(&self, region: RegionType) -> WindowRange {
        match region {
            RegionType::Io => self.io,
            RegionType::Memory => self.memory,
            RegionType::Prefetchable => self.prefetchable,
        }
    }
}

/// Complete, committed-to-nothing-yet layout for one boot attempt.
#[derive(Debug, Clone)]
pub struct LayoutPlan {
    pub root: RootWindows,
    pub bars: Vec<BarAssignment>,
    pub windows: Vec<BridgeWindows>,
}

/// Assigns every bus base and every BAR address.
///
/// Buses are visited in ascending order; numbering guarantees a parent's
/// number is lower than any bus behind it, so each parent's cursors are
/// seeded before its children draw from them. Device records are updated in
/// place (`BarSlot::addr`) as well as collected into the plan.
pub fn assign_addresses(
    arena: &mut LedgerArena,
    records: &mut [DeviceRecord],
    root: RootWindows,
) -> LayoutPlan {
    let mut windows = Vec::new();

    for region in RegionType::ALL {
        arena.bus_mut(0).region_mut(region).seed(root.base(region));
    }

    for bus in 1..=arena.last_bus() {
        let Some(bridge) = arena.bus(bus).bridge else {
            continue;
        };
        let (parent, child) = arena.parent_and_bus_mut(bus);
        let mut ranges = [WindowRange { base: 0, size: 0 }; 3];
        for region in RegionType::ALL {
            let window = child.region(region).window();
            let base = parent.region_mut(region).take(window);
            child.region_mut(region).seed(base);
            ranges[region.index()] = WindowRange { base, size: window };
            debug!(
                %bridge,
                region = region.name(),
                base = format_args!("{base:#010x}"),
                window,
                "assigned bridge window"
            );
        }
        windows.push(BridgeWindows {
            bdf: bridge,
            io: ranges[RegionType::Io.index()],
            memory: ranges[RegionType::Memory.index()],
            prefetchable: ranges[RegionType::Prefetchable.index()],
        });
    }

    let mut bars = Vec::new();
    for record in records.iter_mut() {
        if record.header != HeaderKind::Normal {
            continue;
        }
        let bus = record.bdf.bus();
        for slot in 0..record.slots.len() {
            if !record.slots[slot].is_sized() {
                continue;
            }
            let region = record.slots[slot].region(slot);
            let size = record.slots[slot].size;
            let address = arena.bus_mut(bus).region_mut(region).take(size);
            record.slots[slot].addr = Some(address);
            debug!(
                bdf = %record.bdf,
                slot,
                region = region.name(),
                address = format_args!("{address:#010x}"),
                size,
                "assigned BAR"
            );
            bars.push(BarAssignment {
                bdf: record.bdf,
                slot,
                region,
                address,
                size,
                is_64bit: record.slots[slot].is_64bit,
            });
        }
    }

    LayoutPlan { root, bars, windows }
}
