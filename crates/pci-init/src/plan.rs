//! Root window planner: partitioning the caller-supplied physical range
//! between the root bus's memory and prefetchable-memory ledgers.

use tracing::{debug, info};

use crate::classify::RegionType;
use crate::ledger::BusLedger;
use crate::PciInitError;

/// Half-open physical address range `[start, end)` available for memory and
/// prefetchable-memory allocation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PhysRange {
    pub start: u32,
    pub end: u32,
}

impl Default for PhysRange {
    fn default() -> Self {
        Self {
            start: pc_constants::PCI_MMIO_BASE,
            end: pc_constants::PCI_MMIO_END_EXCLUSIVE,
        }
    }
}

/// Base addresses chosen for the root bus, one per region type.
///
/// I/O is fixed by legacy PC convention rather than carved from the
/// physical range.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RootWindows {
    pub io: u32,
    pub memory: u32,
    pub prefetchable: u32,
}

impl RootWindows {
    pub fn base(&self, region: RegionType) -> u32 {
        match region {
            RegionType::Io => self.io,
            RegionType::Memory => self.memory,
            RegionType::Prefetchable => self.prefetchable,
        }
    }
}

fn align_down(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Lays the two memory windows out from the top of the range downward.
///
/// The ledger with the larger total goes immediately below `end`, aligned
/// down to its own largest single item; the other goes immediately below
/// that. Top-placing the larger region first minimizes alignment padding
/// versus the reverse order. If the lower window ends up below `start`, the
/// devices do not fit and the whole pass is abandoned before anything is
/// written. Root I/O demand is likewise checked against the fixed port
/// window, since x86 port space is only 16 bits wide.
///
/// All feasibility arithmetic is 64-bit: demand sums from valid 32-bit BARs
/// can exceed 4 GiB and must read as infeasible, never wrap.
pub fn plan_root(root: &BusLedger, range: PhysRange) -> Result<RootWindows, PciInitError> {
    let io = root.region(RegionType::Io);
    let io_capacity = pc_constants::PCI_IO_END_EXCLUSIVE - pc_constants::PCI_IO_BASE;
    if io.sum() > u64::from(io_capacity) {
        return Err(PciInitError::RootWindowInfeasible {
            start: pc_constants::PCI_IO_BASE,
            end: pc_constants::PCI_IO_END_EXCLUSIVE,
        });
    }

    let infeasible = PciInitError::RootWindowInfeasible {
        start: range.start,
        end: range.end,
    };

    let mem = root.region(RegionType::Memory);
    let pref = root.region(RegionType::Prefetchable);

    let (first, second) = if mem.sum() >= pref.sum() {
        (mem, pref)
    } else {
        (pref, mem)
    };

    let place = |below: u32, ledger: &crate::ledger::RegionLedger| -> Result<u32, PciInitError> {
        let top = u64::from(below).checked_sub(ledger.sum()).ok_or(infeasible)?;
        let base = align_down(top, u64::from(ledger.max_item().max(1)));
        if base < u64::from(range.start) {
            return Err(infeasible);
        }
        // top <= below, so the aligned base always fits back in 32 bits.
        Ok(base as u32)
    };

    let first_base = place(range.end, first)?;
    let second_base = place(first_base, second)?;

    let (memory, prefetchable) = if mem.sum() >= pref.sum() {
        (first_base, second_base)
    } else {
        (second_base, first_base)
    };

    let windows = RootWindows {
        io: pc_constants::PCI_IO_BASE,
        memory,
        prefetchable,
    };
    debug!(
        io = format_args!("{:#06x}", windows.io),
        memory = format_args!("{:#010x}", windows.memory),
        prefetchable = format_args!("{:#010x}", windows.prefetchable),
        "root windows planned"
    );
    info!(
        mem_demand = mem.sum(),
        pref_demand = pref.sum(),
        "root layout feasible"
    );
    Ok(windows)
}
