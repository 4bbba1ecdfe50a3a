//! One-shot orchestration of the whole bring-up sequence.
//!
//! `plan_layout` runs every pass that can fail; `apply_layout` performs the
//! hardware writes. [`pci_setup`] chains the two for callers that only care
//! about the happy path. If planning fails, not a single address register
//! has been written.

use tracing::info;

use crate::assign::{assign_addresses, LayoutPlan};
use crate::commit::commit;
use crate::config::ConfigAccess;
use crate::device::DeviceRecord;
use crate::discover::discover_all;
use crate::irq::route_interrupt_lines;
use crate::ledger::{propagate_windows, size_devices, LedgerArena};
use crate::plan::{plan_root, PhysRange};
use crate::quirks::{apply_quirks, default_quirks, Quirk};
use crate::topology::assign_bus_numbers;
use crate::PciInitError;

/// Platform parameters for one boot-time layout pass.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Physical range carved up for memory and prefetchable BARs.
    pub range: PhysRange,
    /// Host IRQs backing PIRQ links A-D.
    pub pirq_to_irq: [u8; 4],
    pub quirks: Vec<Quirk>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            range: PhysRange::default(),
            // The PC convention: links A-D alternate between two PIC IRQs.
            pirq_to_irq: [11, 9, 11, 9],
            quirks: default_quirks().to_vec(),
        }
    }
}

/// Runs topology numbering, discovery, both ledger passes, root planning,
/// and address assignment. Pure planning aside from bus-number registers
/// and probe/restore sizing writes; BARs and windows are untouched.
pub fn plan_layout(
    access: &mut impl ConfigAccess,
    config: &SetupConfig,
) -> Result<(LayoutPlan, Vec<DeviceRecord>), PciInitError> {
    let last_bus = assign_bus_numbers(access)?;
    let mut records = discover_all(access, last_bus);
    info!(functions = records.len(), last_bus, "discovered PCI functions");

    let mut arena = LedgerArena::new(usize::from(last_bus) + 1)?;
    arena.link_bridges(&records);
    size_devices(access, &mut records, &mut arena)?;
    propagate_windows(&mut arena);

    let root = plan_root(arena.bus(0), config.range)?;
    let plan = assign_addresses(&mut arena, &mut records, root);
    Ok((plan, records))
}

/// Commits a finished plan and runs the post-commit fixups.
pub fn apply_layout(
    access: &mut impl ConfigAccess,
    plan: &LayoutPlan,
    records: &[DeviceRecord],
    config: &SetupConfig,
) {
    commit(access, plan);
    apply_quirks(access, records, &config.quirks, config.pirq_to_irq);
    route_interrupt_lines(access, records, config.pirq_to_irq);
}

/// Full bring-up: plan, then commit. On error the hardware still holds its
/// pre-call resource state.
pub fn pci_setup(
    access: &mut impl ConfigAccess,
    config: &SetupConfig,
) -> Result<LayoutPlan, PciInitError> {
    let (plan, records) = plan_layout(access, config)?;
    apply_layout(access, &plan, &records, config);
    Ok(plan)
}
