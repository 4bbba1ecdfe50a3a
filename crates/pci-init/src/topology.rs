//! Bus topology builder: depth-first secondary/subordinate bus numbering.

use tracing::{debug, info};

use crate::config::{regs, ConfigAccess};
use crate::discover::discover_bus;
use crate::PciInitError;

/// Highest architecturally addressable bus number.
pub const MAX_BUS: u16 = 255;

/// Assigns secondary/subordinate bus numbers to every bridge reachable from
/// bus 0 and returns the highest bus number in use.
///
/// The next-free-bus counter is threaded explicitly through the recursion;
/// exceeding [`MAX_BUS`] aborts with [`PciInitError::TopologyOverflow`]
/// before any resource accounting starts.
pub fn assign_bus_numbers(access: &mut impl ConfigAccess) -> Result<u8, PciInitError> {
    let mut next_free: u16 = 1;
    let last = init_bus(access, 0, &mut next_free)?;
    info!(last_bus = last, "PCI bus topology numbered");
    Ok(last)
}

/// Numbers every bridge directly on `bus`, recursing into each new secondary
/// bus, and returns the highest bus number allocated in this subtree (the
/// bus's own number if it carries no bridges).
fn init_bus(
    access: &mut impl ConfigAccess,
    bus: u8,
    next_free: &mut u16,
) -> Result<u8, PciInitError> {
    let mut highest = bus;

    for record in discover_bus(access, bus) {
        if !record.is_bridge() {
            continue;
        }
        let bdf = record.bdf;

        // Open the bridge wide before probing behind it: an under-ranged
        // subordinate would silently misroute config cycles to higher buses.
        access.write_config_byte(bdf, regs::SUBORDINATE_BUS, MAX_BUS as u8);
        access.write_config_byte(bdf, regs::PRIMARY_BUS, bus);

        if *next_free > MAX_BUS {
            return Err(PciInitError::TopologyOverflow);
        }
        let secondary = *next_free as u8;
        *next_free += 1;
        access.write_config_byte(bdf, regs::SECONDARY_BUS, secondary);

        let subordinate = init_bus(access, secondary, next_free)?;
        access.write_config_byte(bdf, regs::SUBORDINATE_BUS, subordinate);
        debug!(%bdf, primary = bus, secondary, subordinate, "numbered bridge");

        highest = highest.max(subordinate);
    }

    Ok(highest)
}
