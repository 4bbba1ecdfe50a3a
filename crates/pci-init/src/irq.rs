//! Legacy INTx line routing.
//!
//! The interrupt-line register is pure bookkeeping for the OS; it has no
//! effect on routing hardware. Still, firmware fills it so drivers written
//! against the PC convention find a usable IRQ number.

use tracing::debug;

use crate::config::{regs, ConfigAccess};
use crate::device::DeviceRecord;

/// Barber-pole swizzle: `PIRQ = (device + (pin - 1)) mod 4`.
///
/// `pin` is the config-space encoding (1 = INTA#). Returns `None` for pin 0
/// (the function does not use INTx) and out-of-range values.
pub fn swizzle(device: u8, pin: u8) -> Option<usize> {
    if pin == 0 || pin > 4 {
        return None;
    }
    Some(usize::from(device.wrapping_add(pin - 1) & 0x03))
}

/// Writes each function's interrupt-line register through the PIRQ table.
pub fn route_interrupt_lines(
    access: &mut impl ConfigAccess,
    records: &[DeviceRecord],
    pirq_to_irq: [u8; 4],
) {
    for record in records {
        let pin = access.read_config_byte(record.bdf, regs::INTERRUPT_PIN);
        let Some(pirq) = swizzle(record.bdf.device(), pin) else {
            continue;
        };
        let irq = pirq_to_irq[pirq];
        access.write_config_byte(record.bdf, regs::INTERRUPT_LINE, irq);
        debug!(bdf = %record.bdf, pin, pirq, irq, "routed INTx line");
    }
}
