//! Device discovery: walking every bus/device/function combination and
//! recording what answers.

use tracing::debug;

use crate::config::{regs, ConfigAccess, HeaderKind};
use crate::device::{BridgeBuses, DeviceRecord};
use crate::PciBdf;

const ABSENT: u16 = 0xFFFF;

/// Enumerates every present function on one bus.
///
/// Functions 1..=7 of a device are probed only when function 0 advertises the
/// multi-function bit. Reserved header types are skipped.
pub fn discover_bus(access: &mut impl ConfigAccess, bus: u8) -> Vec<DeviceRecord> {
    let mut records = Vec::new();

    for device in 0..32 {
        let bdf0 = PciBdf::new(bus, device, 0);
        if access.read_config_word(bdf0, regs::VENDOR_ID) == ABSENT {
            continue;
        }
        let multi =
            access.read_config_byte(bdf0, regs::HEADER_TYPE) & HeaderKind::MULTI_FUNCTION != 0;
        let function_count = if multi { 8 } else { 1 };

        for function in 0..function_count {
            let bdf = PciBdf::new(bus, device, function);
            let vendor_id = access.read_config_word(bdf, regs::VENDOR_ID);
            if vendor_id == ABSENT {
                continue;
            }
            let raw_header = access.read_config_byte(bdf, regs::HEADER_TYPE);
            let Some(header) = HeaderKind::from_config_u8(raw_header) else {
                debug!(%bdf, raw_header, "skipping function with reserved header type");
                continue;
            };
            let device_id = access.read_config_word(bdf, regs::DEVICE_ID);
            let class_code = access.read_config_word(bdf, regs::CLASS_DEVICE);
            debug!(%bdf, vendor_id, device_id, class_code, "found PCI function");
            records.push(DeviceRecord::new(bdf, vendor_id, device_id, class_code, header));
        }
    }

    records
}

/// Flat, ordered enumeration of buses `0..=last_bus`.
///
/// Must run after bus numbering: bridge records are filled with the
/// secondary/subordinate values read back from their registers.
pub fn discover_all(access: &mut impl ConfigAccess, last_bus: u8) -> Vec<DeviceRecord> {
    let mut records = Vec::new();

    for bus in 0..=last_bus {
        for mut record in discover_bus(access, bus) {
            if record.is_bridge() {
                record.bridge_buses = Some(BridgeBuses {
                    secondary: access.read_config_byte(record.bdf, regs::SECONDARY_BUS),
                    subordinate: access.read_config_byte(record.bdf, regs::SUBORDINATE_BUS),
                });
            }
            records.push(record);
        }
    }

    records
}
