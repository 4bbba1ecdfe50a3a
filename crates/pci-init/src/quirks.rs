//! Device-specific fixups applied after addresses are committed.
//!
//! The quirk table is a fixed, ordered list of match rules; the first rule
//! matching a device decides its fixup. Actions are a closed set of tagged
//! variants dispatched through one match, not function pointers.

use tracing::debug;

use crate::config::{regs, ConfigAccess};
use crate::device::{slot_offset, DeviceRecord};

const PCI_VENDOR_INTEL: u16 = 0x8086;
const PCI_DEVICE_PIIX3_ISA: u16 = 0x7000;
const PCI_DEVICE_PIIX3_IDE: u16 = 0x7010;
const PCI_DEVICE_PIIX4_PM: u16 = 0x7113;
const PCI_CLASS_IDE: u16 = 0x0101;

/// Which devices a quirk applies to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum QuirkMatch {
    VendorDevice { vendor: u16, device: u16 },
    VendorDeviceClass { vendor: u16, device: u16, class: u16 },
    Class { class: u16 },
}

impl QuirkMatch {
    pub fn matches(&self, record: &DeviceRecord) -> bool {
        match *self {
            Self::VendorDevice { vendor, device } => {
                record.vendor_id == vendor && record.device_id == device
            }
            Self::VendorDeviceClass { vendor, device, class } => {
                record.vendor_id == vendor
                    && record.device_id == device
                    && record.class_code == class
            }
            Self::Class { class } => record.class_code == class,
        }
    }
}

/// What to do with a matched device.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum QuirkAction {
    /// PIIX3/PIIX4 IDE: flip the per-channel enable bits so both channels
    /// decode their (already assigned) ports.
    EnableIdeChannels,
    /// Non-PIIX IDE controllers run in ISA compatibility mode: overwrite the
    /// four decode BARs with the fixed legacy port blocks.
    LegacyIdePorts,
    /// PIIX4 power-management function: program and enable the ACPI PM and
    /// SMBus I/O blocks at their platform-fixed bases.
    EnablePiix4Pm,
    /// PIIX3 ISA bridge: activate IRQ remapping by programming the four PIRQ
    /// link routing registers with the platform's IRQ choices. The matching
    /// ELCR level-trigger latches live at I/O ports 0x4D0/0x4D1, outside
    /// config space; callers set those up.
    ProgramPirqRouter,
}

/// One ordered quirk-table entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Quirk {
    pub rule: QuirkMatch,
    pub action: QuirkAction,
}

/// The stock quirk table. Order matters: PIIX IDE must match before the
/// generic IDE class rule.
pub fn default_quirks() -> &'static [Quirk] {
    &[
        Quirk {
            rule: QuirkMatch::VendorDeviceClass {
                vendor: PCI_VENDOR_INTEL,
                device: PCI_DEVICE_PIIX3_IDE,
                class: PCI_CLASS_IDE,
            },
            action: QuirkAction::EnableIdeChannels,
        },
        Quirk {
            rule: QuirkMatch::Class { class: PCI_CLASS_IDE },
            action: QuirkAction::LegacyIdePorts,
        },
        Quirk {
            rule: QuirkMatch::VendorDevice {
                vendor: PCI_VENDOR_INTEL,
                device: PCI_DEVICE_PIIX4_PM,
            },
            action: QuirkAction::EnablePiix4Pm,
        },
        Quirk {
            rule: QuirkMatch::VendorDevice {
                vendor: PCI_VENDOR_INTEL,
                device: PCI_DEVICE_PIIX3_ISA,
            },
            action: QuirkAction::ProgramPirqRouter,
        },
    ]
}

/// Applies the first matching quirk, if any, to every device.
pub fn apply_quirks(
    access: &mut impl ConfigAccess,
    records: &[DeviceRecord],
    quirks: &[Quirk],
    pirq_to_irq: [u8; 4],
) {
    for record in records {
        let Some(quirk) = quirks.iter().find(|quirk| quirk.rule.matches(record)) else {
            continue;
        };
        debug!(bdf = %record.bdf, action = ?quirk.action, "applying quirk");
        run_action(access, record, quirk.action, pirq_to_irq);
    }
}

fn run_action(
    access: &mut impl ConfigAccess,
    record: &DeviceRecord,
    action: QuirkAction,
    pirq_to_irq: [u8; 4],
) {
    let bdf = record.bdf;
    match action {
        QuirkAction::EnableIdeChannels => {
            access.write_config_word(bdf, 0x40, 0x8000);
            access.write_config_word(bdf, 0x42, 0x8000);
        }
        QuirkAction::LegacyIdePorts => {
            for (channel, (cmd_block, ctl_block)) in
                pc_constants::IDE_LEGACY_PORTS.iter().copied().enumerate()
            {
                let slot = channel * 2;
                access.write_config_dword(bdf, slot_offset(slot), cmd_block | 0x1);
                access.write_config_dword(bdf, slot_offset(slot + 1), ctl_block | 0x1);
            }
            access.mask_config_word(bdf, regs::COMMAND, 0, regs::COMMAND_IO);
        }
        QuirkAction::ProgramPirqRouter => {
            for (link, irq) in pirq_to_irq.into_iter().enumerate() {
                access.write_config_byte(bdf, 0x60 + link as u8, irq);
            }
        }
        QuirkAction::EnablePiix4Pm => {
            access.write_config_dword(bdf, 0x40, pc_constants::PM_IO_BASE | 0x1);
            access.write_config_byte(bdf, 0x80, 0x01);
            access.write_config_dword(bdf, 0x90, pc_constants::SMB_IO_BASE | 0x1);
            access.write_config_byte(bdf, 0xD2, 0x09);
        }
    }
}
