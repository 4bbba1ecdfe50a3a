#![forbid(unsafe_code)]

//! Shared physical address / topology constants for the x86 PC platform.
//!
//! This crate exists so the PCI bring-up code (`pci-init`) and the platform
//! wiring around it agree on addresses that must match exactly at runtime.

/// Base port of the I/O window handed out to PCI I/O BARs.
///
/// This follows the legacy PC convention: everything below `0xC000` is left
/// to motherboard and ISA-compatible fixed-function devices.
pub const PCI_IO_BASE: u32 = 0xC000;

/// End of the PCI I/O BAR window (exclusive). x86 port space is 16 bits.
pub const PCI_IO_END_EXCLUSIVE: u32 = 0x1_0000;

/// Default base physical address of the 32-bit MMIO window reserved for PCI
/// BAR allocation.
///
/// Kept high in the 32-bit space, away from RAM in typical setups.
pub const PCI_MMIO_BASE: u32 = 0xE000_0000;

/// Default end of the PCI MMIO BAR window (exclusive).
///
/// This is kept right below the IOAPIC/LAPIC MMIO block (`0xFEC0_0000`) so
/// the PCI window never overlaps fixed chipset MMIO ranges.
pub const PCI_MMIO_END_EXCLUSIVE: u32 = 0xFEC0_0000;

/// Minimum I/O window a PCI-to-PCI bridge may decode.
///
/// Bridge I/O base/limit registers carry 4KiB granularity, so any smaller
/// aggregate child demand still reserves this much on the parent bus.
pub const PCI_BRIDGE_IO_MIN: u32 = 1 << 12;

/// Minimum memory (and prefetchable memory) window a PCI-to-PCI bridge may
/// decode. Bridge memory base/limit registers carry 1MiB granularity.
pub const PCI_BRIDGE_MEM_MIN: u32 = 1 << 20;

/// Base port of the PIIX4 power-management I/O block (for ACPI).
pub const PM_IO_BASE: u32 = 0xB000;

/// Base port of the PIIX4 SMBus host controller I/O block.
pub const SMB_IO_BASE: u32 = 0xB100;

/// Legacy IDE compatibility decode ranges: (command block, control block) per
/// channel, as programmed when an IDE controller runs in ISA-compatible mode.
pub const IDE_LEGACY_PORTS: [(u32, u32); 2] = [(0x1F0, 0x3F4), (0x170, 0x374)];
