//! Per-function device records produced by discovery and mutated in place by
//! the sizing and assignment passes.

use crate::classify::{classify, RegionType};
use crate::config::HeaderKind;
use crate::PciBdf;

/// Number of base-address-register slots in a type 0 header.
pub const BAR_SLOTS: usize = 6;

/// Pseudo-slot index for the expansion ROM register.
pub const ROM_SLOT: usize = 6;

/// BAR slots plus the expansion ROM slot.
pub const NUM_SLOTS: usize = 7;

/// Config-space offset of a resource slot.
pub const fn slot_offset(slot: usize) -> u8 {
    if slot == ROM_SLOT {
        0x30
    } else {
        0x10 + 4 * slot as u8
    }
}

/// One sized resource slot.
///
/// `raw` keeps the value read from hardware before sizing, type and prefetch
/// bits still embedded, so the region can be re-derived at any point. A zero
/// `size` means the slot is unimplemented.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct BarSlot {
    pub raw: u32,
    pub size: u32,
    /// The slot holds the low half of a 64-bit BAR and also owns the
    /// following slot.
    pub is_64bit: bool,
    /// Concrete address, filled by the assigner.
    pub addr: Option<u32>,
}

impl BarSlot {
    pub fn is_sized(&self) -> bool {
        self.size != 0
    }

    pub fn region(&self, slot: usize) -> RegionType {
        if slot == ROM_SLOT {
            // The expansion ROM decodes as ordinary (non-prefetchable) memory.
            RegionType::Memory
        } else {
            classify(self.raw)
        }
    }
}

/// Secondary/subordinate bus numbers of a bridge, as programmed by the
/// topology pass.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BridgeBuses {
    pub secondary: u8,
    pub subordinate: u8,
}

/// One discovered PCI function.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub bdf: PciBdf,
    pub vendor_id: u16,
    pub device_id: u16,
    /// Class/subclass word (offset 0x0A), e.g. `0x0101` for IDE.
    pub class_code: u16,
    pub header: HeaderKind,
    /// `Some` only for PCI-to-PCI bridges, filled after bus numbering.
    pub bridge_buses: Option<BridgeBuses>,
    pub slots: [BarSlot; NUM_SLOTS],
}

impl DeviceRecord {
    pub fn new(
        bdf: PciBdf,
        vendor_id: u16,
        device_id: u16,
        class_code: u16,
        header: HeaderKind,
    ) -> Self {
        Self {
            bdf,
            vendor_id,
            device_id,
            class_code,
            header,
            bridge_buses: None,
            slots: [BarSlot::default(); NUM_SLOTS],
        }
    }

    pub fn is_bridge(&self) -> bool {
        self.header == HeaderKind::PciBridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_offsets_follow_the_type0_header_layout() {
        assert_eq!(slot_offset(0), 0x10);
        assert_eq!(slot_offset(5), 0x24);
        assert_eq!(slot_offset(ROM_SLOT), 0x30);
    }

    #[test]
    fn rom_slot_is_ordinary_memory_regardless_of_raw_bits() {
        let slot = BarSlot {
            raw: 0xFFFF_F801,
            size: 0x1_0000,
            ..Default::default()
        };
        assert_eq!(slot.region(ROM_SLOT), RegionType::Memory);
        assert_eq!(slot.region(0), RegionType::Io);
    }
}
