//! Configuration-space access seam and register-layout constants.
//!
//! Hardware access is abstracted behind [`ConfigAccess`] so the allocator can
//! run against real config ports, an ECAM window, or a test double. The only
//! required primitives are aligned dword reads and writes; narrower accesses
//! are provided as read-modify-write helpers on top.

use crate::PciBdf;

/// Standard configuration-space register offsets (type 0 and type 1 headers).
pub mod regs {
    pub const VENDOR_ID: u8 = 0x00;
    pub const DEVICE_ID: u8 = 0x02;
    pub const COMMAND: u8 = 0x04;
    pub const CLASS_DEVICE: u8 = 0x0A;
    pub const HEADER_TYPE: u8 = 0x0E;
    pub const BAR0: u8 = 0x10;
    pub const PRIMARY_BUS: u8 = 0x18;
    pub const SECONDARY_BUS: u8 = 0x19;
    pub const SUBORDINATE_BUS: u8 = 0x1A;
    pub const IO_BASE: u8 = 0x1C;
    pub const IO_LIMIT: u8 = 0x1D;
    pub const MEMORY_BASE: u8 = 0x20;
    pub const MEMORY_LIMIT: u8 = 0x22;
    pub const PREF_MEMORY_BASE: u8 = 0x24;
    pub const PREF_MEMORY_LIMIT: u8 = 0x26;
    pub const PREF_BASE_UPPER32: u8 = 0x28;
    pub const PREF_LIMIT_UPPER32: u8 = 0x2C;
    pub const IO_BASE_UPPER16: u8 = 0x30;
    pub const IO_LIMIT_UPPER16: u8 = 0x32;
    pub const EXPANSION_ROM: u8 = 0x30;
    pub const INTERRUPT_LINE: u8 = 0x3C;
    pub const INTERRUPT_PIN: u8 = 0x3D;

    pub const COMMAND_IO: u16 = 0x0001;
    pub const COMMAND_MEMORY: u16 = 0x0002;
}

/// Decoded header-type field (offset 0x0E, low 7 bits).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HeaderKind {
    Normal,
    PciBridge,
    CardBus,
}

impl HeaderKind {
    /// Bit 7 of the raw header-type byte on function 0 marks the device as
    /// multi-function.
    pub const MULTI_FUNCTION: u8 = 0x80;

    pub const fn from_config_u8(raw: u8) -> Option<Self> {
        match raw & 0x7F {
            0x00 => Some(Self::Normal),
            0x01 => Some(Self::PciBridge),
            0x02 => Some(Self::CardBus),
            _ => None,
        }
    }
}

/// Synchronous PCI configuration-space access.
///
/// The address/data protocol behind this trait (config mechanism #1, ECAM,
/// or a test double) is the caller's concern; the allocator only issues
/// aligned dword transactions and never interleaves them with anything else.
pub trait ConfigAccess {
    /// Reads the dword-aligned register containing `offset`.
    fn read_config_dword(&mut self, bdf: PciBdf, offset: u8) -> u32;

    /// Writes the dword-aligned register containing `offset`.
    fn write_config_dword(&mut self, bdf: PciBdf, offset: u8, value: u32);

    fn read_config_word(&mut self, bdf: PciBdf, offset: u8) -> u16 {
        let dword = self.read_config_dword(bdf, offset & !0x3);
        (dword >> (8 * u32::from(offset & 0x2))) as u16
    }

    fn write_config_word(&mut self, bdf: PciBdf, offset: u8, value: u16) {
        let aligned = offset & !0x3;
        let shift = 8 * u32::from(offset & 0x2);
        let old = self.read_config_dword(bdf, aligned);
        let merged = (old & !(0xFFFF << shift)) | (u32::from(value) << shift);
        self.write_config_dword(bdf, aligned, merged);
    }

    fn read_config_byte(&mut self, bdf: PciBdf, offset: u8) -> u8 {
        let dword = self.read_config_dword(bdf, offset & !0x3);
        (dword >> (8 * u32::from(offset & 0x3))) as u8
    }

    fn write_config_byte(&mut self, bdf: PciBdf, offset: u8, value: u8) {
        let aligned = offset & !0x3;
        let shift = 8 * u32::from(offset & 0x3);
        let old = self.read_config_dword(bdf, aligned);
        let merged = (old & !(0xFF << shift)) | (u32::from(value) << shift);
        self.write_config_dword(bdf, aligned, merged);
    }

    /// Clears `off` bits and sets `on` bits in a 16-bit register.
    fn mask_config_word(&mut self, bdf: PciBdf, offset: u8, off: u16, on: u16) {
        let old = self.read_config_word(bdf, offset);
        self.write_config_word(bdf, offset, (old & !off) | on);
    }
}

impl<T: ConfigAccess + ?Sized> ConfigAccess for &mut T {
    fn read_config_dword(&mut self, bdf: PciBdf, offset: u8) -> u32 {
        (**self).read_config_dword(bdf, offset)
    }

    fn write_config_dword(&mut self, bdf: PciBdf, offset: u8, value: u32) {
        (**self).write_config_dword(bdf, offset, value);
    }
}
