//! A small config-space machine for exercising the allocator end to end:
//! nested buses routed through live bridge registers, BARs that answer the
//! all-ones sizing probe, and scratch registers for quirk writes.
#![allow(dead_code)]

use std::collections::BTreeMap;

use pci_init::{ConfigAccess, PciBdf};

/// BAR behavior of a fake function.
#[derive(Debug, Clone, Copy)]
pub enum FakeBar {
    Io { size: u32 },
    Mem32 { size: u32, prefetchable: bool },
    /// 64-bit BAR occupying this slot and the next. `upper_size_mask` is
    /// what the upper half reads back after an all-ones probe; real devices
    /// in this design report zero.
    Mem64 { size: u32, prefetchable: bool, upper_size_mask: u32 },
}

#[derive(Debug, Default)]
pub struct FakeBus {
    functions: BTreeMap<(u8, u8), FakeFunction>,
}

impl FakeBus {
    fn add(&mut self, device: u8, function: u8, fake: FakeFunction) {
        if function != 0 {
            if let Some(fn0) = self.functions.get_mut(&(device, 0)) {
                fn0.multi_function = true;
            }
        }
        let prev = self.functions.insert((device, function), fake);
        assert!(prev.is_none(), "duplicate fake function {device}.{function}");
    }
}

#[derive(Debug)]
pub struct FakeFunction {
    vendor_id: u16,
    device_id: u16,
    class_code: u16,
    header: u8,
    multi_function: bool,
    command: u16,
    interrupt_pin: u8,
    interrupt_line: u8,
    bars: [Option<FakeBar>; 6],
    bar_values: [u32; 6],
    rom_size: u32,
    rom_value: u32,
    // Type 1 header registers.
    primary: u8,
    secondary: u8,
    subordinate: u8,
    io_base: u8,
    io_limit: u8,
    io_base_upper: u16,
    io_limit_upper: u16,
    mem_base: u16,
    mem_limit: u16,
    pref_base: u16,
    pref_limit: u16,
    pref_base_upper: u32,
    pref_limit_upper: u32,
    /// Device-specific registers touched by quirks, dword-indexed.
    extra: BTreeMap<u8, u32>,
    child: Option<FakeBus>,
}

impl FakeFunction {
    pub fn endpoint(vendor_id: u16, device_id: u16, class_code: u16) -> Self {
        Self {
            vendor_id,
            device_id,
            class_code,
            header: 0x00,
            multi_function: false,
            command: 0,
            interrupt_pin: 0,
            interrupt_line: 0,
            bars: [None; 6],
            bar_values: [0; 6],
            rom_size: 0,
            rom_value: 0,
            primary: 0,
            secondary: 0,
            subordinate: 0,
            io_base: 0,
            io_limit: 0,
            io_base_upper: 0,
            io_limit_upper: 0,
            mem_base: 0,
            mem_limit: 0,
            pref_base: 0,
            pref_limit: 0,
            pref_base_upper: 0,
            pref_limit_upper: 0,
            extra: BTreeMap::new(),
            child: None,
        }
    }

    pub fn bridge(vendor_id: u16, device_id: u16) -> Self {
        let mut fake = Self::endpoint(vendor_id, device_id, 0x0604);
        fake.header = 0x01;
        fake.child = Some(FakeBus::default());
        fake
    }

    pub fn with_bar(mut self, slot: usize, bar: FakeBar) -> Self {
        if let FakeBar::Mem64 { .. } = bar {
            assert!(slot + 1 < 6, "64-bit BAR needs a following slot");
            assert!(self.bars[slot + 1].is_none(), "64-bit upper slot occupied");
        }
        self.bars[slot] = Some(bar);
        self
    }

    pub fn with_rom(mut self, size: u32) -> Self {
        assert!(size.is_power_of_two() && size >= 0x800);
        self.rom_size = size;
        self
    }

    pub fn with_pin(mut self, pin: u8) -> Self {
        self.interrupt_pin = pin;
        self
    }

    pub fn add_child_device(&mut self, device: u8, function: u8, fake: FakeFunction) {
        self.child
            .as_mut()
            .expect("not a bridge")
            .add(device, function, fake);
    }

    fn bar_read(&self, index: usize) -> u32 {
        // Upper half of a 64-bit pair reports its probe mask.
        if index > 0 {
            if let Some(FakeBar::Mem64 { upper_size_mask, .. }) = self.bars[index - 1] {
                return self.bar_values[index] & upper_size_mask;
            }
        }
        match self.bars[index] {
            None => 0,
            Some(FakeBar::Io { size }) => (self.bar_values[index] & !(size - 1)) | 0x1,
            Some(FakeBar::Mem32 { size, prefetchable }) => {
                (self.bar_values[index] & !(size - 1)) | u32::from(prefetchable) << 3
            }
            Some(FakeBar::Mem64 { size, prefetchable, .. }) => {
                (self.bar_values[index] & !(size - 1)) | 0x4 | u32::from(prefetchable) << 3
            }
        }
    }

    fn read_dword(&self, offset: u8) -> u32 {
        match offset {
            0x00 => u32::from(self.device_id) << 16 | u32::from(self.vendor_id),
            0x04 => u32::from(self.command),
            0x08 => u32::from(self.class_code) << 16,
            0x0C => {
                let header = self.header | if self.multi_function { 0x80 } else { 0 };
                u32::from(header) << 16
            }
            0x3C => u32::from(self.interrupt_pin) << 8 | u32::from(self.interrupt_line),
            _ if self.header == 0x01 => match offset {
                0x10 | 0x14 => 0,
                0x18 => {
                    u32::from(self.subordinate) << 16
                        | u32::from(self.secondary) << 8
                        | u32::from(self.primary)
                }
                0x1C => u32::from(self.io_limit) << 8 | u32::from(self.io_base),
                0x20 => u32::from(self.mem_limit) << 16 | u32::from(self.mem_base),
                0x24 => u32::from(self.pref_limit) << 16 | u32::from(self.pref_base),
                0x28 => self.pref_base_upper,
                0x2C => self.pref_limit_upper,
                0x30 => u32::from(self.io_limit_upper) << 16 | u32::from(self.io_base_upper),
                _ => self.extra.get(&offset).copied().unwrap_or(0),
            },
            0x10..=0x24 => self.bar_read(usize::from((offset - 0x10) / 4)),
            0x30 => {
                if self.rom_size == 0 {
                    0
                } else {
                    (self.rom_value & !(self.rom_size - 1) & !0x7FF) | (self.rom_value & 0x1)
                }
            }
            _ => self.extra.get(&offset).copied().unwrap_or(0),
        }
    }

    fn write_dword(&mut self, offset: u8, value: u32) {
        match offset {
            0x04 => self.command = value as u16,
            0x00 | 0x08 | 0x0C => {}
            0x3C => self.interrupt_line = value as u8,
            _ if self.header == 0x01 => match offset {
                0x18 => {
                    self.primary = value as u8;
                    self.secondary = (value >> 8) as u8;
                    self.subordinate = (value >> 16) as u8;
                }
                0x1C => {
                    self.io_base = value as u8;
                    self.io_limit = (value >> 8) as u8;
                }
                0x20 => {
                    self.mem_base = value as u16;
                    self.mem_limit = (value >> 16) as u16;
                }
                0x24 => {
                    self.pref_base = value as u16;
                    self.pref_limit = (value >> 16) as u16;
                }
                0x28 => self.pref_base_upper = value,
                0x2C => self.pref_limit_upper = value,
                0x30 => {
                    self.io_base_upper = value as u16;
                    self.io_limit_upper = (value >> 16) as u16;
                }
                _ => {
                    self.extra.insert(offset, value);
                }
            },
            0x10..=0x24 => self.bar_values[usize::from((offset - 0x10) / 4)] = value,
            0x30 => self.rom_value = value,
            _ => {
                self.extra.insert(offset, value);
            }
        }
    }
}

/// The machine: a root bus with bridges routing config cycles to child
/// buses by their live secondary/subordinate registers, exactly like
/// hardware would.
#[derive(Debug, Default)]
pub struct FakeMachine {
    root: FakeBus,
}

impl FakeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&mut self, device: u8, function: u8, fake: FakeFunction) {
        self.root.add(device, function, fake);
    }

    fn route(segment: &mut FakeBus, bus: u8) -> Option<&mut FakeBus> {
        let key = segment.functions.iter().find_map(|(key, fake)| {
            (fake.child.is_some()
                && fake.secondary != 0
                && bus >= fake.secondary
                && bus <= fake.subordinate)
                .then_some(*key)
        })?;
        let fake = segment.functions.get_mut(&key).unwrap();
        if bus == fake.secondary {
            fake.child.as_mut()
        } else {
            Self::route(fake.child.as_mut().unwrap(), bus)
        }
    }

    fn function_mut(&mut self, bdf: PciBdf) -> Option<&mut FakeFunction> {
        let segment = if bdf.bus() == 0 {
            &mut self.root
        } else {
            Self::route(&mut self.root, bdf.bus())?
        };
        segment.functions.get_mut(&(bdf.device(), bdf.function()))
    }
}

impl ConfigAccess for FakeMachine {
    fn read_config_dword(&mut self, bdf: PciBdf, offset: u8) -> u32 {
        assert_eq!(offset & 0x3, 0, "unaligned config read");
        match self.function_mut(bdf) {
            Some(fake) => fake.read_dword(offset),
            None => 0xFFFF_FFFF,
        }
    }

    fn write_config_dword(&mut self, bdf: PciBdf, offset: u8, value: u32) {
        assert_eq!(offset & 0x3, 0, "unaligned config write");
        if let Some(fake) = self.function_mut(bdf) {
            fake.write_dword(offset, value);
        }
    }
}
