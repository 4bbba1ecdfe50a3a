#![forbid(unsafe_code)]

//! Boot-time PCI bus enumeration and resource assignment.
//!
//! Given configuration-space access to a static bus topology, this crate
//! numbers every bridge, sizes every base address register, and carves the
//! caller-supplied physical range into non-overlapping, naturally aligned
//! windows for each device and each bridge. The layout runs in two passes:
//! a bottom-up pass folds per-device demand into per-bus ledgers (bucketed
//! by power-of-two size class), then a top-down pass hands out concrete
//! addresses, largest buckets first, so alignment falls out of the walk
//! order with no padding arithmetic.
//!
//! Nothing is written to BARs, bridge windows, or command registers until
//! planning has fully succeeded; an infeasible layout leaves the hardware
//! untouched.
//!
//! The crate is single-threaded and holds no global state: every pass
//! threads its context (bus-number counter, ledger arena) explicitly.

pub mod assign;
pub mod classify;
pub mod commit;
pub mod config;
pub mod device;
pub mod discover;
pub mod irq;
pub mod ledger;
pub mod plan;
pub mod quirks;
pub mod setup;
pub mod topology;

pub use assign::{BarAssignment, BridgeWindows, LayoutPlan, WindowRange};
pub use classify::{class_to_size, classify, round_up_pow2, size_to_class, RegionType};
pub use config::{ConfigAccess, HeaderKind};
pub use device::{BarSlot, BridgeBuses, DeviceRecord};
pub use ledger::{BusLedger, LedgerArena};
pub use plan::{PhysRange, RootWindows};
pub use quirks::{Quirk, QuirkAction, QuirkMatch};
pub use setup::{apply_layout, pci_setup, plan_layout, SetupConfig};

use core::fmt;
use thiserror::Error;

/// PCI bus/device/function identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PciBdf(u16);

impl PciBdf {
    /// Creates a new BDF.
    ///
    /// # Panics
    ///
    /// Panics if `device >= 32` or `function >= 8`.
    pub fn new(bus: u8, device: u8, function: u8) -> Self {
        assert!(device < 32, "PCI device number out of range: {device}");
        assert!(function < 8, "PCI function number out of range: {function}");
        Self(((bus as u16) << 8) | ((device as u16) << 3) | (function as u16))
    }

    pub const fn bus(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn device(self) -> u8 {
        ((self.0 >> 3) & 0x1F) as u8
    }

    pub const fn function(self) -> u8 {
        (self.0 & 0x07) as u8
    }

    /// Packs this BDF into a compact `u16` key using the standard PCI
    /// config-address bit layout (bus in bits 8..=15, device in 3..=7,
    /// function in 0..=2).
    pub const fn pack_u16(self) -> u16 {
        self.0
    }

    /// Unpacks a `u16` produced by [`PciBdf::pack_u16`].
    pub const fn unpack_u16(v: u16) -> Self {
        Self(v)
    }
}

impl From<PciBdf> for u16 {
    fn from(value: PciBdf) -> Self {
        value.pack_u16()
    }
}

impl From<u16> for PciBdf {
    fn from(value: u16) -> Self {
        Self::unpack_u16(value)
    }
}

impl fmt::Display for PciBdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}.{}",
            self.bus(),
            self.device(),
            self.function()
        )
    }
}

/// Fatal conditions for a boot-time PCI layout pass.
///
/// There is no retry policy: the pass either succeeds once or the platform
/// boots without PCI resources assigned. All variants are detected before
/// any address reaches a hardware register.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum PciInitError {
    /// The bridge topology needs more than 256 bus numbers.
    #[error("bus topology exceeds 256 addressable bus numbers")]
    TopologyOverflow,

    /// Aggregate demand does not fit the named address window (the supplied
    /// physical range, or the fixed I/O port window).
    #[error("PCI resource demand does not fit {start:#010x}..{end:#010x}")]
    RootWindowInfeasible { start: u32, end: u32 },

    /// The transient per-bus ledger arena could not be reserved. The
    /// firmware may continue booting with firmware-preassigned addresses.
    #[error("per-bus ledger arena could not be allocated")]
    ArenaExhausted,

    /// A 64-bit BAR reported a nonzero upper size mask. This design assumes
    /// the whole topology fits in 32-bit space and refuses to truncate.
    #[error("unsupported resource: {bdf} BAR {slot} reports a 64-bit size mask")]
    UnsupportedResource { bdf: PciBdf, slot: usize },
}
