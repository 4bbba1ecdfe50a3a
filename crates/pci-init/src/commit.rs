//! Hardware write-back: replays a finished [`LayoutPlan`] into config space.
//!
//! This is the only place the allocator writes addresses to registers, and
//! it runs only after planning has fully succeeded.

use tracing::{debug, info};

use crate::assign::{BarAssignment, BridgeWindows, LayoutPlan};
use crate::classify::RegionType;
use crate::config::{regs, ConfigAccess};
use crate::device::{slot_offset, ROM_SLOT};

/// Programs every BAR, expansion ROM, and bridge window in the plan, then
/// enables the matching command-register decode bits.
pub fn commit(access: &mut impl ConfigAccess, plan: &LayoutPlan) {
    for bar in &plan.bars {
        commit_bar(access, bar);
    }
    for windows in &plan.windows {
        commit_bridge(access, windows);
    }
    info!(
        bars = plan.bars.len(),
        bridges = plan.windows.len(),
        "committed PCI layout"
    );
}

fn commit_bar(access: &mut impl ConfigAccess, bar: &BarAssignment) {
    let offset = slot_offset(bar.slot);
    access.write_config_dword(bar.bdf, offset, bar.address);
    if bar.is_64bit {
        // Everything fits 32-bit space; the upper half is forced to zero.
        access.write_config_dword(bar.bdf, offset + 4, 0);
    }
    debug!(
        bdf = %bar.bdf,
        slot = bar.slot,
        address = format_args!("{:#010x}", bar.address),
        "programmed BAR"
    );

    // The ROM enable bit stays clear; callers flip it when shadowing.
    let enable = if bar.slot != ROM_SLOT && bar.region == RegionType::Io {
        regs::COMMAND_IO
    } else {
        regs::COMMAND_MEMORY
    };
    access.mask_config_word(bar.bdf, regs::COMMAND, 0, enable);
}

fn commit_bridge(access: &mut impl ConfigAccess, windows: &BridgeWindows) {
    let bdf = windows.bdf;

    let io = windows.io;
    access.write_config_byte(bdf, regs::IO_BASE, ((io.base >> 8) & 0xF0) as u8);
    access.write_config_byte(
        bdf,
        regs::IO_LIMIT,
        (((io.end_exclusive() - 1) >> 8) & 0xF0) as u8,
    );
    access.write_config_word(bdf, regs::IO_BASE_UPPER16, (io.base >> 16) as u16);
    access.write_config_word(
        bdf,
        regs::IO_LIMIT_UPPER16,
        ((io.end_exclusive() - 1) >> 16) as u16,
    );

    let mem = windows.memory;
    access.write_config_word(bdf, regs::MEMORY_BASE, ((mem.base >> 16) & 0xFFF0) as u16);
    access.write_config_word(
        bdf,
        regs::MEMORY_LIMIT,
        (((mem.end_exclusive() - 1) >> 16) & 0xFFF0) as u16,
    );

    let pref = windows.prefetchable;
    access.write_config_word(
        bdf,
        regs::PREF_MEMORY_BASE,
        ((pref.base >> 16) & 0xFFF0) as u16,
    );
    access.write_config_word(
        bdf,
        regs::PREF_MEMORY_LIMIT,
        (((pref.end_exclusive() - 1) >> 16) & 0xFFF0) as u16,
    );
    // 64-bit upper halves are architecturally present but unused here.
    access.write_config_dword(bdf, regs::PREF_BASE_UPPER32, 0);
    access.write_config_dword(bdf, regs::PREF_LIMIT_UPPER32, 0);

    access.mask_config_word(
        bdf,
        regs::COMMAND,
        0,
        regs::COMMAND_IO | regs::COMMAND_MEMORY,
    );
    debug!(
        %bdf,
        io_base = format_args!("{:#06x}", io.base),
        mem_base = format_args!("{:#010x}", mem.base),
        pref_base = format_args!("{:#010x}", pref.base),
        "programmed bridge windows"
    );
}
