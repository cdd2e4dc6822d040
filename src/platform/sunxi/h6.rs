// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Allwinner H6.

use crate::{
    logger::{self, LockedWriter},
    mmio::DeviceMmio,
    ns16550::Ns16550,
    platform::Platform,
};

const R_CPUCFG_BASE: usize = 0x0700_0400;
const UART0_BASE: usize = 0x0500_0000;

// SAFETY: UART0 is identity mapped device memory, and only accessed through this console.
static CONSOLE: LockedWriter<Ns16550<DeviceMmio>> =
    LockedWriter::new(Ns16550::new(unsafe { DeviceMmio::new() }, UART0_BASE));

/// The Allwinner H6, with a single cluster of four Cortex-A53 cores.
pub struct SunxiH6;

impl Platform for SunxiH6 {
    const CORE_COUNT: usize = 4;

    const DRAM_BASE: u64 = 0x4000_0000;

    const SRAM_A2_BASE: usize = 0x0010_4000;
    const SRAM_A2_SIZE: usize = 0x0001_4000;

    const MSGBOX_BASE: usize = 0x0300_3000;
    const R_CPUCFG_BASE: usize = R_CPUCFG_BASE;
    const GICD_BASE: usize = 0x0302_1000;
    const GICC_BASE: usize = 0x0302_2000;

    // The reset vectors live in the always-on R_CPUCFG block on the H6.
    fn rvbar_lo(core: usize) -> usize {
        R_CPUCFG_BASE + 0x40 + core * 8
    }

    fn rvbar_hi(core: usize) -> usize {
        R_CPUCFG_BASE + 0x44 + core * 8
    }

    fn init_logger() {
        let _ = logger::init(&CONSOLE);
    }
}
