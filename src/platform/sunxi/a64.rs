// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Allwinner A64.

use crate::{
    logger::{self, LockedWriter},
    mmio::DeviceMmio,
    ns16550::Ns16550,
    platform::Platform,
};

const CPUCFG_BASE: usize = 0x0170_0000;
const UART0_BASE: usize = 0x01c2_8000;

// SAFETY: UART0 is identity mapped device memory, and only accessed through this console.
static CONSOLE: LockedWriter<Ns16550<DeviceMmio>> =
    LockedWriter::new(Ns16550::new(unsafe { DeviceMmio::new() }, UART0_BASE));

/// The Allwinner A64, with a single cluster of four Cortex-A53 cores.
pub struct SunxiA64;

impl Platform for SunxiA64 {
    const CORE_COUNT: usize = 4;

    const DRAM_BASE: u64 = 0x4000_0000;

    const SRAM_A2_BASE: usize = 0x0004_0000;
    const SRAM_A2_SIZE: usize = 0x0001_4000;

    const MSGBOX_BASE: usize = 0x01c1_7000;
    const R_CPUCFG_BASE: usize = 0x01f0_1c00;
    const GICD_BASE: usize = 0x01c8_1000;
    const GICC_BASE: usize = 0x01c8_2000;

    fn rvbar_lo(core: usize) -> usize {
        CPUCFG_BASE + 0xa0 + core * 8
    }

    fn rvbar_hi(core: usize) -> usize {
        CPUCFG_BASE + 0xa4 + core * 8
    }

    fn init_logger() {
        // The UART has already been set up by the previous boot stage, so a failure here only
        // means that a logger was already installed.
        let _ = logger::init(&CONSOLE);
    }
}
