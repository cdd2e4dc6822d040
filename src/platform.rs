// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SoC descriptions.

macro_rules! select_platform {
    (platform = $condition:literal, $mod:ident::$sub:ident::$plat_impl:ident) => {
        #[cfg(platform = $condition)]
        pub use $mod::$sub::$plat_impl as PlatformImpl;
    };
}

pub mod sunxi;

select_platform!(platform = "sun50i_a64", sunxi::a64::SunxiA64);
select_platform!(platform = "sun50i_h6", sunxi::h6::SunxiH6);

use crate::aarch64::{dsb_sy, wfi};
use arm_sysregs::MpidrEl1;

/// Offset of the SCP firmware's reset vector page from the start of SRAM A2.
const SCP_PROBE_OFFSET: usize = 0x100;
/// Size of the SCPI shared memory at the end of SRAM A2.
const SCP_SHARED_MEM_SIZE: usize = 0x200;

/// The hooks implemented by all platforms.
pub trait Platform {
    /// The number of CPU cores.
    const CORE_COUNT: usize;

    /// Start of DRAM, the lowest acceptable non-secure entry point.
    const DRAM_BASE: u64;

    /// Start of SRAM A2, which holds the SCP firmware and the SCPI shared memory.
    const SRAM_A2_BASE: usize;
    /// Size of SRAM A2.
    const SRAM_A2_SIZE: usize;

    /// Base address of the message box.
    const MSGBOX_BASE: usize;
    /// Base address of the CPU configuration block in the always-on power domain.
    const R_CPUCFG_BASE: usize;
    /// Base address of the GIC distributor.
    const GICD_BASE: usize;
    /// Base address of the GIC CPU interface.
    const GICC_BASE: usize;

    /// The SCPI shared memory, at the end of SRAM A2.
    const SCP_SHARED_MEM_BASE: usize =
        Self::SRAM_A2_BASE + Self::SRAM_A2_SIZE - SCP_SHARED_MEM_SIZE;

    /// A word of the SCP firmware which is non-zero if the firmware has been loaded.
    ///
    /// The SCP's exception vectors start 16 KiB before SRAM A2 in its address space, and SRAM A2
    /// is where its reset vector points.
    const SCP_PROBE_ADDRESS: usize = Self::SRAM_A2_BASE - 0x4000 + SCP_PROBE_OFFSET;

    /// Returns the address of the register holding the low half of the reset vector of `core`.
    fn rvbar_lo(core: usize) -> usize;

    /// Returns the address of the register holding the high half of the reset vector of `core`.
    fn rvbar_hi(core: usize) -> usize;

    /// Initialises the logger. Any logs sent before this is called will be ignored.
    fn init_logger();

    /// Returns whether the given MPIDR is valid for this platform.
    ///
    /// All sunxi SoCs supported so far have a single cluster.
    fn mpidr_is_valid(mpidr: MpidrEl1) -> bool {
        mpidr.aff3() == 0
            && mpidr.aff2() == 0
            && mpidr.aff1() == 0
            && usize::from(mpidr.aff0()) < Self::CORE_COUNT
    }

    /// Returns the linear index of the core with the given valid MPIDR.
    fn core_position(mpidr: MpidrEl1) -> usize {
        usize::from(mpidr.aff0())
    }

    /// Waits for the power controller to turn off or reset the calling CPU.
    fn power_down_wfi() -> ! {
        dsb_sy();
        loop {
            wfi();
        }
    }
}
