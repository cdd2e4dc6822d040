// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! GICv2 distributor and CPU interface setup for EL3.

use crate::mmio::Mmio;
use arm_gic::IntId;
use bitflags::bitflags;

const GICD_CTLR: usize = 0x000;
const GICD_TYPER: usize = 0x004;
const GICD_IGROUPR: usize = 0x080;
const GICD_ICENABLER: usize = 0x180;
const GICD_IPRIORITYR: usize = 0x400;
const GICD_ICFGR: usize = 0xc00;

const GICC_CTLR: usize = 0x000;
const GICC_PMR: usize = 0x004;

const GIC_HIGHEST_NS_PRIORITY: u8 = 0x80;
const GIC_PRI_MASK: u32 = 0xff;

const TYPER_IT_LINES_NUMBER_MASK: u32 = 0x1f;

bitflags! {
    /// GICD_CTLR bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GicdCtlr: u32 {
        /// Enables forwarding of group 0 interrupts.
        const ENABLE_GRP0 = 1 << 0;
        /// Enables forwarding of group 1 interrupts.
        const ENABLE_GRP1 = 1 << 1;
    }
}

bitflags! {
    /// GICC_CTLR bits as seen from the secure side.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GiccCtlr: u32 {
        /// Enables signalling of group 0 interrupts.
        const ENABLE_GRP0 = 1 << 0;
        /// Enables signalling of group 1 interrupts.
        const ENABLE_GRP1 = 1 << 1;
        /// Signals group 0 interrupts as FIQs.
        const FIQ_EN = 1 << 3;
        /// Disables the legacy FIQ bypass for group 0.
        const FIQ_BYP_DIS_GRP0 = 1 << 5;
        /// Disables the legacy IRQ bypass for group 0.
        const IRQ_BYP_DIS_GRP0 = 1 << 6;
        /// Disables the legacy FIQ bypass for group 1.
        const FIQ_BYP_DIS_GRP1 = 1 << 7;
        /// Disables the legacy IRQ bypass for group 1.
        const IRQ_BYP_DIS_GRP1 = 1 << 8;
    }
}

/// The interrupt controller operations needed around power state transitions.
pub trait InterruptController {
    /// Initialises the distributor, configuring all SPIs.
    fn distributor_init(&self);

    /// Initialises the banked distributor state of the calling CPU, i.e. its SGIs and PPIs.
    fn pcpu_distributor_init(&self);

    /// Enables the CPU interface of the calling CPU.
    fn cpu_interface_enable(&self);

    /// Disables the CPU interface of the calling CPU.
    fn cpu_interface_disable(&self);
}

impl<T: InterruptController + ?Sized> InterruptController for &T {
    fn distributor_init(&self) {
        (**self).distributor_init()
    }

    fn pcpu_distributor_init(&self) {
        (**self).pcpu_distributor_init()
    }

    fn cpu_interface_enable(&self) {
        (**self).cpu_interface_enable()
    }

    fn cpu_interface_disable(&self) {
        (**self).cpu_interface_disable()
    }
}

/// A GICv2 accessed through memory-mapped distributor and CPU interface registers.
#[derive(Debug)]
pub struct GicV2<M: Mmio> {
    mmio: M,
    gicd_base: usize,
    gicc_base: usize,
}

impl<M: Mmio> GicV2<M> {
    /// Creates a driver for the GIC with its distributor at `gicd_base` and CPU interface at
    /// `gicc_base`.
    pub const fn new(mmio: M, gicd_base: usize, gicc_base: usize) -> Self {
        Self {
            mmio,
            gicd_base,
            gicc_base,
        }
    }

    /// Returns the number of SPIs supported by the distributor.
    fn num_spis(&self) -> usize {
        let it_lines = self.mmio.read32(self.gicd_base + GICD_TYPER) & TYPER_IT_LINES_NUMBER_MASK;
        32 * it_lines as usize
    }

    fn set_group1(&self, int_id: IntId) {
        let index = u32::from(int_id) as usize;
        self.mmio
            .set_bits32(self.gicd_base + GICD_IGROUPR + index / 32 * 4, 1 << (index % 32));
    }

    fn set_priority(&self, int_id: IntId, priority: u8) {
        let index = u32::from(int_id) as usize;
        let address = self.gicd_base + GICD_IPRIORITYR + (index & !0x3);
        let shift = (index % 4) * 8;
        let value = self.mmio.read32(address) & !(0xff << shift);
        self.mmio
            .write32(address, value | u32::from(priority) << shift);
    }

    /// Makes the interrupt level-sensitive.
    fn set_level_triggered(&self, int_id: IntId) {
        let index = u32::from(int_id) as usize;
        self.mmio.clear_bits32(
            self.gicd_base + GICD_ICFGR + index / 16 * 4,
            0b10 << ((index % 16) * 2),
        );
    }

    fn disable_interrupt(&self, int_id: IntId) {
        let index = u32::from(int_id) as usize;
        self.mmio
            .write32(self.gicd_base + GICD_ICENABLER + index / 32 * 4, 1 << (index % 32));
    }

    fn gicd_ctlr(&self) -> GicdCtlr {
        GicdCtlr::from_bits_retain(self.mmio.read32(self.gicd_base + GICD_CTLR))
    }

    fn set_gicd_ctlr(&self, value: GicdCtlr) {
        self.mmio.write32(self.gicd_base + GICD_CTLR, value.bits());
    }
}

impl<M: Mmio> InterruptController for GicV2<M> {
    fn distributor_init(&self) {
        // Disable the distributor before configuring it.
        let ctlr = self.gicd_ctlr();
        self.set_gicd_ctlr(ctlr - (GicdCtlr::ENABLE_GRP0 | GicdCtlr::ENABLE_GRP1));

        // All SPIs are non-secure, level triggered and at the default priority.
        for int_id in IntId::spis().take(self.num_spis()) {
            self.set_group1(int_id);
            self.set_priority(int_id, GIC_HIGHEST_NS_PRIORITY);
            self.set_level_triggered(int_id);
        }

        // Group 1 is enabled by the non-secure world.
        self.set_gicd_ctlr(self.gicd_ctlr() | GicdCtlr::ENABLE_GRP0);
    }

    fn pcpu_distributor_init(&self) {
        for int_id in IntId::private() {
            self.disable_interrupt(int_id);
        }
        for int_id in IntId::private() {
            self.set_group1(int_id);
            self.set_priority(int_id, GIC_HIGHEST_NS_PRIORITY);
        }

        let ctlr = self.gicd_ctlr();
        if !ctlr.contains(GicdCtlr::ENABLE_GRP0) {
            self.set_gicd_ctlr(ctlr | GicdCtlr::ENABLE_GRP0);
        }
    }

    fn cpu_interface_enable(&self) {
        // Program the idle priority in the PMR.
        self.mmio.write32(self.gicc_base + GICC_PMR, GIC_PRI_MASK);

        // Secure interrupts are signalled as FIQs, and the legacy bypass is disabled.
        let ctlr = GiccCtlr::ENABLE_GRP0
            | GiccCtlr::ENABLE_GRP1
            | GiccCtlr::FIQ_EN
            | GiccCtlr::FIQ_BYP_DIS_GRP0
            | GiccCtlr::IRQ_BYP_DIS_GRP0
            | GiccCtlr::FIQ_BYP_DIS_GRP1
            | GiccCtlr::IRQ_BYP_DIS_GRP1;
        self.mmio.write32(self.gicc_base + GICC_CTLR, ctlr.bits());
    }

    fn cpu_interface_disable(&self) {
        self.mmio.clear_bits32(
            self.gicc_base + GICC_CTLR,
            (GiccCtlr::ENABLE_GRP0 | GiccCtlr::ENABLE_GRP1).bits(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::FakeMmio;

    const GICD_BASE: usize = 0x1000;
    const GICC_BASE: usize = 0x2000;

    fn gic(mmio: &FakeMmio) -> GicV2<&FakeMmio> {
        GicV2::new(mmio, GICD_BASE, GICC_BASE)
    }

    #[test]
    fn distributor_init() {
        let mmio = FakeMmio::new();
        // 64 SPIs.
        mmio.set(GICD_BASE + GICD_TYPER, 2);
        mmio.set(GICD_BASE + GICD_CTLR, 0b11);
        mmio.set(GICD_BASE + GICD_ICFGR + 8, 0xffff_ffff);

        gic(&mmio).distributor_init();

        // Disabled first, then group 0 re-enabled at the end.
        assert_eq!(mmio.writes_to(GICD_BASE + GICD_CTLR), vec![0, 1]);
        assert_eq!(mmio.get(GICD_BASE + GICD_IGROUPR), 0);
        assert_eq!(mmio.get(GICD_BASE + GICD_IGROUPR + 4), 0xffff_ffff);
        assert_eq!(mmio.get(GICD_BASE + GICD_IGROUPR + 8), 0xffff_ffff);
        assert_eq!(mmio.get(GICD_BASE + GICD_IGROUPR + 12), 0);
        assert_eq!(mmio.get(GICD_BASE + GICD_IPRIORITYR + 28), 0);
        for offset in (32..96).step_by(4) {
            assert_eq!(mmio.get(GICD_BASE + GICD_IPRIORITYR + offset), 0x8080_8080);
        }
        assert_eq!(mmio.get(GICD_BASE + GICD_ICFGR + 8), 0x5555_5555);
    }

    #[test]
    fn pcpu_distributor_init() {
        let mmio = FakeMmio::new();

        gic(&mmio).pcpu_distributor_init();

        assert_eq!(mmio.get(GICD_BASE + GICD_ICENABLER), 0x8000_0000);
        assert_eq!(mmio.writes_to(GICD_BASE + GICD_ICENABLER).len(), 32);
        assert_eq!(mmio.get(GICD_BASE + GICD_IGROUPR), 0xffff_ffff);
        for offset in (0..32).step_by(4) {
            assert_eq!(mmio.get(GICD_BASE + GICD_IPRIORITYR + offset), 0x8080_8080);
        }
        assert_eq!(mmio.get(GICD_BASE + GICD_CTLR), 1);
    }

    #[test]
    fn pcpu_distributor_init_keeps_enabled_distributor() {
        let mmio = FakeMmio::new();
        mmio.set(GICD_BASE + GICD_CTLR, 0b11);

        gic(&mmio).pcpu_distributor_init();

        assert!(mmio.writes_to(GICD_BASE + GICD_CTLR).is_empty());
    }

    #[test]
    fn cpu_interface_enable_disable() {
        let mmio = FakeMmio::new();
        let gic = gic(&mmio);

        gic.cpu_interface_enable();
        assert_eq!(mmio.get(GICC_BASE + GICC_PMR), 0xff);
        assert_eq!(mmio.get(GICC_BASE + GICC_CTLR), 0x1eb);

        gic.cpu_interface_disable();
        assert_eq!(mmio.get(GICC_BASE + GICC_CTLR), 0x1e8);
    }
}
