// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! 32-bit memory-mapped register access.

/// Access to 32-bit device registers by physical address.
///
/// All hardware access in this crate goes through this trait, so that the mailbox protocol and the
/// power state machine can be driven against fake registers in unit tests.
pub trait Mmio {
    /// Reads the 32-bit register at `address`.
    fn read32(&self, address: usize) -> u32;

    /// Writes `value` to the 32-bit register at `address`.
    fn write32(&self, address: usize, value: u32);

    /// Sets the bits of `mask` in the 32-bit register at `address`, leaving the others unchanged.
    fn set_bits32(&self, address: usize, mask: u32) {
        self.write32(address, self.read32(address) | mask);
    }

    /// Clears the bits of `mask` in the 32-bit register at `address`, leaving the others unchanged.
    fn clear_bits32(&self, address: usize, mask: u32) {
        self.write32(address, self.read32(address) & !mask);
    }
}

impl<T: Mmio + ?Sized> Mmio for &T {
    fn read32(&self, address: usize) -> u32 {
        (**self).read32(address)
    }

    fn write32(&self, address: usize, value: u32) {
        (**self).write32(address, value)
    }
}

/// Volatile access to the identity-mapped device memory of the SoC.
#[derive(Debug)]
pub struct DeviceMmio {
    _private: (),
}

impl DeviceMmio {
    /// Creates a handle for accessing device registers.
    ///
    /// # Safety
    ///
    /// Every address later passed to [`Mmio::read32`] or [`Mmio::write32`] must be a 4-byte aligned
    /// device register or shared SRAM word which is identity mapped, and writing to it must not
    /// break any Rust aliasing guarantees (i.e. it must not be memory owned by Rust code).
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Mmio for DeviceMmio {
    fn read32(&self, address: usize) -> u32 {
        // SAFETY: The caller of `DeviceMmio::new` promised that all addresses we are given are
        // valid, aligned and mapped device memory.
        unsafe { (address as *const u32).read_volatile() }
    }

    fn write32(&self, address: usize, value: u32) {
        // SAFETY: The caller of `DeviceMmio::new` promised that all addresses we are given are
        // valid, aligned and mapped device memory which is not aliased by Rust references.
        unsafe { (address as *mut u32).write_volatile(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::FakeMmio;

    #[test]
    fn set_and_clear_bits() {
        let mmio = FakeMmio::new();
        mmio.write32(0x100, 0b1010);

        mmio.set_bits32(0x100, 0b0101);
        assert_eq!(mmio.read32(0x100), 0b1111);

        mmio.clear_bits32(0x100, 0b0011);
        assert_eq!(mmio.read32(0x100), 0b1100);
    }

    #[test]
    fn device_mmio_reads_and_writes_memory() {
        let mut word: u32 = 0;
        let address = &raw mut word as usize;
        // SAFETY: The only address accessed is `word`, which lives until the end of the test and
        // is not otherwise accessed while `mmio` is in use.
        let mmio = unsafe { DeviceMmio::new() };

        mmio.write32(address, 0x1234_5678);
        mmio.set_bits32(address, 1 << 31);

        assert_eq!(mmio.read32(address), 0x9234_5678);
    }
}
