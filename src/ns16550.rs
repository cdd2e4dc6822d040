// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Transmit-only driver for the 16550 compatible UARTs of sunxi SoCs.
//!
//! The UART is expected to have been configured by an earlier boot stage. Registers are 32 bits
//! apart.

use crate::mmio::Mmio;
use bitflags::bitflags;
use core::fmt;

const UART_THR: usize = 0x00;
const UART_LSR: usize = 0x14;

bitflags! {
    /// Line status register bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct Lsr: u32 {
        /// Transmit holding register empty.
        const THRE = 1 << 5;
    }
}

/// A 16550 UART.
#[derive(Debug)]
pub struct Ns16550<M: Mmio> {
    mmio: M,
    base: usize,
}

impl<M: Mmio> Ns16550<M> {
    /// Creates a driver for the UART with its registers at `base`.
    pub const fn new(mmio: M, base: usize) -> Self {
        Self { mmio, base }
    }

    fn line_status(&self) -> Lsr {
        Lsr::from_bits_retain(self.mmio.read32(self.base + UART_LSR))
    }

    /// Writes a single byte, waiting for space in the transmit holding register first.
    pub fn write_byte(&self, byte: u8) {
        while !self.line_status().contains(Lsr::THRE) {
            core::hint::spin_loop();
        }
        self.mmio.write32(self.base + UART_THR, byte.into());
    }
}

impl<M: Mmio> fmt::Write for Ns16550<M> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}
