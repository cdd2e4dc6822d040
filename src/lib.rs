// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! EL3 power management for Allwinner (sunxi) SoCs.
//!
//! The PSCI platform hooks in [`platform::sunxi`] talk to the ARISC management processor (the SCP)
//! through the SCPI protocol in [`scpi`], which in turn drives the single message box channel in
//! [`msgbox`].

#![cfg_attr(not(test), no_std)]

pub mod aarch64;
mod debug;
pub mod delay;
pub mod gicv2;
pub mod logger;
pub mod mmio;
pub mod msgbox;
pub mod ns16550;
pub mod platform;
pub mod scpi;
pub mod services;
