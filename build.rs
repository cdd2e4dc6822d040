// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Build script for the sunxi power management layer.

use std::env;

const PLATFORMS: [&str; 2] = ["sun50i_a64", "sun50i_h6"];

fn main() {
    println!(
        "cargo::rustc-check-cfg=cfg(platform, values(\"{}\"))",
        PLATFORMS.join("\", \""),
    );
    println!("cargo:rerun-if-env-changed=LOG_LEVEL");

    if env::var("CARGO_CFG_TARGET_OS").unwrap() == "none" {
        let platform = env::var("CARGO_CFG_PLATFORM").expect("Missing platform name");
        if !PLATFORMS.contains(&platform.as_str()) {
            panic!("Unexpected platform name {platform:?}. Supported platforms: {PLATFORMS:?}");
        }
    }
}
