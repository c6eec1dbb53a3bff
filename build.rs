// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

fn main() {
    println!("cargo:rerun-if-env-changed=TAKT_LINKER_SCRIPT");
    if let Ok(script) = std::env::var("TAKT_LINKER_SCRIPT") {
        println!("cargo:rustc-link-arg=-T{script}");
    }
}
