// SPDX-License-Identifier: Apache-2.0
//! Build script: compile the mock QDAP backend shared library for integration tests.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const MOCK_SRC: &str = "tests/mock_device/mock_device.c";

fn main() {
    println!("cargo:rerun-if-changed={MOCK_SRC}");

    // The mock backend ships with this crate; skip silently if the fixture
    // is absent (e.g. a source distribution without tests).
    if !Path::new(MOCK_SRC).exists() {
        return;
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR not set by cargo"));
    let ext = if cfg!(target_os = "macos") { "dylib" } else { "so" };
    let lib_path = out_dir.join(format!("libqdap_mock_device.{ext}"));

    // Honour an externally chosen C compiler, falling back to the system cc.
    let compiler = env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let status = Command::new(&compiler)
        .args(["-shared", "-fPIC", "-O2", "-Wall", "-Wextra"])
        .arg(MOCK_SRC)
        .arg("-o")
        .arg(&lib_path)
        .status()
        .unwrap_or_else(|e| panic!("failed to run '{compiler}': {e}"));
    assert!(status.success(), "mock backend compilation failed: {status}");

    // Hand the compiled library's path to the integration tests.
    println!("cargo:rustc-env=QDAP_MOCK_DEVICE_PATH={}", lib_path.display());
}
