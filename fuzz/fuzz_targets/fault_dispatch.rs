//! cargo-fuzz entry for the crashgate harness, linked-library style.
//!
//! Options such as `--only_asan_failures` and `--write_test_file=<path>` are
//! read from the fuzzer's own command line; `CRASHGATE_CONFIG` picks the target.

#![no_main]

use crashgate_core::{Harness, HarnessConfig};
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

static HARNESS: OnceLock<Harness> = OnceLock::new();

fn build_harness() -> Harness {
    let config = HarnessConfig::from_env().unwrap_or_else(|e| {
        eprintln!("crashgate: {e}");
        std::process::exit(1);
    });
    Harness::initialize(std::env::args(), &config, &crashgate_module::linked_entries())
        .unwrap_or_else(|e| {
            eprintln!("crashgate: initialization failed: {e}");
            std::process::exit(1);
        })
}

fuzz_target!(
    init: {
        let _ = HARNESS.set(build_harness());
    },
    |data: &[u8]| {
        let harness = HARNESS.get_or_init(build_harness);
        harness.test_one_input(data);
    }
);
