//! libFuzzer-style entry points for the crashgate harness.
//!
//! Link the `staticlib` into a driver, or load the `cdylib`, and the driver
//! finds `LLVMFuzzerInitialize` and `LLVMFuzzerTestOneInput`. Which target the
//! harness runs comes from the file named by `CRASHGATE_CONFIG`.

use crashgate_core::abi::{collect_args, input_slice};
use crashgate_core::{Harness, HarnessConfig};
use std::ffi::{c_char, c_int};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `CRASHGATE_LOG=debug`.
pub const LOG_ENV_VAR: &str = "CRASHGATE_LOG";

static HARNESS: OnceLock<Harness> = OnceLock::new();

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A driver embedding us may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Reports an initialization failure and ends the process.
fn fatal(message: impl std::fmt::Display) -> ! {
    tracing::error!("{message}");
    eprintln!("crashgate: initialization failed: {message}");
    std::process::exit(1);
}

fn load_config() -> HarnessConfig {
    HarnessConfig::from_env().unwrap_or_else(|e| fatal(e))
}

/// Builds harness state from the driver's arguments.
///
/// Only the first call does anything. Terminates the process if the config
/// cannot be loaded, the marker cannot be written, or the entry point cannot
/// be bound.
pub fn initialize(args: &[String]) {
    init_logging();
    initialize_into(&HARNESS, args);
}

fn initialize_into(cell: &OnceLock<Harness>, args: &[String]) {
    if cell.get().is_some() {
        tracing::warn!("Initialize called more than once; keeping the first harness");
        return;
    }
    let config = load_config();
    let harness = Harness::initialize(args, &config, &crashgate_module::linked_entries())
        .unwrap_or_else(|e| fatal(e));
    let _ = cell.set(harness);
}

/// Runs one input against the harness, building default state when the driver
/// skipped `Initialize`.
pub fn test_one_input(data: &[u8]) -> c_int {
    test_one_input_on(&HARNESS, data)
}

fn test_one_input_on(cell: &OnceLock<Harness>, data: &[u8]) -> c_int {
    cell.get_or_init(|| Harness::uninitialized(&load_config()))
        .test_one_input(data)
}

/// # Safety
///
/// `argc` and `argv` must be null or point to the driver's valid argument
/// count and vector.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn LLVMFuzzerInitialize(
    argc: *mut c_int,
    argv: *mut *mut *mut c_char,
) -> c_int {
    let args = if argc.is_null() || argv.is_null() {
        Vec::new()
    } else {
        // SAFETY: both pointers are non-null and valid per the caller contract.
        unsafe { collect_args(*argc, (*argv).cast_const().cast()) }
    };
    initialize(&args);
    0
}

/// # Safety
///
/// When `size` is non-zero, `data` must point to `size` readable bytes.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn LLVMFuzzerTestOneInput(data: *const u8, size: usize) -> c_int {
    // SAFETY: forwarded from the caller contract.
    let input = unsafe { input_slice(data, size) };
    test_one_input(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    // Tests share the process-wide harness, so every input here is benign.

    #[test]
    fn entry_point_accepts_benign_inputs() {
        for input in [&b""[..], b"xy", b"xya\x00", b"xyz\x2a", b"some longer input"] {
            let status = unsafe { LLVMFuzzerTestOneInput(input.as_ptr(), input.len()) };
            assert_eq!(status, 0, "input {input:?}");
        }
        assert_eq!(unsafe { LLVMFuzzerTestOneInput(std::ptr::null(), 0) }, 0);
    }

    fn marker_args(path: &std::path::Path) -> Vec<String> {
        vec![
            "./fuzz".to_string(),
            format!("--write_test_file={}", path.display()),
        ]
    }

    #[test]
    fn initialize_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.txt");
        let cell = OnceLock::new();

        initialize_into(&cell, &marker_args(&path));
        initialize_into(&cell, &marker_args(&path));

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert_eq!(test_one_input_on(&cell, b"xya\x00"), 0);
    }

    #[test]
    fn initialize_after_first_input_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.txt");
        let cell = OnceLock::new();

        assert_eq!(test_one_input_on(&cell, b"xyz\x2a"), 0);
        initialize_into(&cell, &marker_args(&path));
        assert!(!path.exists());
    }

    #[test]
    fn initialize_reads_argv() {
        let owned = [CString::new("./fuzz").unwrap(), CString::new("-runs=1").unwrap()];
        let mut pointers: Vec<*mut c_char> =
            owned.iter().map(|arg| arg.as_ptr().cast_mut()).collect();
        let mut argc: c_int = 2;
        let mut argv = pointers.as_mut_ptr();

        let status = unsafe { LLVMFuzzerInitialize(&mut argc, &mut argv) };
        assert_eq!(status, 0);
        assert_eq!(unsafe { LLVMFuzzerTestOneInput(b"xya\x00".as_ptr(), 4) }, 0);
    }

    #[test]
    fn null_arguments_are_tolerated() {
        let status = unsafe { LLVMFuzzerInitialize(std::ptr::null_mut(), std::ptr::null_mut()) };
        assert_eq!(status, 0);
    }
}
