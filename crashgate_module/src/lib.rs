//! Separately built target library for the forwarding harness modes.
//!
//! Exports one entry point, [`crashgate_test_one_input`], that runs the default
//! fault dispatcher. Built as a `cdylib` it is what the dynamic mode loads; as
//! an `rlib` it is what the linked mode links in.

use crashgate_core::abi::input_slice;
use crashgate_core::config::{DEFAULT_ENTRY_SYMBOL, DEFAULT_MODULE_NAME};
use crashgate_core::{FaultDispatcher, LinkedEntries};
use std::ffi::c_int;
use std::sync::LazyLock;

pub const MODULE_NAME: &str = DEFAULT_MODULE_NAME;
pub const ENTRY_SYMBOL: &str = DEFAULT_ENTRY_SYMBOL;

static DISPATCHER: LazyLock<FaultDispatcher> = LazyLock::new(FaultDispatcher::default);

/// # Safety
///
/// When `size` is non-zero, `data` must point to `size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn crashgate_test_one_input(data: *const u8, size: usize) -> c_int {
    // SAFETY: forwarded from the caller contract.
    let input = unsafe { input_slice(data, size) };
    DISPATCHER.dispatch(input)
}

/// Linked-mode table holding this module's entry point.
pub fn linked_entries() -> LinkedEntries {
    LinkedEntries::new().with(ENTRY_SYMBOL, crashgate_test_one_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_inputs_return_zero() {
        for input in [&b""[..], b"xyz", b"xya\x00", b"xyz\x09", b"anything at all"] {
            let status = unsafe { crashgate_test_one_input(input.as_ptr(), input.len()) };
            assert_eq!(status, 0, "input {input:?}");
        }
        assert_eq!(unsafe { crashgate_test_one_input(std::ptr::null(), 0) }, 0);
    }

    #[test]
    fn entry_is_registered_under_the_exported_name() {
        let module = linked_entries().lookup(ENTRY_SYMBOL).unwrap();
        use crashgate_core::EntryModule;
        assert_eq!(module.invoke(b"xya\x00"), 0);
    }
}
