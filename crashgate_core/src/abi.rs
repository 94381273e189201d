//! Conversions at the C boundary shared by the exported entry points.

use std::ffi::{CStr, c_char, c_int};

/// Signature of a per-input entry point: `(data, size) -> status`.
pub type RawEntry = unsafe extern "C" fn(*const u8, usize) -> c_int;

/// Borrows the driver's buffer for the duration of one call.
///
/// # Safety
///
/// When `size` is non-zero, `data` must point to `size` readable bytes that
/// stay valid for `'a`.
pub unsafe fn input_slice<'a>(data: *const u8, size: usize) -> &'a [u8] {
    if data.is_null() || size == 0 {
        return &[];
    }
    // SAFETY: caller guarantees `size` readable bytes at `data`.
    unsafe { std::slice::from_raw_parts(data, size) }
}

/// Copies an argv-style vector into owned strings, lossily decoding UTF-8.
///
/// # Safety
///
/// `argv`, when non-null, must hold `argc` pointers, each null or pointing to a
/// NUL-terminated string.
pub unsafe fn collect_args(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    if argv.is_null() || argc <= 0 {
        return Vec::new();
    }
    let count = usize::try_from(argc).unwrap_or(0);
    // SAFETY: caller guarantees `argc` entries.
    let entries = unsafe { std::slice::from_raw_parts(argv, count) };
    entries
        .iter()
        .filter(|entry| !entry.is_null())
        // SAFETY: non-null entries are NUL-terminated per the caller contract.
        .map(|&entry| unsafe { CStr::from_ptr(entry) }.to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn null_or_empty_buffers_become_empty_slices() {
        let slice = unsafe { input_slice(std::ptr::null(), 16) };
        assert!(slice.is_empty());
        let bytes = [1u8, 2, 3];
        let slice = unsafe { input_slice(bytes.as_ptr(), 0) };
        assert!(slice.is_empty());
    }

    #[test]
    fn buffer_is_bounded_by_size() {
        let bytes = *b"xyz\x00extra";
        let slice = unsafe { input_slice(bytes.as_ptr(), 4) };
        assert_eq!(slice, b"xyz\x00");
    }

    #[test]
    fn argv_round_trips_into_strings() {
        let owned: Vec<CString> = ["./fuzz", "--only_asan_failures"]
            .iter()
            .map(|arg| CString::new(*arg).unwrap())
            .collect();
        let mut pointers: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
        pointers.push(std::ptr::null());

        let args = unsafe { collect_args(2, pointers.as_ptr()) };
        assert_eq!(args, vec!["./fuzz", "--only_asan_failures"]);
    }

    #[test]
    fn missing_argv_is_empty() {
        assert!(unsafe { collect_args(3, std::ptr::null()) }.is_empty());
        let arg = CString::new("x").unwrap();
        let pointers = [arg.as_ptr()];
        assert!(unsafe { collect_args(0, pointers.as_ptr()) }.is_empty());
    }
}
