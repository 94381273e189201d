//! The fault taxonomy and the code that deliberately violates memory safety.
//!
//! Every function below the `FaultKind` impl is an intentional undefined-behavior
//! trigger. They are kept as small as possible so a sanitizer or signal handler sees
//! exactly one violation of the labeled category. Nothing here is meant to be caught.

use serde::Serialize;
use std::ffi::c_int;
use std::hint::black_box;
use std::ptr;

const WRITE_PATTERN: u32 = 0x4141_4141;

/// Number of `u32` slots touched by the stack out-of-bounds writes.
const STACK_SPAN: usize = 32;

/// One labeled category of injected failure, keyed by its selector byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum FaultKind {
    NullWrite = 0,
    StackUnderflow = 1,
    StackOverflow = 2,
    InvalidFree = 3,
    DoubleFree = 4,
    UseAfterFree = 5,
    HeapOverflow = 6,
    DivideByZero = 7,
    Abort = 8,
}

impl FaultKind {
    pub const ALL: [FaultKind; 9] = [
        FaultKind::NullWrite,
        FaultKind::StackUnderflow,
        FaultKind::StackOverflow,
        FaultKind::InvalidFree,
        FaultKind::DoubleFree,
        FaultKind::UseAfterFree,
        FaultKind::HeapOverflow,
        FaultKind::DivideByZero,
        FaultKind::Abort,
    ];

    /// Maps a selector byte to its kind. Unknown selectors have no kind.
    pub fn from_selector(selector: u8) -> Option<Self> {
        Self::ALL.get(usize::from(selector)).copied()
    }

    pub fn selector(self) -> u8 {
        self as u8
    }

    /// Label matching the category a sanitizer report would use.
    pub fn label(self) -> &'static str {
        match self {
            FaultKind::NullWrite => "null-write",
            FaultKind::StackUnderflow => "stack-buffer-underflow",
            FaultKind::StackOverflow => "stack-buffer-overflow",
            FaultKind::InvalidFree => "bad-free",
            FaultKind::DoubleFree => "double-free",
            FaultKind::UseAfterFree => "heap-use-after-free",
            FaultKind::HeapOverflow => "heap-buffer-overflow",
            FaultKind::DivideByZero => "int-divide-by-zero",
            FaultKind::Abort => "abort",
        }
    }

    /// Whether `--only_asan_failures` leaves this kind active.
    pub fn is_sanitizer_class(self) -> bool {
        self != FaultKind::Abort
    }

    /// Whether the kind crashes even without sanitizer instrumentation.
    ///
    /// Stack and heap out-of-bounds writes, use-after-free and freeing a stack
    /// address usually corrupt memory silently in an uninstrumented build.
    pub fn crashes_uninstrumented(self) -> bool {
        !self.expected_signals().is_empty()
    }

    /// Signals an uninstrumented build dies with when this kind fires.
    pub fn expected_signals(self) -> &'static [c_int] {
        match self {
            FaultKind::NullWrite => &[libc::SIGSEGV],
            // glibc and the macOS allocator both abort on a second free.
            FaultKind::DoubleFree | FaultKind::Abort => &[libc::SIGABRT],
            FaultKind::DivideByZero => &[libc::SIGFPE],
            FaultKind::StackUnderflow
            | FaultKind::StackOverflow
            | FaultKind::InvalidFree
            | FaultKind::UseAfterFree
            | FaultKind::HeapOverflow => &[],
        }
    }

    /// Whether a sanitizer summary category names this kind.
    ///
    /// Besides [`FaultKind::label`], ASan reports signals by their short name
    /// (`SEGV`, `FPE`, `ABRT`) and UBSan reports the division itself.
    pub fn matches_sanitizer_category(self, category: &str) -> bool {
        let aliases: &[&str] = match self {
            FaultKind::NullWrite => &["SEGV"],
            FaultKind::DivideByZero => &["FPE", "integer-divide-by-zero"],
            FaultKind::Abort => &["ABRT"],
            _ => &[],
        };
        category == self.label() || aliases.contains(&category)
    }

    /// Executes the fault. Returns only when the violation went unnoticed.
    pub fn trigger(self) {
        match self {
            FaultKind::NullWrite => null_write(),
            FaultKind::StackUnderflow => stack_underflow(),
            FaultKind::StackOverflow => stack_overflow(),
            FaultKind::InvalidFree => invalid_free(),
            FaultKind::DoubleFree => double_free(),
            FaultKind::UseAfterFree => use_after_free(),
            FaultKind::HeapOverflow => heap_overflow(),
            FaultKind::DivideByZero => divide_by_zero(),
            FaultKind::Abort => std::process::abort(),
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[inline(never)]
fn null_write() {
    let target = black_box(ptr::null_mut::<u32>());
    // SAFETY: none. Writing through null is the fault.
    unsafe { target.write_volatile(WRITE_PATTERN) };
}

#[inline(never)]
fn stack_underflow() {
    let mut local = black_box(0u32);
    let base = black_box(ptr::addr_of_mut!(local)).wrapping_sub(STACK_SPAN);
    for i in 0..STACK_SPAN {
        // SAFETY: none. Every slot lies below `local`.
        unsafe { base.wrapping_add(i).write_volatile(0) };
    }
    black_box(local);
}

#[inline(never)]
fn stack_overflow() {
    let mut local = black_box(0u32);
    let base = black_box(ptr::addr_of_mut!(local)).wrapping_add(STACK_SPAN);
    for i in 0..STACK_SPAN {
        // SAFETY: none. Every slot lies above `local`.
        unsafe { base.wrapping_sub(i).write_volatile(0) };
    }
    black_box(local);
}

#[inline(never)]
fn invalid_free() {
    let mut local = black_box(0u64);
    let address = black_box(ptr::addr_of_mut!(local));
    // SAFETY: none. `address` was never returned by malloc.
    unsafe { libc::free(address.cast()) };
}

#[inline(never)]
fn double_free() {
    // SAFETY: none. The second free releases an already released block.
    unsafe {
        let block = libc::malloc(16);
        libc::free(block);
        libc::free(black_box(block));
    }
}

#[inline(never)]
fn use_after_free() {
    // SAFETY: none. The write lands in a released block.
    unsafe {
        let block = libc::malloc(std::mem::size_of::<u32>() * 4).cast::<u32>();
        libc::free(block.cast());
        black_box(block).write_volatile(WRITE_PATTERN);
    }
}

#[inline(never)]
fn heap_overflow() {
    // SAFETY: none. The block holds two slots and the write hits the tenth. It
    // is leaked on purpose; freeing it would move the report to the allocator.
    unsafe {
        let block = libc::malloc(std::mem::size_of::<u32>() * 2).cast::<u32>();
        black_box(block).wrapping_add(10).write_volatile(WRITE_PATTERN);
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[inline(never)]
fn divide_by_zero() {
    // Rust's `/` panics on a zero divisor, so the division is issued directly.
    let divisor: u32 = black_box(0);
    let dividend: u32 = black_box(1);
    // SAFETY: none. `div` by zero raises #DE, delivered as SIGFPE.
    unsafe {
        std::arch::asm!(
            "div {divisor:e}",
            divisor = in(reg) divisor,
            inout("eax") dividend => _,
            inout("edx") 0u32 => _,
            options(nomem, nostack),
        );
    }
}

// Integer division by zero does not trap on these architectures, so the signal
// the hardware would have delivered is raised instead.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
#[inline(never)]
fn divide_by_zero() {
    // SAFETY: raising a signal has no memory-safety preconditions.
    unsafe {
        libc::raise(libc::SIGFPE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_table_is_exact() {
        for (index, kind) in FaultKind::ALL.iter().enumerate() {
            assert_eq!(usize::from(kind.selector()), index);
            assert_eq!(FaultKind::from_selector(kind.selector()), Some(*kind));
        }
        assert_eq!(FaultKind::from_selector(0), Some(FaultKind::NullWrite));
        assert_eq!(FaultKind::from_selector(7), Some(FaultKind::DivideByZero));
        assert_eq!(FaultKind::from_selector(8), Some(FaultKind::Abort));
    }

    #[test]
    fn unknown_selectors_have_no_kind() {
        for selector in 9..=u8::MAX {
            assert_eq!(FaultKind::from_selector(selector), None);
        }
    }

    #[test]
    fn only_abort_is_outside_sanitizer_class() {
        let outside: Vec<_> = FaultKind::ALL
            .iter()
            .filter(|kind| !kind.is_sanitizer_class())
            .collect();
        assert_eq!(outside, vec![&FaultKind::Abort]);
    }

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<_> = FaultKind::ALL.iter().map(|kind| kind.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), FaultKind::ALL.len());
    }

    #[test]
    fn signatures_tell_kinds_apart() {
        assert_eq!(FaultKind::NullWrite.expected_signals(), &[libc::SIGSEGV]);
        assert_eq!(FaultKind::DivideByZero.expected_signals(), &[libc::SIGFPE]);
        assert!(FaultKind::HeapOverflow.expected_signals().is_empty());
        assert!(!FaultKind::HeapOverflow.crashes_uninstrumented());

        assert!(FaultKind::NullWrite.matches_sanitizer_category("SEGV"));
        assert!(FaultKind::DivideByZero.matches_sanitizer_category("int-divide-by-zero"));
        assert!(FaultKind::DivideByZero.matches_sanitizer_category("FPE"));
        assert!(FaultKind::DivideByZero.matches_sanitizer_category("integer-divide-by-zero"));
        assert!(FaultKind::UseAfterFree.matches_sanitizer_category("heap-use-after-free"));
        assert!(!FaultKind::UseAfterFree.matches_sanitizer_category("heap-buffer-overflow"));
        assert!(!FaultKind::HeapOverflow.matches_sanitizer_category("SEGV"));
    }

    #[test]
    fn serializes_as_kebab_name() {
        let json = serde_json::to_string(&FaultKind::UseAfterFree).unwrap();
        assert_eq!(json, "\"use-after-free\"");
    }
}
