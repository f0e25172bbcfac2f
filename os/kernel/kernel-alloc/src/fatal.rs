//! # Fatal invariant violations
//!
//! Misaligned or out-of-range frame addresses, a second `init`, releasing a
//! frame that is already free, and counter overflow mean kernel state is already corrupt. They are never returned to
//! the caller: [`fatal`] logs the diagnostic and panics. Kernel builds use
//! `panic = "abort"`, so this halts the machine; host tests can intercept the
//! panic with `#[should_panic]` or `catch_unwind`.
//!
//! Every fatal path fires before any state is mutated and without holding a
//! lock.

use core::fmt;
use log::error;

/// The allocator entry point that detected a violation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operation {
    Init,
    FreeRange,
    AllocatePage,
    FreePage,
    IncrementRef,
    DecrementRef,
    ReadRef,
    ReleaseMapping,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FreeRange => "free_range",
            Self::AllocatePage => "allocate_page",
            Self::FreePage => "free_page",
            Self::IncrementRef => "increment_ref",
            Self::DecrementRef => "decrement_ref",
            Self::ReadRef => "read_ref",
            Self::ReleaseMapping => "release_mapping",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Halt with a diagnostic of the form `"<operation>: <reason>"`.
#[cold]
#[track_caller]
pub fn fatal(op: Operation, reason: impl fmt::Display) -> ! {
    error!("{op}: {reason}");
    panic!("{op}: {reason}");
}
