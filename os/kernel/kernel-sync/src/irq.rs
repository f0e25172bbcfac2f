//! Interrupt masking for spin-lock critical sections.
//!
//! An interrupt handler that needs a lock already held on its own CPU would
//! spin forever. Every [`SpinLock`](crate::SpinLock) acquisition therefore
//! masks interrupts first and restores the previous state after release.
//!
//! Only bare-metal x86-64 builds touch `RFLAGS`; everywhere else (host tests,
//! other targets) the guard is a no-op.

/// Bit 9 of `RFLAGS`: interrupts enabled.
#[cfg(all(target_os = "none", target_arch = "x86_64"))]
const RFLAGS_IF: u64 = 1 << 9;

/// Masks interrupts while alive; restores them on drop if they were enabled.
///
/// Guards nest: each one remembers the state it found, so dropping them in
/// reverse order of creation returns to the outermost state.
#[must_use]
pub struct IrqGuard {
    #[cfg(all(target_os = "none", target_arch = "x86_64"))]
    were_enabled: bool,
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
impl IrqGuard {
    #[inline]
    pub fn new() -> Self {
        let were_enabled = rflags() & RFLAGS_IF != 0;
        if were_enabled {
            // SAFETY: kernel code runs at CPL 0, where `cli` is permitted.
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }
        Self { were_enabled }
    }

    /// Whether this guard will re-enable interrupts when dropped.
    #[inline]
    #[must_use]
    pub const fn restores_interrupts(&self) -> bool {
        self.were_enabled
    }
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            // SAFETY: as in `new`.
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        }
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86_64")))]
impl IrqGuard {
    #[inline]
    pub const fn new() -> Self {
        Self {}
    }

    #[inline]
    #[must_use]
    pub const fn restores_interrupts(&self) -> bool {
        false
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Current `RFLAGS`.
#[cfg(all(target_os = "none", target_arch = "x86_64"))]
#[inline]
#[must_use]
fn rflags() -> u64 {
    let flags: u64;
    // SAFETY: reading the flags register has no side effects.
    unsafe { core::arch::asm!("pushfq; pop {}", out(reg) flags, options(preserves_flags)) }
    flags
}
