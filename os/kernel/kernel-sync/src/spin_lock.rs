use core::cell::UnsafeCell;
use core::fmt;
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::irq::IrqGuard;

/// Named spin lock around a kernel table.
///
/// Acquisition is test-and-test-and-set: a failed exchange falls back to
/// read-only polling so waiting contexts do not bounce the cache line. The
/// name identifies the table in diagnostics (`"kmem"`, `"pg_ref"`).
///
/// Interrupts are masked on the acquiring CPU from before the first attempt
/// until after release, so an interrupt handler that takes the same lock
/// cannot preempt its holder. Critical sections must be short and must not
/// block.
pub struct SpinLock<T> {
    name: &'static str,
    held: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only reached through a guard, and at most one guard exists.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            held: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the lock state; stale as soon as it is returned.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// Acquire without waiting.
    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let irq = IrqGuard::new();
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard::new(self, irq))
    }

    /// Acquire, spinning until the holder releases.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let irq = IrqGuard::new();
        loop {
            if self
                .held
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinLockGuard::new(self, irq);
            }
            while self.is_locked() {
                spin_loop();
            }
        }
    }

    /// Run `f` on the protected data with the lock held.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Direct access through exclusive ownership; no locking needed.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Proof of holding a [`SpinLock`]; releases it on drop.
///
/// Not `Send`: the context that acquired the lock releases it. The lock is
/// released before the interrupt state is restored.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    /// Dropped after `Drop::drop` has released the lock.
    irq: IrqGuard,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> SpinLockGuard<'a, T> {
    const fn new(lock: &'a SpinLock<T>, irq: IrqGuard) -> Self {
        Self {
            lock,
            irq,
            _not_send: PhantomData,
        }
    }

    /// Whether releasing this guard re-enables interrupts.
    #[inline]
    #[must_use]
    pub const fn restores_interrupts(&self) -> bool {
        self.irq.restores_interrupts()
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.lock.name
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock, and `&mut self` makes this the only borrow.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
