//! # Page reference counts
//!
//! One signed counter per managed frame, tracking how many live virtual
//! mappings point at it (copy-on-write sharers). The table is sized once, when
//! it is built, and guarded by a single lock; every read and write of any slot
//! goes through that lock.
//!
//! The counters are signed so that a decrement past zero is visible instead of
//! wrapping around. What happens then is decided by the
//! [`UnderflowPolicy`].

use crate::config::UnderflowPolicy;
use crate::fatal::{Operation, fatal};
use crate::range::{AddressError, ManagedRange};
use alloc::boxed::Box;
use alloc::vec;
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::SpinLock;
use log::{trace, warn};

/// Number of live mappings of a frame.
pub type RefCount = i8;

/// Why a reference-count operation cannot proceed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RefCountError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("reference count of frame {0} would overflow")]
    Overflow(PhysicalAddress),
    #[error("reference count of frame {0} would drop below zero")]
    Underflow(PhysicalAddress),
}

/// Outcome of a decrement: the count before and after.
///
/// `previous == 0` means the decrement was clamped; only `previous == 1`
/// drops the last mapping.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Decrement {
    pub(crate) previous: RefCount,
    pub(crate) remaining: RefCount,
}

impl Decrement {
    /// Whether this decrement removed the last mapping.
    #[inline]
    #[must_use]
    pub(crate) const fn released_last(&self) -> bool {
        self.previous == 1 && self.remaining == 0
    }
}

/// Per-frame reference counts for a [`ManagedRange`].
pub struct RefCountTable {
    range: ManagedRange,
    underflow: UnderflowPolicy,
    counts: SpinLock<Box<[RefCount]>>,
}

impl RefCountTable {
    /// A table covering every frame of `range`, all counts zero.
    #[must_use]
    pub fn new(range: ManagedRange, underflow: UnderflowPolicy) -> Self {
        Self {
            range,
            underflow,
            counts: SpinLock::new("pg_ref", vec![0; range.frame_count()].into_boxed_slice()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn range(&self) -> &ManagedRange {
        &self.range
    }

    #[inline]
    #[must_use]
    pub const fn underflow_policy(&self) -> UnderflowPolicy {
        self.underflow
    }

    /// Record one more mapping of `pa`; returns the count before the increment.
    ///
    /// # Panics
    /// `pa` is not a managed frame, or its counter is already at
    /// [`RefCount::MAX`]. The table is not modified in either case.
    #[track_caller]
    pub fn increment(&self, pa: PhysicalAddress) -> RefCount {
        self.checked_increment(pa)
            .unwrap_or_else(|e| fatal(Operation::IncrementRef, e))
    }

    /// Drop one mapping of `pa`; returns the remaining count.
    ///
    /// Decrementing a counter that is already zero returns zero and leaves
    /// the counter at zero under [`UnderflowPolicy::Clamp`].
    ///
    /// # Panics
    /// `pa` is not a managed frame, or the counter is zero and the policy is
    /// [`UnderflowPolicy::Fatal`]. The table is not modified in either case.
    #[track_caller]
    pub fn decrement(&self, pa: PhysicalAddress) -> RefCount {
        self.checked_decrement(pa)
            .map_or_else(|e| fatal(Operation::DecrementRef, e), |d| d.remaining)
    }

    /// Current count of `pa`.
    ///
    /// # Panics
    /// `pa` is not a managed frame.
    #[track_caller]
    pub fn read(&self, pa: PhysicalAddress) -> RefCount {
        self.checked_read(pa)
            .unwrap_or_else(|e| fatal(Operation::ReadRef, e))
    }

    /// Number of frames with at least one live mapping.
    #[must_use]
    pub fn shared_frames(&self) -> usize {
        self.counts.with_lock(|counts| counts.iter().filter(|&&c| c > 0).count())
    }

    pub(crate) fn checked_increment(&self, pa: PhysicalAddress) -> Result<RefCount, RefCountError> {
        let index = self.range.index_of(pa)?;
        let mut counts = self.counts.lock();
        let slot = &mut counts[index];
        let previous = *slot;
        *slot = previous
            .checked_add(1)
            .ok_or(RefCountError::Overflow(pa))?;
        drop(counts);

        trace!("increment_ref {pa}: {previous} -> {}", previous + 1);
        Ok(previous)
    }

    /// Decrement, reporting both counts.
    ///
    /// # Errors
    /// The address is not a managed frame, or the counter is zero under
    /// [`UnderflowPolicy::Fatal`]. The table is unchanged on error.
    pub(crate) fn checked_decrement(&self, pa: PhysicalAddress) -> Result<Decrement, RefCountError> {
        let index = self.range.index_of(pa)?;
        let mut counts = self.counts.lock();
        let slot = &mut counts[index];
        let previous = *slot;
        if previous > 0 {
            *slot = previous - 1;
            drop(counts);
            trace!("decrement_ref {pa}: {previous} -> {}", previous - 1);
            return Ok(Decrement {
                previous,
                remaining: previous - 1,
            });
        }

        match self.underflow {
            UnderflowPolicy::Clamp => {
                *slot = 0;
                drop(counts);
                warn!("decrement_ref {pa}: count was already zero, clamped");
                Ok(Decrement {
                    previous: 0,
                    remaining: 0,
                })
            }
            UnderflowPolicy::Fatal => Err(RefCountError::Underflow(pa)),
        }
    }

    pub(crate) fn checked_read(&self, pa: PhysicalAddress) -> Result<RefCount, RefCountError> {
        let index = self.range.index_of(pa)?;
        Ok(self.counts.with_lock(|counts| counts[index]))
    }
}

impl core::fmt::Debug for RefCountTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RefCountTable")
            .field("range", &self.range)
            .field("underflow", &self.underflow)
            .finish_non_exhaustive()
    }
}
