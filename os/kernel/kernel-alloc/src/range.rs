//! # Managed physical range
//!
//! The span of physical frames the allocator is responsible for: from the
//! first page boundary after the kernel image up to the last whole page below
//! the top of physical memory. Every address handed to the allocator or the
//! reference table is checked against it.

use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// Why an address is not a managed frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AddressError {
    #[error("address {0} is not page aligned")]
    Unaligned(PhysicalAddress),
    #[error("address {addr} lies below the first managed frame {start}")]
    BelowRange {
        addr: PhysicalAddress,
        start: PhysicalAddress,
    },
    #[error("address {addr} lies at or above the top of managed memory {end}")]
    AboveRange {
        addr: PhysicalAddress,
        end: PhysicalAddress,
    },
}

/// `[start, end)` of managed 4 KiB frames; both bounds are page aligned.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ManagedRange {
    start: PhysicalAddress,
    end: PhysicalAddress,
}

impl ManagedRange {
    /// Build the range from the end of the kernel image and the top of memory.
    ///
    /// `kernel_end` is rounded up and `phys_top` rounded down to a page
    /// boundary. A range whose bounds cross is empty.
    ///
    /// ```rust
    /// use kernel_alloc::range::ManagedRange;
    /// use kernel_memory_addresses::PhysicalAddress;
    ///
    /// let range = ManagedRange::new(PhysicalAddress::new(0x8000_0123), PhysicalAddress::new(0x8000_3800));
    /// assert_eq!(range.start().as_u64(), 0x8000_1000);
    /// assert_eq!(range.end().as_u64(), 0x8000_3000);
    /// assert_eq!(range.frame_count(), 2);
    /// ```
    #[must_use]
    pub const fn new(kernel_end: PhysicalAddress, phys_top: PhysicalAddress) -> Self {
        let end = phys_top.align_down::<Size4K>();
        let start = match kernel_end.align_up::<Size4K>() {
            Some(start) if start.as_u64() <= end.as_u64() => start,
            _ => end,
        };
        Self { start, end }
    }

    /// The range described by the linker-provided kernel end and [`PHYS_TOP`](kernel_info::memory::PHYS_TOP).
    #[cfg(target_os = "none")]
    #[must_use]
    pub fn from_boot_layout() -> Self {
        Self::new(
            kernel_info::memory::kernel_image_end(),
            kernel_info::memory::phys_top(),
        )
    }

    /// First managed frame.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    /// First address past the last managed frame.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.end
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn frame_count(&self) -> usize {
        ((self.end.as_u64() - self.start.as_u64()) >> Size4K::SHIFT) as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Dense frame index of `pa`, after checking alignment and bounds.
    ///
    /// # Errors
    /// The address is unaligned, below [`start`](Self::start), or at or above [`end`](Self::end).
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(&self, pa: PhysicalAddress) -> Result<usize, AddressError> {
        if !pa.is_aligned::<Size4K>() {
            return Err(AddressError::Unaligned(pa));
        }
        if pa.as_u64() < self.start.as_u64() {
            return Err(AddressError::BelowRange {
                addr: pa,
                start: self.start,
            });
        }
        if pa.as_u64() >= self.end.as_u64() {
            return Err(AddressError::AboveRange {
                addr: pa,
                end: self.end,
            });
        }
        Ok(((pa.as_u64() - self.start.as_u64()) >> Size4K::SHIFT) as usize)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        self.index_of(pa).is_ok()
    }

    /// Base address of the frame with dense index `index`.
    #[must_use]
    pub const fn frame_at(&self, index: usize) -> Option<PhysicalAddress> {
        if index >= self.frame_count() {
            return None;
        }
        Some(PhysicalAddress::new(
            self.start.as_u64() + ((index as u64) << Size4K::SHIFT),
        ))
    }

    /// All managed frames in ascending order.
    pub fn frames(&self) -> impl DoubleEndedIterator<Item = PhysicalAddress> + ExactSizeIterator {
        let start = self.start;
        (0..self.frame_count()).map(move |i| start + ((i as u64) << Size4K::SHIFT))
    }
}

impl fmt::Debug for ManagedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManagedRange({}..{})", self.start, self.end)
    }
}

impl fmt::Display for ManagedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{} ({} frames)",
            self.start,
            self.end,
            self.frame_count()
        )
    }
}
