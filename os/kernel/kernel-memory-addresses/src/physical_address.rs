use crate::PageSize;
use core::fmt;
use core::ops::{Add, AddAssign};

/// An address in physical memory.
///
/// The frame allocator takes and returns these; the bytes behind one are only
/// reachable through a physical mapper. Arithmetic that can leave the 64-bit
/// address space is checked and returns `None`.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x8000_0042);
/// assert!(!pa.is_aligned::<Size4K>());
/// assert_eq!(pa.align_down::<Size4K>().as_u64(), 0x8000_0000);
/// assert_eq!(pa.align_up::<Size4K>(), Some(PhysicalAddress::new(0x8000_1000)));
/// assert_eq!(pa.frame_offset::<Size4K>(), 0x42);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the address is the base of an `S` frame.
    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0 & S::MASK == 0
    }

    /// Byte offset of the address within its `S` frame.
    #[inline]
    #[must_use]
    pub const fn frame_offset<S: PageSize>(self) -> u64 {
        self.0 & S::MASK
    }

    /// Base of the `S` frame containing the address.
    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0 & !S::MASK)
    }

    /// Base of the first `S` frame at or above the address; `None` past the
    /// end of the address space.
    #[inline]
    #[must_use]
    pub const fn align_up<S: PageSize>(self) -> Option<Self> {
        match self.0.checked_add(S::MASK) {
            Some(v) => Some(Self(v & !S::MASK)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA({self})")
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(pa: PhysicalAddress) -> Self {
        pa.0
    }
}

/// Byte offset; overflow is a bug in the caller and panics in debug builds.
impl Add<u64> for PhysicalAddress {
    type Output = Self;

    #[inline]
    fn add(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, bytes: u64) {
        self.0 += bytes;
    }
}
