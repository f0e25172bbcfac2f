//! # Physical memory access
//!
//! The frame allocator writes into the frames it manages (junk fill, free-list
//! links), so it needs a way to "see" a physical address from the current
//! virtual address space. The strategy differs between kernels and tests:
//!
//! - A kernel that identity maps RAM uses the physical address as-is.
//! - A higher-half direct map (HHDM) adds `HHDM_BASE`.
//! - Host tests add the distance between a heap arena and the fake physical
//!   base the arena stands in for.
//!
//! All three are a constant offset, covered by [`OffsetPhysMapper`].

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;

/// Converts physical addresses to usable pointers in the current address space.
///
/// # Safety
/// - Every managed frame must be mapped writable in the current page tables
///   for as long as the mapper is used.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// The caller must own the bytes at `pa` exclusively for `'a`, and `pa`
    /// must be suitably aligned for `T`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// [`PhysMapper`] that reaches physical address `pa` at virtual `pa + offset`.
///
/// # Example
/// ```rust
/// use kernel_alloc::phys_mapper::{OffsetPhysMapper, PhysMapper};
/// use kernel_memory_addresses::PhysicalAddress;
///
/// let mut word = 0u64;
/// let phys = PhysicalAddress::new(0x8000_0000);
/// let mapper = OffsetPhysMapper::for_region(phys, (&raw mut word).cast());
/// unsafe {
///     *mapper.phys_to_mut::<u64>(phys) = 7;
/// }
/// assert_eq!(word, 7);
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct OffsetPhysMapper {
    offset: u64,
}

impl OffsetPhysMapper {
    /// Physical memory is identity mapped.
    pub const IDENTITY: Self = Self::new(0);

    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// Physical memory is visible through the higher-half direct map.
    #[must_use]
    pub const fn hhdm() -> Self {
        Self::new(HHDM_BASE)
    }

    /// Physical `base` is visible at `virt`, and everything above it at the same distance.
    #[must_use]
    pub fn for_region(base: PhysicalAddress, virt: *mut u8) -> Self {
        Self::new((virt as u64).wrapping_sub(base.as_u64()))
    }

    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl PhysMapper for OffsetPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u64().wrapping_add(self.offset) as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and mapped at this offset.
        unsafe { &mut *va }
    }
}
