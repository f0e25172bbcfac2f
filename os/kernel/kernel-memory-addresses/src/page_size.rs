mod sealed {
    pub trait Sealed {}
}

/// Granule of a physical frame, carried at the type level.
///
/// Sealed: the allocator manages exactly one frame size and every rounding
/// helper in this crate is generic over it instead of taking a loose `u64`.
pub trait PageSize: sealed::Sealed + Copy + Eq + core::fmt::Debug {
    /// Bytes per frame; a power of two.
    const SIZE: u64;
    /// `log2(SIZE)`.
    const SHIFT: u32;
    /// Bits of an address that lie inside a frame.
    const MASK: u64 = Self::SIZE - 1;
}

/// 4 KiB frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Size4K;

impl sealed::Sealed for Size4K {}

impl PageSize for Size4K {
    const SIZE: u64 = 4096;
    const SHIFT: u32 = 12;
}

const _: () = assert!(1u64 << Size4K::SHIFT == Size4K::SIZE);
