//! # Memory Layout

use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// Where RAM starts and the kernel image is loaded (LMA).
pub const PHYS_BASE: u64 = 0x8000_0000;

/// Amount of RAM the kernel assumes to be present.
pub const PHYS_SIZE: u64 = 128 * 1024 * 1024;

/// Top of usable physical memory (exclusive). The frame allocator never hands
/// out an address at or above this.
pub const PHYS_TOP: u64 = PHYS_BASE + PHYS_SIZE;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

const _: () = {
    assert!(PHYS_BASE.is_multiple_of(Size4K::SIZE));
    assert!(PHYS_TOP.is_multiple_of(Size4K::SIZE));
    assert!(PHYS_TOP > PHYS_BASE);
    assert!(HHDM_BASE > PHYS_TOP);
};

/// The top of physical memory as a typed address.
#[must_use]
pub const fn phys_top() -> PhysicalAddress {
    PhysicalAddress::new(PHYS_TOP)
}

/// First address after the kernel image, as placed by the linker script.
#[cfg(target_os = "none")]
#[must_use]
#[allow(unsafe_code)]
pub fn kernel_image_end() -> PhysicalAddress {
    unsafe extern "C" {
        /// First address after the kernel; defined by the linker script.
        static end: u8;
    }

    // Only the address of the linker symbol is taken, it is never read.
    PhysicalAddress::new((&raw const end) as u64)
}
