//! # Physical Address Types
//!
//! A strongly typed physical address for the page frame allocator and its
//! collaborators, plus the frame granule it is aligned to.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | An address in physical memory (RAM / MMIO). |
//! | [`PageSize`] / [`Size4K`] | The frame size, carried at the type level. |
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! // First frame after a kernel image that ends mid-page.
//! let end = PhysicalAddress::new(0x8002_1234);
//! let first = end.align_up::<Size4K>().unwrap();
//! assert_eq!(first.as_u64(), 0x8002_2000);
//! assert!(first.is_aligned::<Size4K>());
//! assert_eq!((first + 0x10).align_down::<Size4K>(), first);
//! ```
//!
//! Rounding up is checked and returns `None` on overflow; rounding down never
//! fails.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;

pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
