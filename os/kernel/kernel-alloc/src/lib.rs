//! # Physical Page Allocation and Page Reference Counts
//!
//! This crate owns every 4 KiB physical frame between the end of the kernel
//! image and the top of physical memory. It hands frames out to page-table
//! builders, address-space management and pipe buffers, and takes them back
//! once nothing maps them anymore.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Frame Allocator ("kmem")               │
//! │    • allocate_page / free_page / init               │
//! │    • intrusive LIFO free list inside free frames    │
//! │    • junk fill on allocation and release            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ free_page only admits count == 0
//! ┌─────────────────▼───────────────────────────────────┐
//! │          Reference-Count Table ("pg_ref")           │
//! │    • one signed counter per managed frame           │
//! │    • increment_ref / decrement_ref / read_ref       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                Managed Range                        │
//! │    • [round_up(kernel end), round_down(top))        │
//! │    • alignment / bounds validation                  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Copy-on-write sharing
//!
//! A frame mapped into several address spaces carries one reference per
//! mapping. Tearing down a mapping is `decrement_ref` followed by `free_page`
//! ([`FrameAllocator::release_mapping`]); only the call that takes the count
//! from one to zero actually puts the frame back on the free list.
//!
//! ## Failure model
//!
//! * Running out of frames is ordinary: [`FrameAllocator::allocate_page`]
//!   returns `None`.
//! * Passing an unaligned or unmanaged address, initializing twice,
//!   releasing a frame that is already free, or overflowing a counter is an
//!   invariant violation and halts through [`fatal::fatal`].
//! * Decrementing a zero count is clamped or fatal, per
//!   [`UnderflowPolicy`].
//!
//! ## Integration Points
//!
//! * **kernel-info**: top of physical memory and the linker-provided kernel end
//! * **kernel-memory-addresses**: typed physical addresses and frames
//! * **kernel-sync**: the two spin locks

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod config;
pub mod fatal;
mod free_list;
pub mod frame_alloc;
pub mod phys_mapper;
pub mod range;
pub mod ref_count;

use alloc::sync::Arc;
use kernel_memory_addresses::PhysicalAddress;

pub use config::{AllocatorConfig, UnderflowPolicy};
pub use frame_alloc::{AlreadyFree, FRAME_SIZE, FrameAllocator, FrameStats};
pub use phys_mapper::{OffsetPhysMapper, PhysMapper};
pub use range::{AddressError, ManagedRange};
pub use ref_count::{RefCount, RefCountError, RefCountTable};

/// A source of 4 KiB *physical* frames, as consumed by page-table builders.
///
/// Implemented for shared handles of a [`FrameAllocator`], so a collaborator
/// can be written against this trait and tested with a stub.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame. Returns `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalAddress>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, pa: PhysicalAddress);
}

impl<M: PhysMapper> FrameAlloc for &FrameAllocator<M> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.allocate_page()
    }

    fn free_4k(&mut self, pa: PhysicalAddress) {
        self.free_page(pa);
    }
}

impl<M: PhysMapper> FrameAlloc for Arc<FrameAllocator<M>> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.allocate_page()
    }

    fn free_4k(&mut self, pa: PhysicalAddress) {
        self.free_page(pa);
    }
}
