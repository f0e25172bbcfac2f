//! # Kernel Memory Layout
//!
//! Boot-provided constants that define the physical range handed to the page
//! frame allocator. They are the single source of truth shared by the linker
//! configuration, the allocator's boot path and its tests.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! PHYS_BASE        ┌─────────────────────────────────┐ 0x8000_0000
//!                  │       Kernel Image              │
//!                  │   (Text, Data, BSS)             │
//! kernel_image_end ├─────────────────────────────────┤ (linker symbol `end`)
//!                  │    Available RAM                │
//!                  │  (Managed by frame allocator)   │
//! PHYS_TOP         └─────────────────────────────────┘ PHYS_BASE + 128 MiB
//! ```
//!
//! The first managed frame is `kernel_image_end` rounded up to a page
//! boundary; the managed range stops at the last whole page below
//! [`PHYS_TOP`](memory::PHYS_TOP).
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::memory::{PHYS_BASE, PHYS_TOP, PHYS_SIZE};
//! assert_eq!(PHYS_TOP - PHYS_BASE, PHYS_SIZE);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
