//! # Kernel synchronization primitives
//!
//! Short, non-blocking critical sections for kernel tables that are touched
//! from several execution contexts at once (interrupt handlers, fork, exit).
//! Holding a lock masks interrupts on the holding CPU (see [`irq`]).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::IrqGuard;
pub use spin_lock::{SpinLock, SpinLockGuard};
