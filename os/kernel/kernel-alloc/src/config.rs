//! # Allocator configuration
//!
//! Runtime knobs of the [`FrameAllocator`](crate::frame_alloc::FrameAllocator).
//! The defaults reproduce the classic behavior: junk-fill on both allocation
//! and release, and a lenient reference-count underflow.

use core::fmt;

/// Byte written over a frame when it is handed out.
pub const ALLOC_JUNK: u8 = 0x05;

/// Byte written over a frame when it goes back onto the free list.
pub const FREE_JUNK: u8 = 0x01;

/// What `decrement_ref` does when a counter is already zero.
///
/// A decrement at zero almost always means some mapping was released twice.
/// `Clamp` keeps the system running and leaves the counter at zero, `Fatal`
/// halts with a diagnostic naming the frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnderflowPolicy {
    /// Store zero and report zero.
    Clamp,
    /// Treat the underflow as an invariant violation.
    Fatal,
}

impl UnderflowPolicy {
    /// `Fatal` with the `strict-refcount` feature, `Clamp` otherwise.
    #[must_use]
    pub const fn from_features() -> Self {
        if cfg!(feature = "strict-refcount") {
            Self::Fatal
        } else {
            Self::Clamp
        }
    }
}

impl Default for UnderflowPolicy {
    fn default() -> Self {
        Self::from_features()
    }
}

impl fmt::Display for UnderflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clamp => f.write_str("clamp"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// Configuration for a [`FrameAllocator`](crate::frame_alloc::FrameAllocator).
///
/// ```rust
/// use kernel_alloc::config::{AllocatorConfig, UnderflowPolicy};
///
/// let config = AllocatorConfig::new()
///     .with_underflow(UnderflowPolicy::Fatal)
///     .with_junk(0xAA, 0xDD);
/// assert_eq!(config.alloc_junk, 0xAA);
/// assert_eq!(config.free_junk, 0xDD);
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AllocatorConfig {
    pub underflow: UnderflowPolicy,
    pub alloc_junk: u8,
    pub free_junk: u8,
}

impl AllocatorConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            underflow: UnderflowPolicy::from_features(),
            alloc_junk: ALLOC_JUNK,
            free_junk: FREE_JUNK,
        }
    }

    #[must_use]
    pub const fn with_underflow(mut self, underflow: UnderflowPolicy) -> Self {
        self.underflow = underflow;
        self
    }

    /// Override the fill bytes. They should differ so that a dump of a frame
    /// tells a never-initialized allocation apart from a dangling access.
    #[must_use]
    pub const fn with_junk(mut self, alloc_junk: u8, free_junk: u8) -> Self {
        self.alloc_junk = alloc_junk;
        self.free_junk = free_junk;
        self
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
