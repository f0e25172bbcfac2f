//! # Physical frame allocator
//!
//! Hands out and reclaims whole 4 KiB frames, gated by the page reference
//! counts: a frame that still has live mappings never goes back on the free
//! list and is never overwritten.
//!
//! Two independent locks are involved. `free_page` reads the reference count
//! (taking and releasing the `"pg_ref"` lock) and only then takes the
//! `"kmem"` free-list lock; the two are never held at the same time.

use crate::config::AllocatorConfig;
use crate::fatal::{Operation, fatal};
use crate::free_list::FreeList;
use crate::phys_mapper::PhysMapper;
use crate::range::ManagedRange;
use crate::ref_count::{RefCount, RefCountTable};
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};
use kernel_sync::SpinLock;
use log::{debug, info, trace};

/// Size of one managed frame in bytes.
#[allow(clippy::cast_possible_truncation)]
pub const FRAME_SIZE: usize = Size4K::SIZE as usize;

/// Snapshot of the allocator's occupancy.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct FrameStats {
    /// Frames in the managed range.
    pub total: usize,
    /// Frames currently on the free list.
    pub free: usize,
    /// Frames with a reference count above zero.
    pub shared: usize,
}

impl FrameStats {
    /// Frames not on the free list.
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.total - self.free
    }
}

/// A frame was released while it was already on the free list.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("frame {0} is already free")]
pub struct AlreadyFree(pub PhysicalAddress);

/// Free-list page allocator coupled to per-frame reference counts.
///
/// Built once at boot and shared with every collaborator that needs frames
/// (page-table builders, address-space management, pipe buffers), typically
/// behind an `Arc` or a `&'static`.
///
/// ```rust
/// use kernel_alloc::{AllocatorConfig, FrameAllocator, ManagedRange, OffsetPhysMapper};
/// use kernel_memory_addresses::PhysicalAddress;
///
/// #[repr(C, align(4096))]
/// struct Ram([u8; 2 * 4096]);
///
/// let mut ram = Box::new(Ram([0; 2 * 4096]));
/// let base = PhysicalAddress::new(0x8000_0000);
/// let range = ManagedRange::new(base, base + 2 * 4096);
/// let mapper = OffsetPhysMapper::for_region(base, ram.0.as_mut_ptr());
///
/// // SAFETY: `ram` backs the whole range and outlives the allocator.
/// let frames = unsafe { FrameAllocator::new(range, mapper, AllocatorConfig::default()) };
/// frames.init();
///
/// let a = frames.allocate_page().unwrap();
/// assert_eq!(a, base);
/// frames.free_page(a);
/// assert_eq!(frames.allocate_page(), Some(a));
/// ```
pub struct FrameAllocator<M: PhysMapper> {
    range: ManagedRange,
    mapper: M,
    config: AllocatorConfig,
    free: SpinLock<FreeList>,
    refs: RefCountTable,
    initialized: AtomicBool,
}

impl<M: PhysMapper> FrameAllocator<M> {
    /// Create an allocator for `range` with an empty free list.
    ///
    /// Call [`init`](Self::init) before the first allocation.
    ///
    /// # Safety
    /// - Every frame of `range` must be RAM, reachable writable through
    ///   `mapper` for the whole lifetime of the allocator.
    /// - Nothing but this allocator (and the callers it hands frames to) may
    ///   use those frames.
    pub unsafe fn new(range: ManagedRange, mapper: M, config: AllocatorConfig) -> Self {
        Self {
            range,
            mapper,
            config,
            free: SpinLock::new("kmem", FreeList::new(range)),
            refs: RefCountTable::new(range, config.underflow),
            initialized: AtomicBool::new(false),
        }
    }

    /// Seed the free list with every managed frame.
    ///
    /// Frames are released from the top of the range down, so the first
    /// allocations return ascending addresses starting at the range start.
    ///
    /// # Panics
    /// When called a second time.
    #[track_caller]
    pub fn init(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            fatal(Operation::Init, "frame allocator already initialized");
        }

        info!(
            "frame allocator: managing {} ({} KiB), underflow policy {}",
            self.range,
            self.range.frame_count() * FRAME_SIZE / 1024,
            self.config.underflow
        );

        for pa in self.range.frames().rev() {
            self.release_frame(Operation::Init, pa);
        }

        debug!("frame allocator: {} frames free", self.free.with_lock(|l| l.len()));
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Release every whole frame in `[start, end)`, in ascending order.
    ///
    /// `start` is rounded up to a frame boundary; a trailing partial frame is
    /// skipped. The whole span is checked before the first frame is released.
    ///
    /// # Panics
    /// The span reaches outside the managed range, or one of its frames is
    /// already free. Nothing is released in either case.
    #[track_caller]
    pub fn free_range(&self, start: PhysicalAddress, end: PhysicalAddress) {
        let Some(first) = start.align_up::<Size4K>() else {
            return;
        };
        let stop = end.align_down::<Size4K>();
        if stop <= first {
            return;
        }
        let last = PhysicalAddress::new(stop.as_u64() - Size4K::SIZE);

        let span = match (self.range.index_of(first), self.range.index_of(last)) {
            (Ok(lo), Ok(hi)) => lo..=hi,
            (Err(e), _) | (_, Err(e)) => fatal(Operation::FreeRange, e),
        };
        let listed = self.free.with_lock(|list| {
            span.clone()
                .filter_map(|i| self.range.frame_at(i))
                .find(|&pa| list.contains(pa))
        });
        if let Some(pa) = listed {
            fatal(Operation::FreeRange, AlreadyFree(pa));
        }

        for pa in span.filter_map(|i| self.range.frame_at(i)) {
            self.release_frame(Operation::FreeRange, pa);
        }
    }

    /// Take one frame off the free list.
    ///
    /// The frame is filled with the allocation junk byte before it is
    /// returned. `None` means the free list is empty; that is not an error.
    #[must_use]
    pub fn allocate_page(&self) -> Option<PhysicalAddress> {
        // SAFETY: every listed frame was pushed by `release_frame` through `self.mapper`.
        let popped = self.free.with_lock(|list| unsafe { list.pop(&self.mapper) });
        let Some(pa) = popped else {
            debug!("allocate_page: out of frames");
            return None;
        };

        // SAFETY: the frame left the list above and is not visible to anyone else yet.
        unsafe { self.fill(pa, self.config.alloc_junk) };
        trace!("allocate_page -> {pa}");
        Some(pa)
    }

    /// Give a frame back.
    ///
    /// If the frame still has live mappings (reference count above zero) this
    /// does nothing; the last owner to drop its mapping frees it. Otherwise
    /// the frame is filled with the release junk byte and pushed onto the
    /// free list.
    ///
    /// The caller must not touch the frame after this returns.
    ///
    /// # Panics
    /// `pa` is unaligned, outside the managed range, or already free; nothing
    /// is modified.
    #[track_caller]
    pub fn free_page(&self, pa: PhysicalAddress) {
        self.release_frame(Operation::FreePage, pa);
    }

    /// Record a new mapping of `pa`; returns the count before the increment.
    ///
    /// # Panics
    /// See [`RefCountTable::increment`].
    #[track_caller]
    pub fn increment_ref(&self, pa: PhysicalAddress) -> RefCount {
        self.refs.increment(pa)
    }

    /// Drop a mapping of `pa`; returns the remaining count (never negative).
    ///
    /// # Panics
    /// See [`RefCountTable::decrement`].
    #[track_caller]
    pub fn decrement_ref(&self, pa: PhysicalAddress) -> RefCount {
        self.refs.decrement(pa)
    }

    /// Current number of live mappings of `pa`.
    ///
    /// # Panics
    /// See [`RefCountTable::read`].
    #[track_caller]
    pub fn read_ref(&self, pa: PhysicalAddress) -> RefCount {
        self.refs.read(pa)
    }

    /// Tear down one mapping of `pa`: [`decrement_ref`](Self::decrement_ref)
    /// followed by [`free_page`](Self::free_page). Returns the remaining count.
    ///
    /// The frame goes back on the free list only when this call took the
    /// count from one to zero. A clamped decrement of a zero count releases
    /// nothing, so concurrent or repeated teardowns free a frame at most once.
    ///
    /// # Panics
    /// `pa` is not a managed frame, or its count is zero under
    /// [`UnderflowPolicy::Fatal`](crate::UnderflowPolicy::Fatal).
    #[track_caller]
    pub fn release_mapping(&self, pa: PhysicalAddress) -> RefCount {
        let decrement = self
            .refs
            .checked_decrement(pa)
            .unwrap_or_else(|e| fatal(Operation::ReleaseMapping, e));
        if decrement.released_last() {
            self.release_frame(Operation::ReleaseMapping, pa);
        }
        decrement.remaining
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        FrameStats {
            total: self.range.frame_count(),
            free: self.free.with_lock(|list| list.len()),
            shared: self.refs.shared_frames(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn range(&self) -> &ManagedRange {
        &self.range
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub const fn ref_counts(&self) -> &RefCountTable {
        &self.refs
    }

    #[track_caller]
    fn release_frame(&self, op: Operation, pa: PhysicalAddress) {
        let count = self
            .refs
            .checked_read(pa)
            .unwrap_or_else(|e| fatal(op, e));
        if count > 0 {
            trace!("{op} {pa}: still mapped {count} time(s), kept");
            return;
        }

        // The fill happens under the lock, so a listed frame is never written
        // by a racing second release.
        let released = self.free.with_lock(|list| {
            if list.contains(pa) {
                return false;
            }
            // SAFETY: `pa` is managed, unreferenced and not listed; the caller relinquished it.
            unsafe {
                self.fill(pa, self.config.free_junk);
                list.push(&self.mapper, pa);
            }
            true
        });
        if !released {
            fatal(op, AlreadyFree(pa));
        }
        trace!("{op} {pa}: released");
    }

    /// Overwrite the whole frame with `junk`.
    ///
    /// # Safety
    /// `pa` must be a managed frame the calling context exclusively owns.
    unsafe fn fill(&self, pa: PhysicalAddress, junk: u8) {
        let frame: &mut [u8; FRAME_SIZE] = unsafe { self.mapper.phys_to_mut(pa) };
        frame.fill(junk);
    }
}

impl<M: PhysMapper> fmt::Debug for FrameAllocator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameAllocator")
            .field("range", &self.range)
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
