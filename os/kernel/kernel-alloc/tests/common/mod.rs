//! Host-side stand-in for physical RAM.
#![allow(dead_code)]

use kernel_alloc::{AllocatorConfig, FRAME_SIZE, FrameAllocator, ManagedRange, OffsetPhysMapper};
use kernel_memory_addresses::PhysicalAddress;
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::sync::Arc;

/// End of the pretend kernel image; deliberately not page aligned.
pub const KERNEL_END: u64 = 0x8002_1234;

/// First managed frame for [`KERNEL_END`].
pub const FIRST_FRAME: u64 = 0x8002_2000;

pub type Frames = FrameAllocator<OffsetPhysMapper>;

/// Page-aligned heap block that plays the role of the managed physical range.
struct Arena {
    ptr: *mut u8,
    layout: Layout,
}

impl Arena {
    fn new(frames: usize) -> Self {
        let layout = Layout::from_size_align(frames.max(1) * FRAME_SIZE, FRAME_SIZE).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "arena allocation failed");
        Self { ptr, layout }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) }
    }
}

/// A frame allocator backed by an arena. The allocator is declared first so
/// it is dropped before the memory it points into.
pub struct Machine {
    pub frames: Arc<Frames>,
    range: ManagedRange,
    arena: Arena,
}

impl Machine {
    /// `frames` managed frames, not yet initialized.
    pub fn new(frames: usize) -> Self {
        Self::with_config(frames, AllocatorConfig::default())
    }

    pub fn with_config(frames: usize, config: AllocatorConfig) -> Self {
        // The top of memory sits in the middle of a page to exercise rounding.
        let top = FIRST_FRAME + (frames * FRAME_SIZE) as u64 + 0x321;
        let range = ManagedRange::new(PhysicalAddress::new(KERNEL_END), PhysicalAddress::new(top));
        assert_eq!(range.frame_count(), frames);

        let arena = Arena::new(frames);
        let mapper = OffsetPhysMapper::for_region(range.start(), arena.ptr);
        // SAFETY: the arena covers every managed frame and outlives the allocator
        // (tests join all threads holding clones before the machine drops).
        let frames = unsafe { FrameAllocator::new(range, mapper, config) };
        Self {
            frames: Arc::new(frames),
            range,
            arena,
        }
    }

    /// `frames` managed frames with the free list seeded.
    pub fn booted(frames: usize) -> Self {
        let machine = Self::new(frames);
        machine.frames.init();
        machine
    }

    pub fn booted_with(frames: usize, config: AllocatorConfig) -> Self {
        let machine = Self::with_config(frames, config);
        machine.frames.init();
        machine
    }

    pub const fn range(&self) -> ManagedRange {
        self.range
    }

    /// Base of the `i`-th managed frame.
    pub fn frame(&self, i: usize) -> PhysicalAddress {
        self.range.frame_at(i).expect("frame index in range")
    }

    /// The bytes of a managed frame.
    ///
    /// Only call this while no other thread writes to the frame.
    pub fn bytes(&self, pa: PhysicalAddress) -> &[u8] {
        let index = self.range.index_of(pa).expect("managed frame");
        unsafe { std::slice::from_raw_parts(self.arena.ptr.add(index * FRAME_SIZE), FRAME_SIZE) }
    }

    /// Write `byte` over a frame the test owns.
    pub fn scribble(&self, pa: PhysicalAddress, byte: u8) {
        let index = self.range.index_of(pa).expect("managed frame");
        unsafe { std::ptr::write_bytes(self.arena.ptr.add(index * FRAME_SIZE), byte, FRAME_SIZE) }
    }

    /// Allocate until the free list runs dry.
    pub fn drain(&self) -> Vec<PhysicalAddress> {
        std::iter::from_fn(|| self.frames.allocate_page()).collect()
    }
}
