//! # Intrusive free list
//!
//! The only module that reinterprets frame storage. A free frame carries its
//! own list link:
//!
//! ```text
//! +----------------------+----------------------------------------+
//! | FreeFrame (next: u64)|       junk fill (rest of the frame)     |
//! +----------------------+----------------------------------------+
//! ^ frame base           ^ frame base + 8
//! ```
//!
//! `next` holds the physical address of the next free frame, or [`NIL`] at the
//! end of the list. The only side table is one membership bit per managed
//! frame.
//!
//! # Aliasing contract
//! While a frame is on the list, the list owns its first eight bytes; no one
//! else may read or write the frame. The instant [`FreeList::pop`] returns a
//! frame, the list no longer touches it.

use crate::phys_mapper::PhysMapper;
use crate::range::ManagedRange;
use alloc::boxed::Box;
use alloc::vec;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// Terminates the list. Never page aligned, so never a frame address.
const NIL: u64 = u64::MAX;

/// Header stored at the beginning of every **free** frame.
#[repr(C)]
struct FreeFrame {
    /// Physical address of the next free frame (or [`NIL`]).
    next: u64,
}

/// LIFO stack of free frames, linked through the frames themselves.
///
/// Alongside the links, one bit per managed frame records whether it is on
/// the list, so a frame released twice is caught before anything is written.
///
/// # Invariants
/// - Every frame reachable from `head` is page aligned, managed, and was
///   linked by [`push`](Self::push) through the same mapper.
/// - `len` equals the number of frames reachable from `head`, and the number
///   of bits set in `listed`.
pub(crate) struct FreeList {
    range: ManagedRange,
    head: u64,
    len: usize,
    listed: Box<[u64]>,
}

impl FreeList {
    /// An empty list for the frames of `range`.
    pub(crate) fn new(range: ManagedRange) -> Self {
        Self {
            range,
            head: NIL,
            len: 0,
            listed: vec![0; range.frame_count().div_ceil(64)].into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// Whether `pa` is currently on the list. Unmanaged addresses never are.
    pub(crate) fn contains(&self, pa: PhysicalAddress) -> bool {
        self.range
            .index_of(pa)
            .is_ok_and(|index| self.listed[index / 64] & Self::bit(index) != 0)
    }

    /// Link `pa` in as the new head.
    ///
    /// # Safety
    /// - `pa` must be a managed frame, reachable writable through `mapper`.
    /// - `pa` must not already be on the list (see [`contains`](Self::contains)).
    /// - Nobody else may access the frame until it is popped again.
    pub(crate) unsafe fn push<M: PhysMapper>(&mut self, mapper: &M, pa: PhysicalAddress) {
        debug_assert!(!self.contains(pa));
        let index = self.slot(pa);
        let node: &mut FreeFrame = unsafe { mapper.phys_to_mut(pa) };
        node.next = self.head;
        self.head = pa.as_u64();
        self.listed[index / 64] |= Self::bit(index);
        self.len += 1;
    }

    /// Unlink and return the head, if any.
    ///
    /// # Safety
    /// `mapper` must be the mapper every frame on the list was pushed with.
    pub(crate) unsafe fn pop<M: PhysMapper>(&mut self, mapper: &M) -> Option<PhysicalAddress> {
        if self.is_empty() {
            return None;
        }
        let pa = PhysicalAddress::new(self.head);
        let index = self.slot(pa);
        let node: &mut FreeFrame = unsafe { mapper.phys_to_mut(pa) };
        self.head = node.next;
        self.listed[index / 64] &= !Self::bit(index);
        self.len -= 1;
        Some(pa)
    }

    /// Dense index of a frame already known to be managed.
    #[allow(clippy::cast_possible_truncation)]
    const fn slot(&self, pa: PhysicalAddress) -> usize {
        ((pa.as_u64() - self.range.start().as_u64()) >> Size4K::SHIFT) as usize
    }

    const fn bit(index: usize) -> u64 {
        1 << (index % 64)
    }
}
