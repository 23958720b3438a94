//! Split virtqueue with one reusable indirect descriptor table.
//!
//! A virtqueue is three physically contiguous regions — descriptor table,
//! available ring, used ring — plus, here, a separate indirect table used
//! by every request. The block driver only ever has one transaction in
//! flight, so the top-level descriptor table holds a single entry, and
//! that entry always points at the same three-descriptor indirect chain
//! (header, data, status) rather than a freshly allocated one per request.

use core::sync::atomic::{self, Ordering};

use crate::config::PAGE_SIZE;
use crate::error::KernelResult;
use crate::mm::{frame_allocator, PhysicalAddress};
use crate::raii::FrameGuard;

pub const VIRTQ_DESC_F_NEXT: u16 = 1;
pub const VIRTQ_DESC_F_WRITE: u16 = 2;
pub const VIRTQ_DESC_F_INDIRECT: u16 = 4;

/// Entries in the indirect table: header, data, status.
pub const INDIRECT_LEN: usize = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtqDesc {
    pub addr: u64,
    pub len: u32,
    pub flags: u16,
    pub next: u16,
}

#[repr(C)]
struct VirtqAvail {
    flags: u16,
    idx: u16,
    ring: [u16; 1],
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct VirtqUsedElem {
    id: u32,
    len: u32,
}

#[repr(C)]
struct VirtqUsed {
    flags: u16,
    idx: u16,
    ring: [VirtqUsedElem; 1],
}

/// A one-deep virtqueue: exactly one descriptor chain ever in flight.
pub struct VirtQueue {
    frame: PhysicalAddress,
    indirect_frame: PhysicalAddress,
    desc: *mut VirtqDesc,
    avail: *mut VirtqAvail,
    used: *mut VirtqUsed,
    indirect: *mut VirtqDesc,
    last_used_idx: u16,
}

const AVAIL_OFFSET: usize = 16; // one VirtqDesc
const USED_OFFSET: usize = AVAIL_OFFSET + 8; // flags+idx+ring[1]

impl VirtQueue {
    /// Allocates one frame for {desc[1], avail, used} and a second for the
    /// three-entry indirect table, zeroing both.
    pub fn new() -> KernelResult<Self> {
        // Guards so a failure allocating the second frame frees the first
        // instead of leaking it; `leak()` hands ownership to `Self` once
        // both frames are secured.
        let frame_guard = FrameGuard::new(frame_allocator::alloc()?);
        let indirect_guard = FrameGuard::new(frame_allocator::alloc()?);

        let base = frame_guard.addr().as_u64() as usize;
        let ibase = indirect_guard.addr().as_u64() as usize;
        // SAFETY: both frames were just allocated and are identity-mapped;
        // nothing else references them yet.
        unsafe {
            core::ptr::write_bytes(base as *mut u8, 0, PAGE_SIZE);
            core::ptr::write_bytes(ibase as *mut u8, 0, PAGE_SIZE);
        }

        let desc = base as *mut VirtqDesc;
        let avail = (base + AVAIL_OFFSET) as *mut VirtqAvail;
        let used = (base + USED_OFFSET) as *mut VirtqUsed;
        let indirect = ibase as *mut VirtqDesc;

        // Link the indirect chain once: header -> data -> status.
        // SAFETY: indirect points at INDIRECT_LEN zeroed, owned descriptors.
        unsafe {
            (*indirect.add(0)).flags = VIRTQ_DESC_F_NEXT;
            (*indirect.add(0)).next = 1;
            (*indirect.add(1)).flags = VIRTQ_DESC_F_NEXT;
            (*indirect.add(1)).next = 2;
            (*indirect.add(2)).flags = 0;
        }

        Ok(Self {
            frame: frame_guard.leak(),
            indirect_frame: indirect_guard.leak(),
            desc,
            avail,
            used,
            indirect,
            last_used_idx: 0,
        })
    }

    pub fn phys_desc(&self) -> u64 {
        self.frame.as_u64()
    }

    pub fn phys_avail(&self) -> u64 {
        self.frame.as_u64() + AVAIL_OFFSET as u64
    }

    pub fn phys_used(&self) -> u64 {
        self.frame.as_u64() + USED_OFFSET as u64
    }

    /// Fills in the reusable indirect chain's three descriptors and pushes
    /// the single top-level descriptor (pointing at that chain) onto the
    /// available ring.
    pub fn submit(
        &mut self,
        header_phys: u64,
        header_len: u32,
        data_phys: u64,
        data_len: u32,
        data_write: bool,
        status_phys: u64,
    ) {
        // SAFETY: self.indirect owns INDIRECT_LEN descriptors; offsets 0..3
        // are in bounds.
        unsafe {
            let h = &mut *self.indirect.add(0);
            h.addr = header_phys;
            h.len = header_len;

            let d = &mut *self.indirect.add(1);
            d.addr = data_phys;
            d.len = data_len;
            d.flags = VIRTQ_DESC_F_NEXT | if data_write { VIRTQ_DESC_F_WRITE } else { 0 };

            let s = &mut *self.indirect.add(2);
            s.addr = status_phys;
            s.len = 1;
            s.flags = VIRTQ_DESC_F_WRITE;
        }

        // SAFETY: self.desc owns one descriptor (index 0).
        unsafe {
            let top = &mut *self.desc;
            top.addr = self.indirect_frame.as_u64();
            top.len = (INDIRECT_LEN * core::mem::size_of::<VirtqDesc>()) as u32;
            top.flags = VIRTQ_DESC_F_INDIRECT;
            top.next = 0;
        }

        // SAFETY: self.avail points at valid, owned memory.
        unsafe {
            let avail = &mut *self.avail;
            avail.ring[0] = 0;
            atomic::fence(Ordering::Release);
            avail.idx = avail.idx.wrapping_add(1);
        }
    }

    /// Polls for the device having consumed the request. Returns the byte
    /// count the device reported writing into the chain.
    pub fn poll_used(&mut self) -> Option<u32> {
        atomic::fence(Ordering::Acquire);
        // SAFETY: self.used points at valid, owned memory.
        let idx = unsafe { (*self.used).idx };
        if idx == self.last_used_idx {
            return None;
        }
        // SAFETY: ring has exactly one slot; index 0 is always in bounds.
        let len = unsafe { (*self.used).ring[0].len };
        self.last_used_idx = self.last_used_idx.wrapping_add(1);
        Some(len)
    }
}

// SAFETY: the queue's raw pointers reference frames this struct owns
// exclusively; callers serialize access with a sleep lock.
unsafe impl Send for VirtQueue {}
unsafe impl Sync for VirtQueue {}

impl Drop for VirtQueue {
    fn drop(&mut self) {
        // SAFETY: both frames were allocated by `new` and nothing else
        // references them once the queue is torn down.
        unsafe {
            frame_allocator::free(self.frame);
            frame_allocator::free(self.indirect_frame);
        }
    }
}
