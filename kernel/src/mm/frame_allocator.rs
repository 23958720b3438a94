//! Physical frame allocator.
//!
//! An intrusive LIFO free list: each free frame's first word stores the
//! physical address of the next free frame, so the list costs no memory
//! beyond the frames themselves. `alloc` pops the head, `free` pushes onto
//! it — both O(1).

use spin::Mutex;

use super::PhysicalAddress;
use crate::config::{PAGE_SIZE, RAM_BASE, RAM_SIZE};
use crate::error::{KernelError, KernelResult};

struct FreeList {
    head: Option<usize>,
    free_count: usize,
}

static FREE_LIST: Mutex<FreeList> = Mutex::new(FreeList {
    head: None,
    free_count: 0,
});

/// Builds the free list out of every page-aligned frame between
/// `kernel_end` and the top of RAM.
///
/// # Safety
/// `kernel_end` must be the first byte not used by the kernel image (and
/// its boot stack); every frame from there to the end of RAM must be
/// unused physical memory.
pub unsafe fn init(kernel_end: usize) {
    let start = align_up(kernel_end, PAGE_SIZE);
    let end = RAM_BASE + RAM_SIZE;
    let mut list = FREE_LIST.lock();
    let mut addr = start;
    while addr + PAGE_SIZE <= end {
        // SAFETY: `addr` is within the unused range the caller promised us,
        // and is page-aligned, so it is valid to store a `usize` there.
        unsafe { (addr as *mut usize).write(list.head.unwrap_or(usize::MAX)) };
        list.head = Some(addr);
        list.free_count += 1;
        addr += PAGE_SIZE;
    }
    log::info!(
        "frame allocator: {} frames free ({} MiB) starting at {:#x}",
        list.free_count,
        list.free_count * PAGE_SIZE / (1024 * 1024),
        start
    );
}

const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// Pops one free frame off the list.
pub fn alloc() -> KernelResult<PhysicalAddress> {
    let mut list = FREE_LIST.lock();
    let head = list.head.ok_or(KernelError::OutOfMemory)?;
    // SAFETY: `head` was pushed by `free` or `init`, both of which only
    // ever store the address of a page-aligned, allocator-owned frame.
    let next = unsafe { (head as *const usize).read() };
    list.head = if next == usize::MAX { None } else { Some(next) };
    list.free_count -= 1;
    Ok(PhysicalAddress::new(head as u64))
}

/// Returns a frame to the free list.
///
/// # Safety
/// `frame` must be page-aligned, within the managed RAM range, and not
/// currently referenced by any live mapping.
pub unsafe fn free(frame: PhysicalAddress) {
    let addr = frame.as_u64() as usize;
    let mut list = FREE_LIST.lock();
    // SAFETY: forwarded from the caller's contract.
    unsafe { (addr as *mut usize).write(list.head.unwrap_or(usize::MAX)) };
    list.head = Some(addr);
    list.free_count += 1;
}

pub fn free_count() -> usize {
    FREE_LIST.lock().free_count
}
