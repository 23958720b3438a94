//! Memory management: physical frame allocation, Sv39 page tables, and the
//! per-process address-space operations built on top of them.

pub mod frame_allocator;
pub mod heap;
pub mod page_fault;
pub mod page_table;
pub mod vas;

use crate::config::PAGE_SIZE;
use crate::error::KernelResult;

/// Physical memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(pub u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_page_aligned(&self) -> bool {
        self.0 as usize % PAGE_SIZE == 0
    }
}

/// Virtual memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(pub u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn add(&self, offset: usize) -> Self {
        Self(self.0 + offset as u64)
    }

    pub fn is_page_aligned(&self) -> bool {
        self.0 as usize % PAGE_SIZE == 0
    }

    pub fn page_round_down(&self) -> Self {
        Self(self.0 & !((PAGE_SIZE - 1) as u64))
    }
}

pub use page_table::PageFlags;

extern "C" {
    /// One past the last byte of the kernel image and its boot stack;
    /// defined in `link.ld`. Everything from here to the top of RAM is
    /// free physical memory.
    static _kernel_end: u8;
}

/// Brings up physical memory management: the frame allocator, the primary
/// Sv39 address space (identity-mapping the low 3 GiB that holds the
/// kernel image, MMIO windows, and all of RAM), and the kernel heap.
pub fn init() -> KernelResult<()> {
    let kernel_end = &raw const _kernel_end as usize;
    // SAFETY: `kernel_end` is the linker-provided end of the kernel image;
    // everything above it up to the top of RAM is unused physical memory.
    unsafe { frame_allocator::init(kernel_end) };

    vas::init()?;
    heap::init();

    log::info!("mm: {} frames free after heap init", frame_allocator::free_count());
    Ok(())
}
