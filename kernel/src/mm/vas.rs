//! Per-process address spaces.
//!
//! One Sv39 root page table per address space, identified by an "asid"
//! that is just the owning process's pid (pid 0 / the primary space is the
//! boot address space, always resident, never reclaimed). Every non-primary
//! space shares the primary's three low gigapage slots — the kernel image,
//! the PLIC/VirtIO/UART MMIO windows, and all of RAM live in the low 3 GiB,
//! identity-mapped, so the kernel's own code and data stay reachable no
//! matter which process's space is active.

use core::arch::asm;

use spin::Mutex;

use super::page_table::{walk, PageFlags, PageTable, PageTableEntry};
use super::{frame_allocator, PhysicalAddress, VirtualAddress};
use crate::config::{MAX_PROCESSES, PAGE_SIZE, USER_END, USER_START};
use crate::error::{KernelError, KernelResult};

/// Indices 0..3 cover physical (== virtual, identity-mapped) addresses
/// 0..0xC000_0000: low MMIO, the PLIC, and all of QEMU `virt`'s RAM.
const KERNEL_GIGAPAGE_SLOTS: usize = 3;

pub const PRIMARY_ASID: usize = 0;

struct AddressSpace {
    root: PhysicalAddress,
}

struct Spaces {
    table: [Option<AddressSpace>; MAX_PROCESSES],
    current: usize,
}

static SPACES: Mutex<Spaces> = Mutex::new(Spaces {
    table: [const { None }; MAX_PROCESSES],
    current: PRIMARY_ASID,
});

fn root_table<'a>(root: PhysicalAddress) -> &'a mut PageTable {
    // SAFETY: every stored root was allocated by `frame_allocator::alloc`
    // and initialized as a `PageTable` before being published here.
    unsafe { &mut *(root.as_u64() as usize as *mut PageTable) }
}

fn flush_tlb() {
    // SAFETY: `sfence.vma` has no side effect beyond invalidating cached
    // translations; always valid to issue.
    unsafe { asm!("sfence.vma") };
}

fn activate(root: PhysicalAddress, asid: usize) {
    let ppn = root.as_u64() >> 12;
    let satp = (8u64 << 60) | ((asid as u64) << 44) | ppn; // mode 8 = Sv39
    // SAFETY: `root` names a fully formed Sv39 root table containing at
    // least the shared kernel gigapage slots, so every virtual address the
    // kernel itself uses remains mapped after the switch.
    unsafe { asm!("csrw satp, {0}", in(reg) satp) };
    flush_tlb();
}

/// Identity-maps the low 3 GiB and installs the primary space, then
/// activates it. Called once, early in `mm::init`.
pub(super) fn init() -> KernelResult<()> {
    let root_frame = frame_allocator::alloc()?;
    let root = root_table(root_frame);
    *root = PageTable::empty();
    for slot in 0..KERNEL_GIGAPAGE_SLOTS {
        let phys = PhysicalAddress::new((slot as u64) << 30);
        root[slot].set(
            phys,
            PageFlags::READ | PageFlags::WRITE | PageFlags::EXEC | PageFlags::GLOBAL,
        );
    }
    SPACES.lock().table[PRIMARY_ASID] = Some(AddressSpace { root: root_frame });
    activate(root_frame, PRIMARY_ASID);
    log::info!("mm: primary address space active, identity-mapping low 3 GiB");
    Ok(())
}

fn require_user_range(va: VirtualAddress, size: usize) -> KernelResult<()> {
    let start = va.as_u64() as usize;
    let end = start.checked_add(size).ok_or(KernelError::InvalidAddress { addr: start })?;
    if start < USER_START || end > USER_END || !va.is_page_aligned() {
        return Err(KernelError::InvalidAddress { addr: start });
    }
    Ok(())
}

/// Allocates a fresh root table for `asid`, sharing the primary space's
/// kernel gigapage slots, and installs it (but does not activate it).
pub fn space_create(asid: usize) -> KernelResult<usize> {
    let root_frame = frame_allocator::alloc()?;
    let root = root_table(root_frame);
    *root = PageTable::empty();
    let primary = SPACES.lock().table[PRIMARY_ASID]
        .as_ref()
        .map(|s| s.root)
        .ok_or(KernelError::NotInitialized { subsystem: "mm" })?;
    let primary_root = root_table(primary);
    for slot in 0..KERNEL_GIGAPAGE_SLOTS {
        root[slot] = primary_root[slot];
    }
    let mut spaces = SPACES.lock();
    if asid >= MAX_PROCESSES || spaces.table[asid].is_some() {
        return Err(KernelError::TableFull { table: "address space" });
    }
    spaces.table[asid] = Some(AddressSpace { root: root_frame });
    Ok(asid)
}

fn current_root(spaces: &Spaces) -> PhysicalAddress {
    spaces.table[spaces.current]
        .as_ref()
        .expect("current address space always resident")
        .root
}

/// Frees every user-mapped frame and level-0/level-1 table reachable from
/// `root`'s user half, leaving the gigapage slots (and the root itself)
/// intact for the caller to dispose of as it sees fit.
fn free_user_mappings(root: &mut PageTable) {
    for l2 in KERNEL_GIGAPAGE_SLOTS..512 {
        let entry = &mut root[l2];
        if !entry.is_valid() || entry.is_leaf() {
            continue;
        }
        let l1_table = root_table(entry.phys_addr());
        for l1 in 0..512 {
            let l1_entry = &mut l1_table[l1];
            if !l1_entry.is_valid() {
                continue;
            }
            let l0_table = root_table(l1_entry.phys_addr());
            for l0 in 0..512 {
                let l0_entry = &mut l0_table[l0];
                if l0_entry.is_valid() && l0_entry.flags().contains(PageFlags::USER) {
                    // SAFETY: every user leaf was allocated by this module
                    // and is unmapped exactly once, here.
                    unsafe { frame_allocator::free(l0_entry.phys_addr()) };
                    l0_entry.clear();
                }
            }
            // SAFETY: the level-0 table was allocated by `walk` and is
            // being retired along with every mapping it held.
            unsafe { frame_allocator::free(l1_entry.phys_addr()) };
            l1_entry.clear();
        }
        // SAFETY: same reasoning for the level-1 table.
        unsafe { frame_allocator::free(entry.phys_addr()) };
        entry.clear();
    }
}

/// Frees every user mapping and table in the current space but leaves its
/// root installed. Used before `exec` re-populates the space from scratch.
pub fn unmap_and_free_user() -> KernelResult<()> {
    let root_frame = current_root(&SPACES.lock());
    free_user_mappings(root_table(root_frame));
    flush_tlb();
    Ok(())
}

/// If the current space is non-primary, tears it down entirely and
/// switches back to the primary space.
pub fn space_reclaim() -> KernelResult<()> {
    let mut spaces = SPACES.lock();
    let asid = spaces.current;
    if asid == PRIMARY_ASID {
        return Ok(());
    }
    let root_frame = current_root(&spaces);
    free_user_mappings(root_table(root_frame));
    // SAFETY: every user frame and intermediate table has just been freed;
    // only the root itself remains live.
    unsafe { frame_allocator::free(root_frame) };
    spaces.table[asid] = None;
    spaces.current = PRIMARY_ASID;
    let primary_root = current_root(&spaces);
    drop(spaces);
    activate(primary_root, PRIMARY_ASID);
    Ok(())
}

/// Maps a single page at `vma` in the current address space.
pub fn alloc_and_map_page(vma: VirtualAddress, flags: PageFlags) -> KernelResult<()> {
    require_user_range(vma, PAGE_SIZE)?;
    let root_frame = current_root(&SPACES.lock());
    let root = root_table(root_frame);
    let entry = walk(root, vma, true)?;
    if entry.is_valid() {
        panic!("double map at {:#x}", vma.as_u64());
    }
    let frame = frame_allocator::alloc()?;
    entry.set(frame, flags | PageFlags::ACCESSED | PageFlags::DIRTY);
    flush_tlb();
    Ok(())
}

/// Maps every page covering `[vma, vma + size)`, rounding `size` up to a
/// page multiple.
pub fn alloc_and_map_range(vma: VirtualAddress, size: usize, flags: PageFlags) -> KernelResult<()> {
    let pages = size.div_ceil(PAGE_SIZE);
    for i in 0..pages {
        alloc_and_map_page(vma.add(i * PAGE_SIZE), flags)?;
    }
    Ok(())
}

/// Rewrites the permission bits of every already-mapped page covering
/// `[vma, vma + size)`. Never creates new mappings.
pub fn set_range_flags(vma: VirtualAddress, size: usize, flags: PageFlags) -> KernelResult<()> {
    require_user_range(vma, size)?;
    let pages = size.div_ceil(PAGE_SIZE);
    let root_frame = current_root(&SPACES.lock());
    let root = root_table(root_frame);
    for i in 0..pages {
        let entry = walk(root, vma.add(i * PAGE_SIZE), false)?;
        if !entry.is_valid() {
            return Err(KernelError::InvalidAddress { addr: vma.as_u64() as usize });
        }
        entry.set_flags(flags | PageFlags::ACCESSED | PageFlags::DIRTY);
    }
    flush_tlb();
    Ok(())
}

/// Demand-faults a single page: the mechanism behind lazily materialized
/// user stacks and a freshly `exec`'d entry page. Panics on any fault
/// outside the user range or on a page that is already mapped (a genuine
/// double fault, not demand paging).
pub fn handle_page_fault(vaddr: usize) {
    if vaddr < USER_START || vaddr >= USER_END {
        panic!("page fault outside user range: {:#x}", vaddr);
    }
    let va = VirtualAddress::new(vaddr as u64).page_round_down();
    let root_frame = current_root(&SPACES.lock());
    let root = root_table(root_frame);
    let entry = walk(root, va, true).expect("walk with create never fails except OOM");
    if entry.is_valid() {
        panic!("page fault on already-mapped page {:#x}", va.as_u64());
    }
    let frame = frame_allocator::alloc().expect("out of memory handling page fault");
    zero_frame(frame);
    entry.set(
        frame,
        PageFlags::READ | PageFlags::WRITE | PageFlags::USER | PageFlags::ACCESSED | PageFlags::DIRTY,
    );
    flush_tlb();
}

fn zero_frame(frame: PhysicalAddress) {
    // SAFETY: `frame` was just allocated and is not yet reachable from any
    // page table, so a raw write cannot race anything.
    unsafe {
        core::ptr::write_bytes(frame.as_u64() as usize as *mut u8, 0, PAGE_SIZE);
    }
}

fn copy_leaf(entry: &PageTableEntry, dst_root: &mut PageTable, va: usize) -> KernelResult<()> {
    let src_frame = entry.phys_addr();
    let dst_frame = frame_allocator::alloc()?;
    // SAFETY: `src_frame` is a live user page in the space being cloned;
    // `dst_frame` was just allocated and is not yet visible to anyone.
    unsafe {
        core::ptr::copy_nonoverlapping(
            src_frame.as_u64() as usize as *const u8,
            dst_frame.as_u64() as usize as *mut u8,
            PAGE_SIZE,
        );
    }
    let dst_entry = walk(dst_root, VirtualAddress::new(va as u64), true)?;
    dst_entry.set(dst_frame, entry.flags());
    Ok(())
}

/// Creates a new address space and deep-copies every user mapping from the
/// current space into it, preserving permission bits. Kernel gigapages are
/// shared, not copied. This is the `fork` primitive.
pub fn space_clone(asid: usize) -> KernelResult<usize> {
    space_create(asid)?;
    let (src_root_frame, dst_root_frame) = {
        let spaces = SPACES.lock();
        let src = current_root(&spaces);
        let dst = spaces.table[asid].as_ref().expect("just created").root;
        (src, dst)
    };
    let src_root = root_table(src_root_frame);
    let dst_root = root_table(dst_root_frame);
    for l2 in KERNEL_GIGAPAGE_SLOTS..512 {
        if !src_root[l2].is_valid() {
            continue;
        }
        let l1_table = root_table(src_root[l2].phys_addr());
        for l1 in 0..512 {
            if !l1_table[l1].is_valid() {
                continue;
            }
            let l0_table = root_table(l1_table[l1].phys_addr());
            for l0 in 0..512 {
                let entry = &l0_table[l0];
                if !entry.is_valid() || !entry.flags().contains(PageFlags::USER) {
                    continue;
                }
                let va = (l2 << 30) | (l1 << 21) | (l0 << 12);
                copy_leaf(entry, dst_root, va)?;
            }
        }
    }
    Ok(asid)
}

/// Switches the hardware address space to `asid`. Called by the scheduler
/// on every context switch.
pub fn switch_to(asid: usize) {
    let mut spaces = SPACES.lock();
    if spaces.current == asid {
        return;
    }
    spaces.current = asid;
    let root = current_root(&spaces);
    drop(spaces);
    activate(root, asid);
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn require_user_range_rejects_misaligned() {
        assert!(require_user_range(VirtualAddress::new(USER_START as u64 + 1), PAGE_SIZE).is_err());
    }

    #[test]
    fn require_user_range_rejects_out_of_bounds() {
        assert!(require_user_range(VirtualAddress::new(USER_END as u64), PAGE_SIZE).is_err());
    }
}
