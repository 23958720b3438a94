//! Compile-time geometry constants.
//!
//! Centralizes the "a fixed size" and "a dedicated register" details the
//! rest of the kernel would otherwise hardcode inline.

/// Page size in bytes (Sv39 base page).
pub const PAGE_SIZE: usize = 4096;
/// Bits of page offset.
pub const PAGE_SHIFT: usize = 12;

/// Maximum number of live threads, including the idle thread and the main
/// thread. Thread IDs are indices into a fixed-size table.
pub const MAX_THREADS: usize = 64;
/// Thread ID of the bootstrap thread (pid 0's only thread at boot).
pub const MAIN_TID: usize = 0;
/// Thread ID of the idle thread, permanently ready, never exits.
pub const IDLE_TID: usize = MAX_THREADS - 1;

/// Maximum number of live processes. Process IDs are indices into a
/// fixed-size table; pid 0 is the boot process.
pub const MAX_PROCESSES: usize = 32;

/// Per-process IO-descriptor table size.
pub const MAX_IO_DESCRIPTORS: usize = 16;

/// Kernel stack size per thread.
pub const KERNEL_STACK_SIZE: usize = 2 * PAGE_SIZE;

/// First byte of the user-accessible virtual address range (exclusive of
/// any kernel mapping). Low canonical Sv39 user space starts at 0, but the
/// kernel reserves page 0 so that a null pointer always faults.
pub const USER_START: usize = PAGE_SIZE;
/// One past the last byte of the user-accessible virtual address range.
/// Sv39 gives 39 bits of virtual address space per half; the kernel image
/// occupies the top half (canonical high addresses), so user space is
/// everything below this bound.
pub const USER_END: usize = 0x0000_0040_0000_0000; // 256 GiB, well under the Sv39 low half
/// Top of the user stack; the first page below this is mapped lazily on
/// first fault.
pub const USER_STACK_TOP: usize = USER_END;

/// Maximum number of dentries the filesystem's boot block can name.
pub const MAX_DENTRIES: usize = 64;
/// Bytes per filesystem/device block.
pub const BLOCK_SIZE: usize = 4096;
/// Datablock indices per inode (fills the remainder of one inode block
/// after the 4-byte length field: (4096 - 4) / 4).
pub const DATABLOCKS_PER_INODE: usize = 1023;
/// Length of a dentry's filename field, including any trailing NUL padding.
pub const FS_NAME_LEN: usize = 32;
/// Size of the kernel-wide open-file table (distinct from each process's
/// per-process IO-descriptor table).
pub const MAX_OPEN_FILES: usize = 32;

/// Timer tick rates, in Hz, driven off the QEMU `virt` machine's 10 MHz
/// `mtime` counter.
pub const TIMER_FREQ_HZ: u64 = 10_000_000;
pub const FAST_TICK_HZ: u64 = 10;
pub const SLOW_TICK_HZ: u64 = 1;

/// First byte of physical RAM on the QEMU `virt` machine.
pub const RAM_BASE: usize = 0x8000_0000;
/// Physical RAM size. QEMU's `virt` machine defaults to 128 MiB without an
/// explicit `-m`; a real bootloader would read this from the device tree
/// instead of hardcoding it.
pub const RAM_SIZE: usize = 128 * 1024 * 1024;

/// Base of the VirtIO-MMIO transport window on `virt`: eight 4 KiB slots
/// starting here, one per `-device virtio-*-device`.
pub const VIRTIO_MMIO_BASE: usize = 0x1000_1000;
pub const VIRTIO_MMIO_STRIDE: usize = 0x1000;
pub const VIRTIO_MMIO_COUNT: usize = 8;
