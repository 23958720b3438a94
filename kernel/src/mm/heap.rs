//! Kernel heap.
//!
//! The kernel's own allocations (thread structs, driver queues, the
//! filesystem's in-memory dentry table) come out of a single static backing
//! array handed to the bare-metal bump allocator selected in `lib.rs`. User
//! memory never goes through this path — it is frame-allocated and mapped
//! directly by `mm::vas`.

/// 4 MiB is generous for a kernel that never spawns more than
/// [`crate::config::MAX_THREADS`] threads and [`crate::config::MAX_PROCESSES`]
/// processes.
const HEAP_SIZE: usize = 4 * 1024 * 1024;

static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Initializes the global allocator over the static heap region. Must run
/// before the first `alloc`-crate allocation (`Box`, `Vec`, etc.).
pub fn init() {
    let heap_start = core::ptr::addr_of_mut!(HEAP_MEMORY) as *mut u8;

    #[cfg(target_os = "none")]
    // SAFETY: `HEAP_MEMORY` is a private static used nowhere else, and
    // `init` runs once, before any other subsystem has allocated.
    unsafe {
        crate::ALLOCATOR.init(heap_start, HEAP_SIZE);
    }

    #[cfg(not(target_os = "none"))]
    let _ = heap_start;

    log::info!("heap: {} KiB backing store ready", HEAP_SIZE / 1024);
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use alloc::{boxed::Box, vec::Vec};

    #[test]
    fn boxed_allocation_round_trips() {
        let x = Box::new(42);
        assert_eq!(*x, 42);
    }

    #[test]
    fn vec_grows_past_initial_capacity() {
        let mut v = Vec::new();
        for i in 0..100 {
            v.push(i);
        }
        assert_eq!(v.len(), 100);
    }
}
