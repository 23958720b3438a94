//! Memory and instruction barrier helpers.
//!
//! Named wrappers around the RISC-V `fence` instructions so call sites read
//! as intent ("this MMIO write must land before the next read") rather than
//! raw `asm!`.

/// Full read/write ordering fence (`fence rw, rw`).
#[inline(always)]
pub fn memory_fence() {
    // SAFETY: fence has no memory side effects, only ordering.
    unsafe {
        core::arch::asm!("fence rw, rw", options(nostack, nomem, preserves_flags));
    }
}

/// Alias for [`memory_fence`]; used at call sites that publish a descriptor
/// before notifying a device of it.
#[inline(always)]
pub fn data_sync_barrier() {
    memory_fence();
}

/// Instruction-stream fence (`fence.i`), needed after writing code that will
/// subsequently be executed.
#[inline(always)]
pub fn instruction_sync_barrier() {
    // SAFETY: fence.i has no memory side effects, only ordering.
    unsafe {
        core::arch::asm!("fence.i", options(nostack, nomem));
    }
}
