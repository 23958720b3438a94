//! Privilege-level drop into user mode.
//!
//! Mirrors the reference kernel's `thread_jump_to_user`: clear
//! `sstatus.SPP` so `sret` lands in U-mode, set `sstatus.SPIE` so
//! interrupts come back on immediately, then jump via the trap frame.

use super::context::TrapFrame;

const SSTATUS_SPP: usize = 1 << 8;
const SSTATUS_SPIE: usize = 1 << 5;

/// Builds the initial trap frame for a freshly `exec`'d process and drops
/// into user mode at `entry` with stack pointer `user_sp`. Never returns.
///
/// # Safety
/// The caller's address space must already be installed via `satp` and
/// must have (or lazily fault in) mappings at `entry` and below `user_sp`.
pub unsafe fn jump_to_user(entry: usize, user_sp: usize) -> ! {
    let mut frame = TrapFrame::default();
    frame.sepc = entry;
    frame.sp = user_sp;
    frame.sstatus &= !SSTATUS_SPP;
    frame.sstatus |= SSTATUS_SPIE;
    crate::arch::disable_interrupts();
    // SAFETY: `frame` is fully populated above and the address space is the
    // caller's responsibility per this function's contract.
    unsafe { super::context::finish_into_user(&frame) }
}

/// Resumes a `fork` child for the first time: its trap frame is already a
/// byte-copy of the parent's (with `a0` zeroed by the caller), so this is
/// just the generic "return to user via a saved frame" primitive.
///
/// # Safety
/// Same contract as [`jump_to_user`]: `satp` must already name the
/// child's address space.
pub unsafe fn finish_fork(frame: &TrapFrame) -> ! {
    // SAFETY: forwarded to `finish_into_user`, whose contract this
    // function's own contract satisfies.
    unsafe { super::context::finish_into_user(frame) }
}
