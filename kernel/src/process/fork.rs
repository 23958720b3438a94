//! `fork`: duplicate the calling process into a freshly allocated one.

extern crate alloc;

use alloc::boxed::Box;

use crate::arch::riscv64::context::TrapFrame;
use crate::arch::riscv64::usermode::finish_fork;
use crate::error::KernelResult;
use crate::mm::vas;
use crate::raii::ScopeGuard;
use crate::sched;

use super::table;

/// First instructions a forked child's thread runs. `frame_ptr` was boxed
/// by [`fork`] below and handed to exactly this one thread.
extern "C" fn fork_entry(frame_ptr: usize) -> ! {
    // SAFETY: `frame_ptr` came from `Box::into_raw` in `fork`, and this
    // trampoline is the sole consumer of that allocation.
    let frame = unsafe { Box::from_raw(frame_ptr as *mut TrapFrame) };
    // SAFETY: the scheduler has already switched `satp` to this thread's
    // (cloned) address space before dispatching into a freshly spawned
    // thread's entry point.
    unsafe { finish_fork(&frame) }
}

/// Allocates a child process, shallow-copies the parent's IO table
/// (bumping refcounts), deep-copies the parent's address space, and starts
/// a thread for it whose trap frame is a byte copy of the parent's with
/// `a0` zeroed — the child's `ecall` returns 0, the parent's returns the
/// child's tid (what `wait`/`join` key on, not its pid).
pub fn fork(parent_tfr: &TrapFrame) -> KernelResult<isize> {
    let parent_pid = super::current_pid()?;

    let child_pid = table::alloc(0)?;
    // Every early-return below leaves the child process table slot and, if
    // reached, its address space behind; one guard covers all of them, and
    // `cancel()` disarms it once the child is fully handed off to the
    // scheduler.
    let cleanup = ScopeGuard::new(|| table::remove(child_pid));

    table::fork_iotab(parent_pid, child_pid)?;
    vas::space_clone(child_pid)?;

    let mut child_frame = *parent_tfr;
    child_frame.set_return_value(0);
    let frame_ptr = Box::into_raw(Box::new(child_frame)) as usize;

    let child_tid = match sched::spawn(Some(child_pid), fork_entry, frame_ptr) {
        Ok(tid) => tid,
        Err(e) => {
            // SAFETY: `spawn` failed before handing the pointer to any
            // thread, so this allocation is still solely ours to free.
            unsafe { drop(Box::from_raw(frame_ptr as *mut TrapFrame)) };
            // The clone left `current` pointing at the parent; briefly
            // switch to the orphaned child space to tear it down, then
            // switch back rather than falling through to the primary space.
            vas::switch_to(child_pid);
            let _ = vas::space_reclaim();
            vas::switch_to(parent_pid);
            return Err(e);
        }
    };

    cleanup.cancel();
    table::with_mut(child_pid, |child| child.tid = child_tid)?;
    Ok(child_tid as isize)
}
