//! `wait`: block for a child thread's exit.

use crate::config::MAIN_TID;
use crate::error::KernelResult;
use crate::sched;

/// Waits for `tid` to exit and returns its exit code. Passing the main
/// thread's tid (which no process ever reuses as a real target) means
/// "wait for any child" instead of a specific one, mirroring the reference
/// kernel's `wait(MAIN_TID)` convention.
pub fn wait(tid: usize) -> KernelResult<i32> {
    if tid == MAIN_TID {
        sched::join_any().map(|(_, code)| code)
    } else {
        sched::join(tid)
    }
}
