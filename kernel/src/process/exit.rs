//! `exit`: reclaim a process's address space and close its IO descriptors
//! before the underlying thread ends.

use super::table;

/// Reclaims the current process's address space, closes every open IO
/// descriptor, then exits the calling thread. Never returns.
pub fn exit(code: i32) -> ! {
    if let Ok(pid) = super::current_pid() {
        let _ = crate::mm::vas::space_reclaim();
        if let Ok(pcb) = table::take(pid) {
            for handle in pcb.iotab.into_iter().flatten() {
                crate::fs::io::close(handle);
            }
        }
    }
    crate::sched::exit_current(code)
}
