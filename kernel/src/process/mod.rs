//! Process lifecycle: one address space and one IO-descriptor table per
//! process, wrapped around the single thread that runs it.
//!
//! A process is nothing more than its pid (which doubles as its address
//! space id — see [`crate::mm::vas`]) and its table of open IO handles.
//! Everything else — scheduling, register state, kernel stacks — belongs
//! to [`crate::sched`]; this module only owns what a thread can't: the
//! address space and the descriptors naming open devices and files.

pub mod exit;
pub mod fork;
pub mod loader;
pub mod pcb;
pub mod table;
pub mod wait;

use crate::config::MAX_IO_DESCRIPTORS;
use crate::error::{KernelError, KernelResult};
use crate::fs::io::IoHandle;

pub use pcb::Pid;

/// pid 0: bound to the bootstrap thread and the primary address space for
/// the lifetime of the kernel.
pub const MAIN_PID: Pid = crate::config::MAIN_TID;

pub use exit::exit;
pub use fork::fork;
pub use loader::exec;
pub use wait::wait;

/// Binds pid 0 to the calling (bootstrap) thread.
pub fn init() -> KernelResult<()> {
    table::install(MAIN_PID, crate::sched::current_tid());
    log::info!("process: pid 0 bound to bootstrap thread");
    Ok(())
}

pub fn current_pid() -> KernelResult<Pid> {
    crate::sched::current_pid().ok_or(KernelError::NotInitialized { subsystem: "process" })
}

/// Installs `handle` at `fd`, or at the lowest free slot if `fd` is
/// negative. Fails if the requested slot is out of range or already in
/// use.
pub fn open_fd(fd: isize, handle: IoHandle) -> KernelResult<usize> {
    let pid = current_pid()?;
    let slot = table::with(pid, |p| {
        if fd < 0 {
            p.iotab.iter().position(Option::is_none)
        } else {
            let fd = fd as usize;
            (fd < MAX_IO_DESCRIPTORS && p.iotab[fd].is_none()).then_some(fd)
        }
    })?;
    match slot {
        Some(slot) => {
            table::with_mut(pid, |p| p.iotab[slot] = Some(handle))?;
            Ok(slot)
        }
        None => {
            crate::fs::io::close(handle);
            Err(KernelError::BadDescriptor { fd })
        }
    }
}

/// Removes and closes the handle at `fd`. Fails if `fd` is out of range or
/// not currently open.
pub fn close_fd(fd: usize) -> KernelResult<()> {
    let pid = current_pid()?;
    let handle = table::with_mut(pid, |p| {
        if fd >= MAX_IO_DESCRIPTORS {
            return None;
        }
        p.iotab[fd].take()
    })?;
    match handle {
        Some(handle) => {
            crate::fs::io::close(handle);
            Ok(())
        }
        None => Err(KernelError::BadDescriptor { fd: fd as isize }),
    }
}

/// Returns a cloned handle for `fd` without touching the table — for
/// `read`/`write`/`ioctl`/`exec`, which need the handle but not ownership
/// of the slot.
pub fn fd_handle(fd: usize) -> KernelResult<IoHandle> {
    let pid = current_pid()?;
    let handle = table::with(pid, |p| {
        if fd >= MAX_IO_DESCRIPTORS {
            return None;
        }
        p.iotab[fd].clone()
    })?;
    handle.ok_or(KernelError::BadDescriptor { fd: fd as isize })
}
