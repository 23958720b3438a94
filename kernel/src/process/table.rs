//! The flat process table: one slot per pid, `asid == pid` throughout.

use spin::Mutex;

use crate::config::MAX_PROCESSES;
use crate::error::{KernelError, KernelResult};

use super::pcb::{Pcb, Pid};

static PROCTAB: Mutex<[Option<Pcb>; MAX_PROCESSES]> = Mutex::new([const { None }; MAX_PROCESSES]);

/// Installs `pid`'s bootstrap entry, bound to `tid`. Called once from
/// [`super::init`].
pub fn install(pid: Pid, tid: usize) {
    PROCTAB.lock()[pid] = Some(Pcb::new(pid, tid));
}

/// Allocates the lowest free pid and installs an empty PCB for it.
pub fn alloc(tid: usize) -> KernelResult<Pid> {
    let mut table = PROCTAB.lock();
    let pid = table
        .iter()
        .position(Option::is_none)
        .ok_or(KernelError::TableFull { table: "process" })?;
    table[pid] = Some(Pcb::new(pid, tid));
    Ok(pid)
}

/// Removes `pid` from the table, handing back its PCB so the caller can
/// dispose of its remaining IO handles.
pub fn take(pid: Pid) -> KernelResult<Pcb> {
    PROCTAB.lock()[pid].take().ok_or(KernelError::ProcessNotFound { pid })
}

pub fn remove(pid: Pid) {
    PROCTAB.lock()[pid] = None;
}

pub fn with<R>(pid: Pid, f: impl FnOnce(&Pcb) -> R) -> KernelResult<R> {
    PROCTAB.lock()[pid].as_ref().map(f).ok_or(KernelError::ProcessNotFound { pid })
}

pub fn with_mut<R>(pid: Pid, f: impl FnOnce(&mut Pcb) -> R) -> KernelResult<R> {
    PROCTAB.lock()[pid].as_mut().map(f).ok_or(KernelError::ProcessNotFound { pid })
}

/// Shallow-copies `parent`'s IO table into `child`, bumping each handle's
/// refcount — the `fork` half of "every open descriptor is shared after
/// fork until one side closes it".
pub fn fork_iotab(parent: Pid, child: Pid) -> KernelResult<()> {
    let mut table = PROCTAB.lock();
    let copy = {
        let p = table[parent].as_ref().ok_or(KernelError::ProcessNotFound { pid: parent })?;
        let mut copy = [const { None }; crate::config::MAX_IO_DESCRIPTORS];
        for (slot, handle) in p.iotab.iter().enumerate() {
            copy[slot] = handle.clone();
        }
        copy
    };
    let c = table[child].as_mut().ok_or(KernelError::ProcessNotFound { pid: child })?;
    c.iotab = copy;
    Ok(())
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    // Single test function: `PROCTAB` is a shared global, and the test
    // harness runs tests in parallel, so every assertion touching it lives
    // in one function to avoid racing against itself.
    #[test]
    fn alloc_remove_roundtrip() {
        let a = alloc(0).unwrap();
        let b = alloc(1).unwrap();
        assert_ne!(a, b);

        remove(a);
        assert!(matches!(with(a, |_| ()), Err(KernelError::ProcessNotFound { .. })));

        let c = alloc(2).unwrap();
        assert_eq!(a, c);

        remove(b);
        remove(c);
    }
}
