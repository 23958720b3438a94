//! The process control block: identity and the IO-descriptor table.
//!
//! A process is deliberately thin — one thread, one address space (`asid
//! == pid`), and the table of open IO handles that `devopen`/`fsopen`/
//! `close`/`read`/`write`/`ioctl` index into.

use crate::config::MAX_IO_DESCRIPTORS;
use crate::fs::io::IoHandle;

pub type Pid = usize;

pub struct Pcb {
    pub pid: Pid,
    /// The single thread running this process.
    pub tid: usize,
    pub iotab: [Option<IoHandle>; MAX_IO_DESCRIPTORS],
}

impl Pcb {
    pub fn new(pid: Pid, tid: usize) -> Self {
        Self {
            pid,
            tid,
            iotab: [const { None }; MAX_IO_DESCRIPTORS],
        }
    }
}
