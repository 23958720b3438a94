//! IO-interface abstraction and the flat on-disk filesystem.
//!
//! `init` mounts the filesystem off the VirtIO block device once it is
//! ready. `fs_open`/`dev_open` are what the `FSOPEN`/`DEVOPEN` syscalls
//! delegate to.

pub mod blockdev;
pub mod blockfs;
pub mod io;
pub mod terminal;

use alloc::sync::Arc;

use crate::error::{KernelError, KernelResult};
use io::IoHandle;

pub fn init() -> KernelResult<()> {
    let device = crate::drivers::virtio::blk::device()?;
    blockfs::mount(device)
}

pub fn fs_open(name: &str) -> KernelResult<IoHandle> {
    blockfs::open(name)
}

/// Opens one of the two registered device front ends: `"blk"` for the
/// VirtIO block device's raw byte stream, `"console"` for the terminal.
/// `instno` names which instance of a device class to open; this kernel
/// only ever has one of each, so any value but 0 fails.
pub fn dev_open(name: &str, instno: usize) -> KernelResult<IoHandle> {
    if instno != 0 {
        return Err(KernelError::InvalidArgument {
            name: "instno",
            value: "no such instance",
        });
    }
    match name {
        "blk" => Ok(crate::drivers::virtio::blk::device()? as IoHandle),
        "console" => Ok(Arc::new(terminal::Terminal) as IoHandle),
        _ => Err(KernelError::InvalidArgument {
            name: "name",
            value: "no such device",
        }),
    }
}
