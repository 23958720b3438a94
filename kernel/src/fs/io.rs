//! The IO-interface abstraction shared by every readable/writable kernel
//! object: block devices, filesystem files, and the terminal.

use alloc::sync::Arc;

use crate::error::{KernelError, KernelResult};

/// The `ctl` command set. Dispatch on this is strict single-dispatch:
/// exactly one arm matches, every implementor returns from that arm with
/// no fall-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCommand {
    GetLen,
    GetPos,
    SetPos(u64),
    GetBlockSize,
}

impl IoCommand {
    pub fn decode(cmd: usize, arg: usize) -> KernelResult<Self> {
        match cmd {
            0 => Ok(Self::GetLen),
            1 => Ok(Self::GetPos),
            2 => Ok(Self::SetPos(arg as u64)),
            3 => Ok(Self::GetBlockSize),
            _ => Err(KernelError::BadIoctl { cmd }),
        }
    }
}

/// One of the three concrete variants named in the on-disk/IO model: a
/// block-device front end, a filesystem file, or the line-disciplined
/// terminal. Every open descriptor holds an `Arc` to one of these; `close`
/// is just dropping that `Arc`, with `on_close` run when it was the last
/// reference.
pub trait IoInterface: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> KernelResult<usize>;
    fn write(&self, buf: &[u8]) -> KernelResult<usize>;
    fn ctl(&self, cmd: IoCommand) -> KernelResult<usize>;

    /// Runs once, when the last descriptor referencing this object closes.
    fn on_close(&self) {}
}

pub type IoHandle = Arc<dyn IoInterface>;

/// Drops one reference to `handle`, running its `on_close` hook first if
/// this is the last one.
pub fn close(handle: IoHandle) {
    if Arc::strong_count(&handle) == 1 {
        handle.on_close();
    }
}
