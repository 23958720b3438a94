//! VirtIO-over-MMIO transport and the block device built on it.
//!
//! QEMU's `virt` machine exposes a bank of virtio-mmio v2 transport windows
//! ([`mmio`]); `init` probes them for a block device and brings it up.

pub mod blk;
pub mod mmio;
pub mod queue;

use crate::error::KernelResult;

pub fn init() -> KernelResult<()> {
    blk::init()
}
