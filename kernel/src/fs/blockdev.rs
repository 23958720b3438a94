//! Block device abstraction.
//!
//! The filesystem talks to storage purely in terms of fixed-size blocks;
//! [`drivers::virtio::blk`](crate::drivers::virtio::blk) is the only
//! production implementation, but a RAM-backed device is handy for tests
//! and for `mount`-time validation without real hardware.

use alloc::vec::Vec;

use spin::Mutex;

use crate::config::BLOCK_SIZE;
use crate::error::KernelError;

pub trait BlockDevice: Send + Sync {
    fn block_size(&self) -> usize;
    fn block_count(&self) -> u64;
    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<(), KernelError>;
    fn write_block(&self, index: u64, buf: &[u8]) -> Result<(), KernelError>;
}

/// RAM-backed block device, used by the mount-time unit tests.
pub struct RamBlockDevice {
    data: Mutex<Vec<u8>>,
}

impl RamBlockDevice {
    pub fn new(block_count: u64) -> Self {
        Self {
            data: Mutex::new(alloc::vec![0u8; BLOCK_SIZE * block_count as usize]),
        }
    }

    pub fn from_image(image: &[u8]) -> Self {
        Self {
            data: Mutex::new(image.to_vec()),
        }
    }
}

impl BlockDevice for RamBlockDevice {
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn block_count(&self) -> u64 {
        (self.data.lock().len() / BLOCK_SIZE) as u64
    }

    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<(), KernelError> {
        let data = self.data.lock();
        let start = index as usize * BLOCK_SIZE;
        let end = start + buf.len();
        if end > data.len() {
            return Err(KernelError::InvalidSeek);
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_block(&self, index: u64, buf: &[u8]) -> Result<(), KernelError> {
        let mut data = self.data.lock();
        let start = index as usize * BLOCK_SIZE;
        let end = start + buf.len();
        if end > data.len() {
            return Err(KernelError::InvalidSeek);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }
}
