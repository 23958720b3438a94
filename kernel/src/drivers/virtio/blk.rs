//! VirtIO block device: the `virtio-blk` MMIO device QEMU's `virt` machine
//! exposes backing `-drive` image.
//!
//! One transaction in flight at a time, guarded by a sleep lock so a
//! waiting thread parks instead of spinning; the interrupt handler wakes
//! it by broadcasting a condition once the used ring advances.

use alloc::sync::Arc;

use spin::Mutex as SpinMutex;

use super::mmio::{Mmio, DEVICE_ID_BLOCK};
use super::queue::VirtQueue;
use crate::config::{BLOCK_SIZE, VIRTIO_MMIO_COUNT};
use crate::error::{KernelError, KernelResult};
use crate::fs::blockdev::BlockDevice;
use crate::fs::io::{IoCommand, IoInterface};
use crate::mm::{frame_allocator, PhysicalAddress};
use crate::sync::{Condition, OnceLock, SleepLock};

/// `VIRTIO_F_INDIRECT_DESC`: descriptors may refer to an indirect table.
const FEATURE_INDIRECT_DESC: u64 = 1 << 28;
/// `VIRTIO_F_RING_RESET`: the device supports resetting a single queue.
const FEATURE_RING_RESET: u64 = 1 << 40;
/// `VIRTIO_BLK_F_BLK_SIZE`: `blk_size` is valid in the config space.
const FEATURE_BLK_SIZE: u64 = 1 << 6;
/// `VIRTIO_BLK_F_TOPOLOGY`: the topology fields are valid in config space.
const FEATURE_TOPOLOGY: u64 = 1 << 10;

const REQUIRED_FEATURES: u64 = FEATURE_INDIRECT_DESC | FEATURE_RING_RESET;
const OPTIONAL_FEATURES: u64 = FEATURE_BLK_SIZE | FEATURE_TOPOLOGY;

const REQ_TYPE_IN: u32 = 0;
const REQ_TYPE_OUT: u32 = 1;

const STATUS_OK: u8 = 0;

#[repr(C)]
struct ReqHeader {
    kind: u32,
    reserved: u32,
    sector: u64,
}

/// One 4 KiB frame holding a request's header, data payload, and status
/// byte, reused across every call since only one transaction is ever in
/// flight.
struct RequestBuf {
    frame: PhysicalAddress,
}

const HEADER_OFFSET: usize = 0;
const DATA_OFFSET: usize = 16;
const STATUS_OFFSET: usize = DATA_OFFSET + BLOCK_SIZE;

impl RequestBuf {
    fn new() -> KernelResult<Self> {
        let frame = frame_allocator::alloc()?;
        Ok(Self { frame })
    }

    fn base(&self) -> usize {
        self.frame.as_u64() as usize
    }

    fn write_header(&self, kind: u32, sector: u64) {
        let header = ReqHeader {
            kind,
            reserved: 0,
            sector,
        };
        // SAFETY: base()+HEADER_OFFSET is within the owned frame.
        unsafe { core::ptr::write_volatile((self.base() + HEADER_OFFSET) as *mut ReqHeader, header) };
    }

    fn write_data(&self, data: &[u8]) {
        // SAFETY: base()+DATA_OFFSET..+BLOCK_SIZE is within the owned frame.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), (self.base() + DATA_OFFSET) as *mut u8, data.len());
        }
    }

    fn read_data(&self, buf: &mut [u8]) {
        // SAFETY: see `write_data`.
        unsafe {
            core::ptr::copy_nonoverlapping((self.base() + DATA_OFFSET) as *const u8, buf.as_mut_ptr(), buf.len());
        }
    }

    fn read_status(&self) -> u8 {
        // SAFETY: base()+STATUS_OFFSET is within the owned frame.
        unsafe { core::ptr::read_volatile((self.base() + STATUS_OFFSET) as *const u8) }
    }
}

impl Drop for RequestBuf {
    fn drop(&mut self) {
        // SAFETY: allocated by `new`, not referenced elsewhere.
        unsafe { frame_allocator::free(self.frame) };
    }
}

/// 512-byte sectors per filesystem block.
const SECTORS_PER_BLOCK: u64 = (BLOCK_SIZE / 512) as u64;

pub struct VirtioBlk {
    mmio: Mmio,
    irq: u32,
    queue: SleepLock,
    queue_inner: SpinMutex<VirtQueue>,
    req: SpinMutex<RequestBuf>,
    used_updated: Condition,
    capacity_sectors: u64,
    pos: SpinMutex<u64>,
}

impl VirtioBlk {
    fn do_request(&self, kind: u32, sector: u64, read_buf: Option<&mut [u8]>, write_buf: Option<&[u8]>) -> KernelResult<()> {
        self.queue.acquire();

        let req = self.req.lock();
        req.write_header(kind, sector);
        if let Some(data) = write_buf {
            req.write_data(data);
        }

        let header_phys = req.frame.as_u64() + HEADER_OFFSET as u64;
        let data_phys = req.frame.as_u64() + DATA_OFFSET as u64;
        let status_phys = req.frame.as_u64() + STATUS_OFFSET as u64;
        drop(req);

        {
            let mut queue = self.queue_inner.lock();
            queue.submit(
                header_phys,
                core::mem::size_of::<ReqHeader>() as u32,
                data_phys,
                BLOCK_SIZE as u32,
                kind == REQ_TYPE_IN,
                status_phys,
            );
        }
        self.mmio.notify_queue();

        loop {
            let done = self.queue_inner.lock().poll_used();
            if done.is_some() {
                break;
            }
            self.used_updated.wait();
        }

        let status = self.req.lock().read_status();
        if status != STATUS_OK {
            self.queue.release();
            return Err(KernelError::HardwareError {
                device: "virtio-blk",
                code: status as u32,
            });
        }
        if let Some(buf) = read_buf {
            self.req.lock().read_data(buf);
        }

        self.queue.release();
        Ok(())
    }

    /// Called from the PLIC dispatch path once this device's IRQ claims.
    pub fn handle_irq(&self, _irq: u32) {
        let status = self.mmio.interrupt_status();
        self.mmio.ack_interrupt(status);
        self.used_updated.broadcast();
    }
}

impl BlockDevice for VirtioBlk {
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn block_count(&self) -> u64 {
        self.capacity_sectors / SECTORS_PER_BLOCK
    }

    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<(), KernelError> {
        if index >= self.block_count() {
            return Err(KernelError::InvalidSeek);
        }
        self.do_request(REQ_TYPE_IN, index * SECTORS_PER_BLOCK, Some(buf), None)
    }

    fn write_block(&self, index: u64, buf: &[u8]) -> Result<(), KernelError> {
        if index >= self.block_count() {
            return Err(KernelError::InvalidSeek);
        }
        self.do_request(REQ_TYPE_OUT, index * SECTORS_PER_BLOCK, None, Some(buf))
    }
}

impl IoInterface for VirtioBlk {
    /// Iterates in block-sized chunks, clamped to device capacity, same
    /// shape as the flat filesystem's file reads.
    fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        let capacity = self.capacity_sectors * 512;
        let mut pos = self.pos.lock();
        if *pos >= capacity {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(capacity - *pos) as usize;
        let mut done = 0;
        let mut tmp = [0u8; BLOCK_SIZE];
        while done < n {
            let block = *pos / BLOCK_SIZE as u64;
            let offset = (*pos % BLOCK_SIZE as u64) as usize;
            self.read_block(block, &mut tmp)?;
            let chunk = (BLOCK_SIZE - offset).min(n - done);
            buf[done..done + chunk].copy_from_slice(&tmp[offset..offset + chunk]);
            done += chunk;
            *pos += chunk as u64;
        }
        Ok(done)
    }

    /// Whole-block writes go straight through; partial blocks at the head
    /// or tail of the range are read-modify-write.
    fn write(&self, buf: &[u8]) -> KernelResult<usize> {
        let capacity = self.capacity_sectors * 512;
        let mut pos = self.pos.lock();
        if *pos >= capacity {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(capacity - *pos) as usize;
        let mut done = 0;
        while done < n {
            let block = *pos / BLOCK_SIZE as u64;
            let offset = (*pos % BLOCK_SIZE as u64) as usize;
            let chunk = (BLOCK_SIZE - offset).min(n - done);
            if offset != 0 || chunk != BLOCK_SIZE {
                let mut tmp = [0u8; BLOCK_SIZE];
                self.read_block(block, &mut tmp)?;
                tmp[offset..offset + chunk].copy_from_slice(&buf[done..done + chunk]);
                self.write_block(block, &tmp)?;
            } else {
                self.write_block(block, &buf[done..done + chunk])?;
            }
            done += chunk;
            *pos += chunk as u64;
        }
        Ok(done)
    }

    fn ctl(&self, cmd: IoCommand) -> KernelResult<usize> {
        match cmd {
            IoCommand::GetLen => Ok((self.capacity_sectors * 512) as usize),
            IoCommand::GetPos => Ok(*self.pos.lock() as usize),
            IoCommand::SetPos(p) => {
                *self.pos.lock() = p;
                Ok(0)
            }
            IoCommand::GetBlockSize => Ok(BLOCK_SIZE),
        }
    }
}

static BLK: OnceLock<Arc<VirtioBlk>> = OnceLock::new();

/// Probes every virtio-mmio slot QEMU's `virt` machine exposes, negotiates
/// with the first block device found, and installs its single request
/// queue.
pub fn init() -> KernelResult<()> {
    for slot in 0..VIRTIO_MMIO_COUNT {
        let probe = Mmio::at_slot(slot);
        if probe.probe() != Some(DEVICE_ID_BLOCK) {
            continue;
        }

        probe.negotiate(REQUIRED_FEATURES, OPTIONAL_FEATURES)?;

        let queue = VirtQueue::new()?;
        probe.setup_queue(queue.phys_desc(), queue.phys_avail(), queue.phys_used())?;
        probe.mark_driver_ok();

        let capacity_sectors = probe.read_config64(0);
        let irq = crate::arch::riscv64::plic::IRQ_VIRTIO_START + slot as u32;
        crate::arch::riscv64::plic::enable(irq)?;

        let dev = Arc::new(VirtioBlk {
            mmio: probe,
            irq,
            queue: SleepLock::new("virtio-blk"),
            queue_inner: SpinMutex::new(queue),
            req: SpinMutex::new(RequestBuf::new()?),
            used_updated: Condition::new("virtio-blk:used"),
            capacity_sectors,
            pos: SpinMutex::new(0),
        });

        log::info!(
            "virtio-blk: slot {}, irq {}, {} sectors ({} blocks)",
            slot,
            irq,
            capacity_sectors,
            capacity_sectors / SECTORS_PER_BLOCK
        );

        BLK.set(dev).map_err(|_| KernelError::NotInitialized { subsystem: "virtio-blk" })?;
        return Ok(());
    }

    Err(KernelError::NotInitialized { subsystem: "virtio-blk" })
}

pub fn device() -> KernelResult<Arc<VirtioBlk>> {
    BLK.get().cloned().ok_or(KernelError::NotInitialized { subsystem: "virtio-blk" })
}

/// Dispatches an MMIO interrupt to the block device if it was the source.
pub fn handle_irq(irq: u32) {
    if let Ok(dev) = device() {
        if dev.irq == irq {
            dev.handle_irq(irq);
        }
    }
}
