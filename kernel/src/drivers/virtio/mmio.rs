//! Raw register access for one virtio-mmio (version 2) transport window.
//!
//! QEMU's `virt` machine exposes up to
//! [`crate::config::VIRTIO_MMIO_COUNT`] of these, each
//! [`crate::config::VIRTIO_MMIO_STRIDE`] bytes apart starting at
//! [`crate::config::VIRTIO_MMIO_BASE`], one per `-device virtio-*-device`.

use crate::arch::barriers::memory_fence;
use crate::error::{KernelError, KernelResult};

const MAGIC: u32 = 0x7472_6976; // "virt" little-endian
const VERSION: u32 = 2;

const REG_MAGIC: usize = 0x000;
const REG_VERSION: usize = 0x004;
const REG_DEVICE_ID: usize = 0x008;
const REG_DEVICE_FEATURES: usize = 0x010;
const REG_DEVICE_FEATURES_SEL: usize = 0x014;
const REG_DRIVER_FEATURES: usize = 0x020;
const REG_DRIVER_FEATURES_SEL: usize = 0x024;
const REG_QUEUE_SEL: usize = 0x030;
const REG_QUEUE_NUM_MAX: usize = 0x034;
const REG_QUEUE_NUM: usize = 0x038;
const REG_QUEUE_READY: usize = 0x044;
const REG_QUEUE_NOTIFY: usize = 0x050;
const REG_INTERRUPT_STATUS: usize = 0x060;
const REG_INTERRUPT_ACK: usize = 0x064;
const REG_STATUS: usize = 0x070;
const REG_QUEUE_DESC_LOW: usize = 0x080;
const REG_QUEUE_DESC_HIGH: usize = 0x084;
const REG_QUEUE_DRIVER_LOW: usize = 0x090; // avail ring
const REG_QUEUE_DRIVER_HIGH: usize = 0x094;
const REG_QUEUE_DEVICE_LOW: usize = 0x0a0; // used ring
const REG_QUEUE_DEVICE_HIGH: usize = 0x0a4;
pub const REG_CONFIG: usize = 0x100;

pub const STATUS_ACKNOWLEDGE: u32 = 1;
pub const STATUS_DRIVER: u32 = 2;
pub const STATUS_FEATURES_OK: u32 = 8;
pub const STATUS_DRIVER_OK: u32 = 4;
pub const STATUS_FAILED: u32 = 128;

pub const DEVICE_ID_BLOCK: u32 = 2;

/// Thin MMIO accessor. Every method is volatile; ordering against the
/// device is the caller's job via [`memory_fence`].
pub struct Mmio {
    base: usize,
}

impl Mmio {
    pub fn at_slot(slot: usize) -> Self {
        Self {
            base: crate::config::VIRTIO_MMIO_BASE + slot * crate::config::VIRTIO_MMIO_STRIDE,
        }
    }

    fn read32(&self, reg: usize) -> u32 {
        // SAFETY: `base` is within the identity-mapped low 3 GiB MMIO
        // window on the `virt` machine.
        unsafe { core::ptr::read_volatile((self.base + reg) as *const u32) }
    }

    fn write32(&self, reg: usize, value: u32) {
        // SAFETY: see `read32`.
        unsafe { core::ptr::write_volatile((self.base + reg) as *mut u32, value) }
    }

    pub fn read_config32(&self, offset: usize) -> u32 {
        self.read32(REG_CONFIG + offset)
    }

    pub fn read_config64(&self, offset: usize) -> u64 {
        let lo = self.read_config32(offset) as u64;
        let hi = self.read_config32(offset + 4) as u64;
        lo | (hi << 32)
    }

    /// Probes this slot: `Some(device_id)` if a device is present here and
    /// speaks virtio-mmio v2, `None` for an empty slot.
    pub fn probe(&self) -> Option<u32> {
        if self.read32(REG_MAGIC) != MAGIC || self.read32(REG_VERSION) != VERSION {
            return None;
        }
        let id = self.read32(REG_DEVICE_ID);
        if id == 0 {
            None
        } else {
            Some(id)
        }
    }

    fn device_features(&self) -> u64 {
        self.write32(REG_DEVICE_FEATURES_SEL, 0);
        let lo = self.read32(REG_DEVICE_FEATURES) as u64;
        self.write32(REG_DEVICE_FEATURES_SEL, 1);
        let hi = self.read32(REG_DEVICE_FEATURES) as u64;
        lo | (hi << 32)
    }

    fn set_driver_features(&self, features: u64) {
        self.write32(REG_DRIVER_FEATURES_SEL, 0);
        self.write32(REG_DRIVER_FEATURES, features as u32);
        self.write32(REG_DRIVER_FEATURES_SEL, 1);
        self.write32(REG_DRIVER_FEATURES, (features >> 32) as u32);
    }

    fn status(&self) -> u32 {
        self.read32(REG_STATUS)
    }

    fn set_status(&self, status: u32) {
        self.write32(REG_STATUS, status);
    }

    /// Runs the virtio device-initialization handshake up through
    /// `FEATURES_OK`, negotiating `required | optional` against whatever
    /// the device actually offers. Fails (and the caller must set
    /// `FAILED`) if any bit in `required` is missing.
    pub fn negotiate(&self, required: u64, optional: u64) -> KernelResult<u64> {
        self.set_status(0); // reset
        self.set_status(STATUS_ACKNOWLEDGE);
        self.set_status(STATUS_ACKNOWLEDGE | STATUS_DRIVER);

        let offered = self.device_features();
        if offered & required != required {
            self.set_status(STATUS_FAILED);
            return Err(KernelError::HardwareError {
                device: "virtio",
                code: offered as u32,
            });
        }
        let accepted = offered & (required | optional);
        self.set_driver_features(accepted);
        self.set_status(STATUS_ACKNOWLEDGE | STATUS_DRIVER | STATUS_FEATURES_OK);

        if self.status() & STATUS_FEATURES_OK == 0 {
            self.set_status(STATUS_FAILED);
            return Err(KernelError::HardwareError {
                device: "virtio",
                code: 0,
            });
        }
        Ok(accepted)
    }

    /// Sizes and installs queue 0 (the only queue this kernel's block
    /// driver uses) with `desc`/`avail`/`used` physical addresses, then
    /// marks it ready.
    pub fn setup_queue(&self, desc: u64, avail: u64, used: u64) -> KernelResult<()> {
        self.write32(REG_QUEUE_SEL, 0);
        let max = self.read32(REG_QUEUE_NUM_MAX);
        if max == 0 {
            return Err(KernelError::HardwareError {
                device: "virtio",
                code: 0,
            });
        }
        self.write32(REG_QUEUE_NUM, 1); // one transaction in flight
        self.write32(REG_QUEUE_DESC_LOW, desc as u32);
        self.write32(REG_QUEUE_DESC_HIGH, (desc >> 32) as u32);
        self.write32(REG_QUEUE_DRIVER_LOW, avail as u32);
        self.write32(REG_QUEUE_DRIVER_HIGH, (avail >> 32) as u32);
        self.write32(REG_QUEUE_DEVICE_LOW, used as u32);
        self.write32(REG_QUEUE_DEVICE_HIGH, (used >> 32) as u32);
        self.write32(REG_QUEUE_READY, 1);
        Ok(())
    }

    pub fn mark_driver_ok(&self) {
        self.set_status(self.status() | STATUS_DRIVER_OK);
    }

    pub fn notify_queue(&self) {
        memory_fence();
        self.write32(REG_QUEUE_NOTIFY, 0);
    }

    pub fn interrupt_status(&self) -> u32 {
        self.read32(REG_INTERRUPT_STATUS)
    }

    pub fn ack_interrupt(&self, bits: u32) {
        self.write32(REG_INTERRUPT_ACK, bits);
    }
}
