//! Read-mount-only flat filesystem.
//!
//! Block 0 is the boot block: counts plus an array of dentries, each
//! naming a file and its inode number. Blocks `1..=num_inodes` are inodes:
//! a byte length followed by an array of datablock indices. Every block
//! after that is a datablock. There is no directory structure, no file
//! creation, and no growth — `write` never extends a file past the length
//! recorded in its inode.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::{BLOCK_SIZE, DATABLOCKS_PER_INODE, FS_NAME_LEN, MAX_DENTRIES, MAX_OPEN_FILES};
use crate::error::{FsError, KernelError, KernelResult};
use crate::fs::blockdev::BlockDevice;
use crate::fs::io::{IoCommand, IoInterface};

#[derive(Clone, Copy)]
struct Dentry {
    name: [u8; FS_NAME_LEN],
    inode: u32,
}

impl Dentry {
    fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

struct BootBlock {
    num_dentries: u32,
    num_inodes: u32,
    num_datablocks: u32,
    dentries: Vec<Dentry>,
}

impl BootBlock {
    fn parse(block: &[u8; BLOCK_SIZE]) -> KernelResult<Self> {
        let num_dentries = u32::from_le_bytes(block[0..4].try_into().unwrap());
        let num_inodes = u32::from_le_bytes(block[4..8].try_into().unwrap());
        let num_datablocks = u32::from_le_bytes(block[8..12].try_into().unwrap());
        if num_dentries as usize > MAX_DENTRIES || num_inodes == 0 || num_datablocks == 0 {
            return Err(FsError::InvalidBootBlock.into());
        }
        let mut dentries = Vec::with_capacity(num_dentries as usize);
        let mut off = 64;
        for _ in 0..num_dentries {
            let mut name = [0u8; FS_NAME_LEN];
            name.copy_from_slice(&block[off..off + FS_NAME_LEN]);
            off += FS_NAME_LEN;
            let inode = u32::from_le_bytes(block[off..off + 4].try_into().unwrap());
            off += 4 + 24; // 6 reserved u32s
            dentries.push(Dentry { name, inode });
        }
        Ok(Self {
            num_dentries,
            num_inodes,
            num_datablocks,
            dentries,
        })
    }
}

struct Inode {
    byte_length: u64,
    datablocks: [u32; DATABLOCKS_PER_INODE],
}

impl Inode {
    fn parse(block: &[u8; BLOCK_SIZE]) -> Self {
        let byte_length = u32::from_le_bytes(block[0..4].try_into().unwrap()) as u64;
        let mut datablocks = [0u32; DATABLOCKS_PER_INODE];
        for (i, slot) in datablocks.iter_mut().enumerate() {
            let off = 4 + i * 4;
            *slot = u32::from_le_bytes(block[off..off + 4].try_into().unwrap());
        }
        Self { byte_length, datablocks }
    }
}

struct Mounted {
    device: Arc<dyn BlockDevice>,
    boot: BootBlock,
}

static MOUNTED: Mutex<Option<Mounted>> = Mutex::new(None);
static OPEN_FILES: Mutex<[bool; MAX_OPEN_FILES]> = Mutex::new([false; MAX_OPEN_FILES]);

fn read_block(device: &dyn BlockDevice, index: u64) -> KernelResult<[u8; BLOCK_SIZE]> {
    let mut buf = [0u8; BLOCK_SIZE];
    device.read_block(index, &mut buf)?;
    Ok(buf)
}

/// Reads block 0 and validates it. Errors rather than panicking: a bad
/// filesystem image must not take the whole boot sequence down with it if
/// a caller wants to retry against another device.
pub fn mount(device: Arc<dyn BlockDevice>) -> KernelResult<()> {
    let block0 = read_block(device.as_ref(), 0)?;
    let boot = BootBlock::parse(&block0)?;
    log::info!(
        "fs: mounted, {} dentries, {} inodes, {} datablocks",
        boot.num_dentries,
        boot.num_inodes,
        boot.num_datablocks
    );
    *MOUNTED.lock() = Some(Mounted { device, boot });
    Ok(())
}

fn inode_for(mounted: &Mounted, inode_idx: u32) -> KernelResult<Inode> {
    let block = read_block(mounted.device.as_ref(), 1 + inode_idx as u64)?;
    Ok(Inode::parse(&block))
}

pub struct File {
    device: Arc<dyn BlockDevice>,
    num_inodes: u32,
    inode: Inode,
    length: u64,
    pos: Mutex<u64>,
    slot: usize,
}

impl IoInterface for File {
    fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        let mut pos = self.pos.lock();
        if *pos >= self.length {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(self.length - *pos) as usize;
        let mut done = 0;
        while done < n {
            let datablock_idx = (*pos / BLOCK_SIZE as u64) as usize;
            let datablock_offset = (*pos % BLOCK_SIZE as u64) as usize;
            let block_no = 1 + self.num_inodes as u64 + self.inode.datablocks[datablock_idx] as u64;
            let block = read_block(self.device.as_ref(), block_no)?;
            let chunk = (BLOCK_SIZE - datablock_offset).min(n - done);
            buf[done..done + chunk].copy_from_slice(&block[datablock_offset..datablock_offset + chunk]);
            done += chunk;
            *pos += chunk as u64;
        }
        Ok(done)
    }

    fn write(&self, buf: &[u8]) -> KernelResult<usize> {
        let mut pos = self.pos.lock();
        if *pos >= self.length {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(self.length - *pos) as usize;
        let mut done = 0;
        while done < n {
            let datablock_idx = (*pos / BLOCK_SIZE as u64) as usize;
            let datablock_offset = (*pos % BLOCK_SIZE as u64) as usize;
            let block_no = 1 + self.num_inodes as u64 + self.inode.datablocks[datablock_idx] as u64;
            let chunk = (BLOCK_SIZE - datablock_offset).min(n - done);
            if datablock_offset != 0 || chunk != BLOCK_SIZE {
                let mut block = read_block(self.device.as_ref(), block_no)?;
                block[datablock_offset..datablock_offset + chunk].copy_from_slice(&buf[done..done + chunk]);
                self.device.write_block(block_no, &block)?;
            } else {
                self.device.write_block(block_no, &buf[done..done + chunk])?;
            }
            done += chunk;
            *pos += chunk as u64;
        }
        Ok(done)
    }

    fn ctl(&self, cmd: IoCommand) -> KernelResult<usize> {
        match cmd {
            IoCommand::GetLen => Ok(self.length as usize),
            IoCommand::GetPos => Ok(*self.pos.lock() as usize),
            IoCommand::SetPos(p) => {
                *self.pos.lock() = p.min(self.length);
                Ok(0)
            }
            IoCommand::GetBlockSize => Ok(BLOCK_SIZE),
        }
    }

    fn on_close(&self) {
        OPEN_FILES.lock()[self.slot] = false;
    }
}

/// Scans the mounted filesystem's dentries for an exact filename match and
/// opens it, failing if the name is unknown or the kernel-wide open-file
/// table is full.
pub fn open(name: &str) -> KernelResult<Arc<dyn IoInterface>> {
    let guard = MOUNTED.lock();
    let mounted = guard.as_ref().ok_or(KernelError::Fs(FsError::NotMounted))?;
    let dentry = mounted
        .boot
        .dentries
        .iter()
        .find(|d| d.name_str() == name)
        .ok_or(KernelError::Fs(FsError::NotFound))?;
    let inode = inode_for(mounted, dentry.inode)?;

    let mut slots = OPEN_FILES.lock();
    let slot = slots
        .iter()
        .position(|&used| !used)
        .ok_or(KernelError::TableFull { table: "open files" })?;
    slots[slot] = true;
    drop(slots);

    Ok(Arc::new(File {
        device: mounted.device.clone(),
        num_inodes: mounted.boot.num_inodes,
        length: inode.byte_length,
        inode,
        pos: Mutex::new(0),
        slot,
    }))
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::fs::blockdev::RamBlockDevice;

    fn build_image() -> Vec<u8> {
        let mut img = vec![0u8; BLOCK_SIZE * 3];
        img[0..4].copy_from_slice(&1u32.to_le_bytes());
        img[4..8].copy_from_slice(&1u32.to_le_bytes());
        img[8..12].copy_from_slice(&1u32.to_le_bytes());
        img[12..12 + 5].copy_from_slice(b"hello");
        img[12 + FS_NAME_LEN..12 + FS_NAME_LEN + 4].copy_from_slice(&0u32.to_le_bytes());

        let inode_off = BLOCK_SIZE;
        img[inode_off..inode_off + 4].copy_from_slice(&5u32.to_le_bytes());
        img[inode_off + 4..inode_off + 8].copy_from_slice(&0u32.to_le_bytes());

        let data_off = BLOCK_SIZE * 2;
        img[data_off..data_off + 5].copy_from_slice(b"howdy");
        img
    }

    #[test]
    fn mount_and_read_whole_file() {
        let dev = Arc::new(RamBlockDevice::from_image(&build_image()));
        mount(dev).unwrap();
        let f = open("hello").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(f.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"howdy");
        assert_eq!(f.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn open_unknown_name_fails() {
        let dev = Arc::new(RamBlockDevice::from_image(&build_image()));
        mount(dev).unwrap();
        assert!(open("nope").is_err());
    }
}
