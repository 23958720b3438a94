//! Loads a static RISC-V ELF64 executable into the current address space.
//!
//! Reads the header and program headers through an [`IoInterface`] rather
//! than assuming a flat buffer — the same interface a file or a raw block
//! device exposes — seeking between reads exactly as the reference
//! kernel's loader does. No relocations, no dynamic linking: every
//! executable this kernel runs is statically linked and position-
//! dependent, loaded at the virtual addresses its own program headers
//! name.

mod types;

use crate::config::{USER_END, USER_START};
use crate::error::{ElfError, KernelError, KernelResult};
use crate::fs::io::{IoCommand, IoInterface};
use crate::mm::{vas, PageFlags, VirtualAddress};

use types::{Elf64Header, Elf64ProgramHeader};

fn read_exact_at(io: &dyn IoInterface, offset: u64, buf: &mut [u8]) -> KernelResult<()> {
    io.ctl(IoCommand::SetPos(offset))?;
    let n = io.read(buf)?;
    if n != buf.len() {
        return Err(KernelError::Elf(ElfError::SegmentOutOfRange));
    }
    Ok(())
}

fn read_struct_at<T>(io: &dyn IoInterface, offset: u64, value: &mut T) -> KernelResult<()> {
    // SAFETY: `value` is a live, uniquely borrowed `T`; the byte view
    // covers exactly its own storage and is dropped before `value` is
    // read again.
    let buf = unsafe { core::slice::from_raw_parts_mut(value as *mut T as *mut u8, core::mem::size_of::<T>()) };
    read_exact_at(io, offset, buf)
}

fn segment_flags(p_flags: u32) -> PageFlags {
    let mut flags = PageFlags::USER;
    if p_flags & types::PF_READ != 0 {
        flags = flags | PageFlags::READ;
    }
    if p_flags & types::PF_WRITE != 0 {
        flags = flags | PageFlags::WRITE;
    }
    if p_flags & types::PF_EXEC != 0 {
        flags = flags | PageFlags::EXEC;
    }
    flags
}

fn in_user_range(start: u64, len: u64) -> bool {
    let Some(end) = start.checked_add(len) else { return false };
    start >= USER_START as u64 && end <= USER_END as u64
}

fn load_segment(io: &dyn IoInterface, phdr: &Elf64ProgramHeader) -> KernelResult<()> {
    if !in_user_range(phdr.p_vaddr, phdr.p_memsz) || phdr.p_filesz > phdr.p_memsz {
        return Err(KernelError::Elf(ElfError::SegmentOutOfRange));
    }

    let page_start = VirtualAddress::new(phdr.p_vaddr).page_round_down();
    let map_size = (phdr.p_vaddr + phdr.p_memsz) as usize - page_start.as_u64() as usize;
    vas::alloc_and_map_range(page_start, map_size, segment_flags(phdr.p_flags))?;

    let dest = phdr.p_vaddr as usize;
    // SAFETY: `alloc_and_map_range` just mapped every page covering
    // `[page_start, page_start + map_size)`, which contains
    // `[dest, dest + p_filesz)` and the BSS tail zeroed below.
    let file_part = unsafe { core::slice::from_raw_parts_mut(dest as *mut u8, phdr.p_filesz as usize) };
    read_exact_at(io, phdr.p_offset, file_part)?;

    let bss_len = (phdr.p_memsz - phdr.p_filesz) as usize;
    if bss_len > 0 {
        // SAFETY: see above.
        unsafe { core::ptr::write_bytes((dest + phdr.p_filesz as usize) as *mut u8, 0, bss_len) };
    }
    Ok(())
}

/// Loads `io` as a statically linked RISC-V executable into the current
/// address space and returns its entry address. Every `PT_LOAD` segment is
/// mapped and filled before the header's entry point is trusted, so a
/// malformed file is rejected without leaving partial, unreachable
/// mappings behind for the caller to clean up.
pub fn load(io: &dyn IoInterface) -> KernelResult<u64> {
    let mut header = Elf64Header::default();
    read_struct_at(io, 0, &mut header)?;

    if header.magic != types::ELF_MAGIC {
        return Err(KernelError::Elf(ElfError::BadMagic));
    }
    if header.class != types::ELFCLASS64 || header.data != types::ELFDATA2LSB {
        return Err(KernelError::Elf(ElfError::WrongClass));
    }
    if header.machine != types::EM_RISCV {
        return Err(KernelError::Elf(ElfError::WrongMachine));
    }
    if header.elf_type != types::ET_EXEC {
        return Err(KernelError::Elf(ElfError::NotExecutable));
    }

    for i in 0..header.phnum as u64 {
        let mut phdr = Elf64ProgramHeader::default();
        read_struct_at(io, header.phoff + i * header.phentsize as u64, &mut phdr)?;
        if phdr.p_type != types::PT_LOAD {
            continue;
        }
        load_segment(io, &phdr)?;
    }

    if !in_user_range(header.entry, 1) {
        return Err(KernelError::Elf(ElfError::SegmentOutOfRange));
    }
    Ok(header.entry)
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn minimal_header(phnum: u16, entry: u64) -> Elf64Header {
        Elf64Header {
            magic: types::ELF_MAGIC,
            class: types::ELFCLASS64,
            data: types::ELFDATA2LSB,
            elf_type: types::ET_EXEC,
            machine: types::EM_RISCV,
            phoff: core::mem::size_of::<Elf64Header>() as u64,
            phentsize: core::mem::size_of::<Elf64ProgramHeader>() as u16,
            phnum,
            entry,
            ..Default::default()
        }
    }

    #[test]
    fn in_user_range_rejects_overflowing_length() {
        assert!(!in_user_range(u64::MAX - 1, 100));
    }

    #[test]
    fn in_user_range_rejects_below_user_start() {
        assert!(!in_user_range(0, 1));
    }

    #[test]
    fn segment_flags_carries_permission_bits() {
        let flags = segment_flags(types::PF_READ | types::PF_EXEC);
        assert!(flags.contains(PageFlags::READ));
        assert!(flags.contains(PageFlags::EXEC));
        assert!(!flags.contains(PageFlags::WRITE));
    }

    #[test]
    fn minimal_header_carries_requested_fields() {
        let header = minimal_header(0, USER_START as u64);
        assert_eq!(header.magic, types::ELF_MAGIC);
        assert_eq!(header.phnum, 0);
    }
}
