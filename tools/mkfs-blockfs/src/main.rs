//! mkfs-blockfs -- build disk images for the flat read-only filesystem.
//!
//! Host-side tool (runs on Linux) that writes a raw disk image containing
//! the on-disk layout the kernel's `fs::blockfs` driver expects:
//!
//! ```text
//! Block 0:                    Boot block: counts, then one dentry per
//!                              file (fixed-width name + inode index).
//! Blocks 1..=num_inodes:      One inode per file: byte length, then its
//!                              datablock indices (all direct — the format
//!                              has no indirection).
//! Blocks 1+num_inodes..end:   Datablocks, referenced by the indices
//!                              above.
//! ```
//!
//! There is no directory structure on disk, so `--populate` flattens every
//! regular file under the given host tree into the root dentry list by its
//! base name; a name collision is a hard error rather than picking a
//! winner silently.
//!
//! Usage:
//!   mkfs-blockfs --output <path> [--size <MB>] --populate <dir>

use std::collections::HashMap;
use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const BLOCK_SIZE: usize = 4096;
const FS_NAME_LEN: usize = 32;
const MAX_DENTRIES: usize = 64;
const DATABLOCKS_PER_INODE: usize = 1023;

struct Inode {
    byte_length: u32,
    datablocks: Vec<u32>,
}

fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut queue = vec![dir.to_path_buf()];
    let mut files = Vec::new();
    while let Some(d) = queue.pop() {
        let entries = match fs::read_dir(&d) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("warning: cannot read {}: {}", d.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => queue.push(path),
                Ok(ft) if ft.is_file() => files.push(path),
                _ => {}
            }
        }
    }
    files
}

fn dentry_name(path: &Path) -> String {
    path.file_name().expect("file has no name").to_string_lossy().into_owned()
}

/// Builds the inode table and flat datablock pool from the files named in
/// `dentries`, in order; returns `(inodes, datablocks)`.
fn build_inodes(files: &[PathBuf]) -> (Vec<Inode>, Vec<[u8; BLOCK_SIZE]>) {
    let mut inodes = Vec::with_capacity(files.len());
    let mut datablocks = Vec::new();

    for path in files {
        let data = fs::read(path).unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e));
        let byte_length = u32::try_from(data.len()).expect("file too large");
        let nblocks = data.len().div_ceil(BLOCK_SIZE);
        assert!(
            nblocks <= DATABLOCKS_PER_INODE,
            "{} needs {} datablocks, only {} available per inode",
            path.display(),
            nblocks,
            DATABLOCKS_PER_INODE
        );

        let mut block_indices = Vec::with_capacity(nblocks);
        for chunk_start in (0..data.len()).step_by(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            let chunk = &data[chunk_start..(chunk_start + BLOCK_SIZE).min(data.len())];
            block[..chunk.len()].copy_from_slice(chunk);
            block_indices.push(datablocks.len() as u32);
            datablocks.push(block);
        }

        inodes.push(Inode { byte_length, datablocks: block_indices });
    }

    (inodes, datablocks)
}

fn serialize_boot_block(names: &[String], num_datablocks: usize) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0..4].copy_from_slice(&(names.len() as u32).to_le_bytes());
    block[4..8].copy_from_slice(&(names.len() as u32).to_le_bytes());
    block[8..12].copy_from_slice(&(num_datablocks.max(1) as u32).to_le_bytes());

    let mut off = 64;
    for (inode_idx, name) in names.iter().enumerate() {
        let name_bytes = name.as_bytes();
        assert!(name_bytes.len() < FS_NAME_LEN, "name {} too long", name);
        block[off..off + name_bytes.len()].copy_from_slice(name_bytes);
        off += FS_NAME_LEN;
        block[off..off + 4].copy_from_slice(&(inode_idx as u32).to_le_bytes());
        off += 4 + 24; // 6 reserved u32s
    }
    block
}

fn serialize_inode(inode: &Inode) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0..4].copy_from_slice(&inode.byte_length.to_le_bytes());
    for (i, &idx) in inode.datablocks.iter().enumerate() {
        let off = 4 + i * 4;
        block[off..off + 4].copy_from_slice(&idx.to_le_bytes());
    }
    block
}

fn write_image(output: &Path, size_mb: Option<u32>, names: &[String], inodes: &[Inode], datablocks: &[[u8; BLOCK_SIZE]]) -> std::io::Result<()> {
    let used_blocks = 1 + inodes.len() + datablocks.len();
    let requested_blocks = size_mb.map(|mb| mb as usize * (1024 * 1024 / BLOCK_SIZE)).unwrap_or(0);
    let total_blocks = used_blocks.max(requested_blocks);

    let mut file = File::create(output)?;
    file.set_len((total_blocks * BLOCK_SIZE) as u64)?;

    file.write_all(&serialize_boot_block(names, datablocks.len()))?;
    for inode in inodes {
        file.write_all(&serialize_inode(inode))?;
    }
    for block in datablocks {
        file.write_all(block)?;
    }
    file.sync_all()
}

fn print_usage() {
    eprintln!("Usage: mkfs-blockfs --output <path> --populate <dir> [--size <MB>]");
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut output: Option<String> = None;
    let mut size_mb: Option<u32> = None;
    let mut populate_dir: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--output" | "-o" => {
                i += 1;
                output = Some(args[i].clone());
            }
            "--size" | "-s" => {
                i += 1;
                size_mb = Some(args[i].parse().expect("invalid size"));
            }
            "--populate" | "-p" => {
                i += 1;
                populate_dir = Some(args[i].clone());
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let output = output.unwrap_or_else(|| {
        eprintln!("Error: --output is required");
        print_usage();
        std::process::exit(1);
    });
    let populate_dir = populate_dir.unwrap_or_else(|| {
        eprintln!("Error: --populate is required (this filesystem has no mkdir/mkfile of its own)");
        print_usage();
        std::process::exit(1);
    });

    let dir_path = Path::new(&populate_dir);
    if !dir_path.is_dir() {
        eprintln!("Error: {} is not a directory", populate_dir);
        std::process::exit(1);
    }

    let files = collect_files(dir_path);
    if files.is_empty() {
        eprintln!("Error: {} has no regular files; the boot block requires at least one", populate_dir);
        std::process::exit(1);
    }
    if files.len() > MAX_DENTRIES {
        eprintln!("Error: {} files found, only {} fit in the boot block", files.len(), MAX_DENTRIES);
        std::process::exit(1);
    }

    let mut seen = HashMap::new();
    let names: Vec<String> = files
        .iter()
        .map(|path| {
            let name = dentry_name(path);
            if let Some(prior) = seen.insert(name.clone(), path.clone()) {
                eprintln!("Error: duplicate name '{}' ({} and {})", name, prior.display(), path.display());
                std::process::exit(1);
            }
            name
        })
        .collect();

    println!("mkfs-blockfs: building flat filesystem image");
    println!("  Output:  {}", output);
    println!("  Files:   {}", files.len());

    let (inodes, datablocks) = build_inodes(&files);
    println!("  Datablocks: {}", datablocks.len());

    write_image(Path::new(&output), size_mb, &names, &inodes, &datablocks)
        .unwrap_or_else(|e| panic!("error writing image: {}", e));

    println!("mkfs-blockfs: image created successfully");
}
