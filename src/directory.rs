//! Directory entries stored inside a directory's own data blocks.
//!
//! Entries form a dense, gap-free array: slot `i` lives in owned block
//! `i / ENTRIES_PER_BLOCK`, the count is `size / DIR_ENTRY_SIZE`, and
//! removal swaps the last entry into the hole. Appending never needs a
//! free-slot search and removal never leaves a tombstone.
//! Link counts are not touched here, that is the caller's job.

use alloc::vec::Vec;

use log::debug;

use crate::block_dev::{BlockDevice, DataBlock};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{block_of, grow_blocks, read_inode, shrink_last_block, write_inode};
use crate::structs::{DirEntry, Inode, SuperBlock};

fn entry_count(dir: &Inode) -> usize {
    dir.size as usize / DIR_ENTRY_SIZE
}

/// Absolute block and in-block byte offset of entry slot `index`.
fn entry_pos(superblock: &SuperBlock, dir: &Inode, index: usize) -> (usize, usize) {
    let block_id = block_of(superblock, dir, index / ENTRIES_PER_BLOCK * BLOCK_SIZE);
    (block_id, index % ENTRIES_PER_BLOCK * DIR_ENTRY_SIZE)
}

fn read_entry<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir: &Inode,
    index: usize,
) -> DirEntry {
    let (block_id, offset) = entry_pos(superblock, dir, index);
    let mut buf: DataBlock = [0; BLOCK_SIZE];
    device.read_block(block_id, &mut buf);
    DirEntry::decode(&buf[offset..offset + DIR_ENTRY_SIZE])
}

fn write_entry<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir: &Inode,
    index: usize,
    entry: &DirEntry,
) {
    let (block_id, offset) = entry_pos(superblock, dir, index);
    let mut buf: DataBlock = [0; BLOCK_SIZE];
    device.read_block(block_id, &mut buf);
    entry.encode(&mut buf[offset..offset + DIR_ENTRY_SIZE]);
    device.write_block(block_id, &buf);
}

fn load_dir<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir_id: u32,
) -> Result<Inode> {
    let dir = read_inode(device, superblock, dir_id)?;
    if !dir.is_dir() {
        return Err(FsError::NotADirectory);
    }
    Ok(dir)
}

/// Linear scan, one block read per `ENTRIES_PER_BLOCK` entries.
fn find_entry<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir: &Inode,
    name: &str,
) -> Option<(usize, DirEntry)> {
    let count = entry_count(dir);
    let mut buf: DataBlock = [0; BLOCK_SIZE];

    for i in 0..dir.used_blocks as usize {
        device.read_block(block_of(superblock, dir, i * BLOCK_SIZE), &mut buf);
        for j in 0..ENTRIES_PER_BLOCK {
            let index = i * ENTRIES_PER_BLOCK + j;
            if index >= count {
                return None;
            }
            let offset = j * DIR_ENTRY_SIZE;
            let entry = DirEntry::decode(&buf[offset..offset + DIR_ENTRY_SIZE]);
            if entry.name_eq(name) {
                return Some((index, entry));
            }
        }
    }
    None
}

/// Query inode id of a file by name in the directory.
pub fn dir_lookup<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir_id: u32,
    name: &str,
) -> Result<u32> {
    let dir = load_dir(device, superblock, dir_id)?;
    find_entry(device, superblock, &dir, name)
        .map(|(_, entry)| entry.inode_id)
        .ok_or(FsError::NotFound)
}

/// Appends an entry at slot `count`, growing the directory by one block
/// when the last block is full. Duplicate names are not checked here.
pub fn dir_add_entry<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir_id: u32,
    target_id: u32,
    name: &str,
) -> Result<()> {
    let entry = DirEntry::new(target_id, name)?;
    let mut dir = load_dir(device, superblock, dir_id)?;
    let count = entry_count(&dir);
    if count >= MAX_DIR_ENTRIES {
        return Err(FsError::DirectoryFull);
    }

    if count % ENTRIES_PER_BLOCK == 0 {
        grow_blocks(device, superblock, &mut dir, count / ENTRIES_PER_BLOCK + 1)?;
    }
    write_entry(device, superblock, &dir, count, &entry);
    dir.size += DIR_ENTRY_SIZE as u32;
    write_inode(device, superblock, dir_id, &dir);

    debug!("dir {dir_id}: added '{name}' -> {target_id} at slot {count}");
    Ok(())
}

/// Removes the entry named `name` by moving the last entry into its slot.
/// Releases the last block once it holds no entry.
/// Returns the inode ID the removed entry referred to.
pub fn dir_remove_entry<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir_id: u32,
    name: &str,
) -> Result<u32> {
    let mut dir = load_dir(device, superblock, dir_id)?;
    let (index, removed) = find_entry(device, superblock, &dir, name).ok_or(FsError::NotFound)?;

    let last = entry_count(&dir) - 1;
    if index != last {
        let moved = read_entry(device, superblock, &dir, last);
        write_entry(device, superblock, &dir, index, &moved);
    }
    dir.size -= DIR_ENTRY_SIZE as u32;
    if last % ENTRIES_PER_BLOCK == 0 {
        shrink_last_block(device, superblock, &mut dir);
    }
    write_inode(device, superblock, dir_id, &dir);

    debug!("dir {dir_id}: removed '{name}' from slot {index}");
    Ok(removed.inode_id)
}

/// All entries of the directory, in slot order.
pub fn read_dir<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir_id: u32,
) -> Result<Vec<DirEntry>> {
    let dir = load_dir(device, superblock, dir_id)?;
    let count = entry_count(&dir);
    let mut entries = Vec::with_capacity(count);
    let mut buf: DataBlock = [0; BLOCK_SIZE];

    for index in 0..count {
        if index % ENTRIES_PER_BLOCK == 0 {
            device.read_block(block_of(superblock, &dir, index / ENTRIES_PER_BLOCK * BLOCK_SIZE), &mut buf);
        }
        let offset = index % ENTRIES_PER_BLOCK * DIR_ENTRY_SIZE;
        entries.push(DirEntry::decode(&buf[offset..offset + DIR_ENTRY_SIZE]));
    }
    Ok(entries)
}

/// True if the directory holds nothing but '.' and '..'.
pub fn dir_is_empty<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    dir_id: u32,
) -> Result<bool> {
    Ok(read_dir(device, superblock, dir_id)?
        .iter()
        .all(|entry| entry.name_eq(DOT_NAME) || entry.name_eq(DOTDOT_NAME)))
}
