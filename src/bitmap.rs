//! Management of the block allocation bitmap.
//! One flag byte per data-region slot; a set flag means exactly one inode
//! lists that slot among its owned blocks.

use log::trace;

use crate::block_dev::{BlockDevice, DataBlock};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::SuperBlock;

const FREE: u8 = 0;
const USED: u8 = 1;

/// Absolute block ID of a data-region slot.
pub fn data_block_id(superblock: &SuperBlock, slot: u32) -> usize {
    assert!(slot < superblock.data_blocks, "data slot {slot} out of range");
    (superblock.data_start + slot) as usize
}

/// Bitmap block holding the flag of `slot`, and the flag's offset inside it.
fn flag_pos(superblock: &SuperBlock, slot: u32) -> (usize, usize) {
    let slot = slot as usize;
    (superblock.bitmap_start as usize + slot / BLOCK_SIZE, slot % BLOCK_SIZE)
}

/// Allocates the lowest free data slot and zero-fills its block.
/// Scan order is ascending, so allocation is reproducible for a given state.
pub fn alloc_data_block<D: BlockDevice + ?Sized>(device: &D, superblock: &SuperBlock) -> Result<u32> {
    let mut buf: DataBlock = [0; BLOCK_SIZE];

    for i in 0..superblock.bitmap_blocks as usize {
        let bitmap_block_id = superblock.bitmap_start as usize + i;
        device.read_block(bitmap_block_id, &mut buf);

        for j in 0..BLOCK_SIZE {
            let slot = (i * BLOCK_SIZE + j) as u32;
            if slot >= superblock.data_blocks {
                return Err(FsError::NoFreeBlocks);
            }
            if buf[j] == FREE {
                buf[j] = USED;
                device.write_block(bitmap_block_id, &buf);
                device.write_block(data_block_id(superblock, slot), &[0; BLOCK_SIZE]);
                trace!("allocated data slot {slot}");
                return Ok(slot);
            }
        }
    }

    Err(FsError::NoFreeBlocks)
}

/// Marks a data slot free again.
/// The slot must currently be allocated; anything else is a bookkeeping bug.
pub fn free_data_block<D: BlockDevice + ?Sized>(device: &D, superblock: &SuperBlock, slot: u32) {
    assert!(slot < superblock.data_blocks, "data slot {slot} out of range");
    let (bitmap_block_id, offset) = flag_pos(superblock, slot);
    let mut buf: DataBlock = [0; BLOCK_SIZE];
    device.read_block(bitmap_block_id, &mut buf);
    assert_eq!(buf[offset], USED, "double free of data slot {slot}");
    buf[offset] = FREE;
    device.write_block(bitmap_block_id, &buf);
    trace!("freed data slot {slot}");
}

pub fn is_block_used<D: BlockDevice + ?Sized>(device: &D, superblock: &SuperBlock, slot: u32) -> bool {
    let (bitmap_block_id, offset) = flag_pos(superblock, slot);
    let mut buf: DataBlock = [0; BLOCK_SIZE];
    device.read_block(bitmap_block_id, &mut buf);
    buf[offset] != FREE
}

pub fn count_used_blocks<D: BlockDevice + ?Sized>(device: &D, superblock: &SuperBlock) -> usize {
    let mut buf: DataBlock = [0; BLOCK_SIZE];
    let mut used = 0;
    for i in 0..superblock.bitmap_blocks as usize {
        device.read_block(superblock.bitmap_start as usize + i, &mut buf);
        let in_range = (superblock.data_blocks as usize)
            .saturating_sub(i * BLOCK_SIZE)
            .min(BLOCK_SIZE);
        used += buf[..in_range].iter().filter(|&&flag| flag != FREE).count();
    }
    used
}
