//! Byte-level reads and writes over an inode's direct blocks.

use log::trace;

use crate::block_dev::{BlockDevice, DataBlock};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{block_of, grow_blocks, write_inode};
use crate::structs::{Inode, SuperBlock};

const ZEROS: DataBlock = [0; BLOCK_SIZE];

/// Reads from `offset` into `buffer`, clamped to the file size.
/// Returns the number of bytes read, 0 at or past end of file.
pub fn fread<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode: &Inode,
    offset: usize,
    buffer: &mut [u8],
) -> usize {
    let size = inode.size as usize;
    if offset >= size {
        return 0;
    }
    let total = buffer.len().min(size - offset);

    let mut bytes_read = 0;
    let mut current_offset = offset;
    let mut block_buf: DataBlock = [0; BLOCK_SIZE];

    while bytes_read < total {
        let start_offset = current_offset % BLOCK_SIZE;
        let bytes_to_read = (BLOCK_SIZE - start_offset).min(total - bytes_read);
        device.read_block(block_of(superblock, inode, current_offset), &mut block_buf);
        buffer[bytes_read..bytes_read + bytes_to_read]
            .copy_from_slice(&block_buf[start_offset..start_offset + bytes_to_read]);

        bytes_read += bytes_to_read;
        current_offset += bytes_to_read;
    }

    bytes_read
}

/// Copies `data` into blocks the inode already owns.
fn copy_into_blocks<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode: &Inode,
    offset: usize,
    data: &[u8],
) {
    let mut bytes_written = 0;
    let mut current_offset = offset;
    let mut block_buf: DataBlock = [0; BLOCK_SIZE];

    while bytes_written < data.len() {
        let start_offset = current_offset % BLOCK_SIZE;
        let bytes_to_write = (BLOCK_SIZE - start_offset).min(data.len() - bytes_written);
        let block_id = block_of(superblock, inode, current_offset);

        device.read_block(block_id, &mut block_buf);
        block_buf[start_offset..start_offset + bytes_to_write]
            .copy_from_slice(&data[bytes_written..bytes_written + bytes_to_write]);
        device.write_block(block_id, &block_buf);

        bytes_written += bytes_to_write;
        current_offset += bytes_to_write;
    }
}

/// Writes `data` at `offset`, truncated at `MAX_FILE_SIZE`.
/// A gap between the current size and `offset` is zero-filled first.
/// All blocks the write needs are allocated up front, so a failed
/// allocation leaves both the on-disk inode and `inode` untouched.
/// Returns the number of bytes written.
pub fn fwrite<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode_id: u32,
    inode: &mut Inode,
    offset: usize,
    data: &[u8],
) -> Result<usize> {
    if offset >= MAX_FILE_SIZE {
        return Err(FsError::FileTooLarge);
    }
    if data.is_empty() {
        return Ok(0);
    }

    let len = data.len().min(MAX_FILE_SIZE - offset);
    let end = offset + len;
    let mut staged = *inode;
    let needed = end.div_ceil(BLOCK_SIZE).max(staged.used_blocks as usize);
    grow_blocks(device, superblock, &mut staged, needed)?;

    let size = staged.size as usize;
    let mut gap_offset = size;
    while gap_offset < offset {
        let n = (offset - gap_offset).min(BLOCK_SIZE);
        copy_into_blocks(device, superblock, &staged, gap_offset, &ZEROS[..n]);
        gap_offset += n;
    }
    copy_into_blocks(device, superblock, &staged, offset, &data[..len]);

    staged.size = size.max(end) as u32;
    write_inode(device, superblock, inode_id, &staged);
    *inode = staged;

    trace!("inode {inode_id}: wrote {len} bytes at {offset}, size {}", inode.size);
    Ok(len)
}
