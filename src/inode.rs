//! Management of reading and writing to inodes.
//! Records are packed back to back from the first inode table block, so a
//! record may straddle two blocks.

use log::{debug, warn};

use crate::bitmap::{alloc_data_block, data_block_id, free_data_block};
use crate::block_dev::{BlockDevice, DataBlock};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::{FileType, Inode, SuperBlock};

/// Block holding the first byte of the record, and the record's offset inside it.
fn inode_pos(superblock: &SuperBlock, inode_id: u32) -> (usize, usize) {
    assert!(inode_id < superblock.inode_count, "inode {inode_id} out of range");
    let byte_offset = inode_id as usize * INODE_SIZE;
    (
        superblock.inode_start as usize + byte_offset / BLOCK_SIZE,
        byte_offset % BLOCK_SIZE,
    )
}

pub fn read_inode<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode_id: u32,
) -> Result<Inode> {
    let (block_id, offset) = inode_pos(superblock, inode_id);
    let mut record = [0u8; INODE_SIZE];
    let mut buf: DataBlock = [0; BLOCK_SIZE];

    device.read_block(block_id, &mut buf);
    let head = (BLOCK_SIZE - offset).min(INODE_SIZE);
    record[..head].copy_from_slice(&buf[offset..offset + head]);
    if head < INODE_SIZE {
        device.read_block(block_id + 1, &mut buf);
        record[head..].copy_from_slice(&buf[..INODE_SIZE - head]);
    }

    Inode::decode(&record)
}

pub fn write_inode<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode_id: u32,
    inode: &Inode,
) {
    let (block_id, offset) = inode_pos(superblock, inode_id);
    let mut record = [0u8; INODE_SIZE];
    inode.encode(&mut record);
    let mut buf: DataBlock = [0; BLOCK_SIZE];

    device.read_block(block_id, &mut buf);
    let head = (BLOCK_SIZE - offset).min(INODE_SIZE);
    buf[offset..offset + head].copy_from_slice(&record[..head]);
    device.write_block(block_id, &buf);
    if head < INODE_SIZE {
        device.read_block(block_id + 1, &mut buf);
        buf[..INODE_SIZE - head].copy_from_slice(&record[head..]);
        device.write_block(block_id + 1, &buf);
    }
}

/// Claims the first free inode and initializes it with one link and no blocks.
pub fn alloc_inode<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    ftype: FileType,
) -> Result<u32> {
    assert_ne!(ftype, FileType::Free);
    for inode_id in 0..superblock.inode_count {
        if read_inode(device, superblock, inode_id)?.is_free() {
            write_inode(device, superblock, inode_id, &Inode::new(ftype));
            debug!("allocated inode {inode_id} as {ftype:?}");
            return Ok(inode_id);
        }
    }
    Err(FsError::NoFreeInodes)
}

/// Releases every block the inode owns and marks it free.
/// The root inode is pinned and can never be freed.
pub fn free_inode<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode_id: u32,
) -> Result<()> {
    assert_ne!(inode_id, ROOT_INODE_ID, "root inode is pinned");
    release_inode(device, superblock, inode_id)
}

/// `free_inode` without the root pin, for undoing a failed format.
pub(crate) fn release_inode<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode_id: u32,
) -> Result<()> {
    let inode = read_inode(device, superblock, inode_id)?;
    assert!(!inode.is_free(), "double free of inode {inode_id}");

    for &slot in inode.owned_blocks() {
        free_data_block(device, superblock, slot);
    }
    write_inode(device, superblock, inode_id, &Inode::FREE);
    debug!("freed inode {inode_id} ({} blocks)", inode.used_blocks);
    Ok(())
}

/// Appends data blocks until the inode owns `target` of them.
/// On failure every block allocated by this call is released and `inode`
/// is left exactly as it was. Only the in-memory record is touched; the
/// caller writes it back.
pub fn grow_blocks<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode: &mut Inode,
    target: usize,
) -> Result<()> {
    if target > INODE_ADDRS {
        return Err(FsError::FileTooLarge);
    }
    let before = inode.used_blocks;

    while (inode.used_blocks as usize) < target {
        match alloc_data_block(device, superblock) {
            Ok(slot) => {
                inode.blocks[inode.used_blocks as usize] = slot;
                inode.used_blocks += 1;
            }
            Err(e) => {
                warn!(
                    "growing to {target} blocks failed, releasing {} new blocks",
                    inode.used_blocks - before
                );
                while inode.used_blocks > before {
                    shrink_last_block(device, superblock, inode);
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Releases the inode's last owned block.
pub fn shrink_last_block<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode: &mut Inode,
) {
    assert!(inode.used_blocks > 0, "inode owns no blocks");
    inode.used_blocks -= 1;
    let last = inode.used_blocks as usize;
    free_data_block(device, superblock, inode.blocks[last]);
    inode.blocks[last] = 0;
}

/// Maps a byte offset within the inode to the absolute block holding it.
pub fn block_of(superblock: &SuperBlock, inode: &Inode, offset: usize) -> usize {
    let index = offset / BLOCK_SIZE;
    assert!(index < inode.used_blocks as usize, "offset {offset} beyond owned blocks");
    data_block_id(superblock, inode.blocks[index])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::count_used_blocks;
    use crate::block_dev::RamDisk;
    use crate::superblock::format_volume;

    fn formatted() -> (RamDisk, SuperBlock) {
        let rd = RamDisk::new(FS_SIZE);
        let sb = format_volume(&rd).unwrap();
        (rd, sb)
    }

    #[test]
    fn test_straddling_record() {
        let (rd, sb) = formatted();
        // Record 11 starts at byte 484 and ends in the next block.
        let inode_id = (BLOCK_SIZE / INODE_SIZE) as u32;
        let (_, offset) = inode_pos(&sb, inode_id);
        assert!(offset + INODE_SIZE > BLOCK_SIZE);

        let mut inode = Inode::new(FileType::File);
        inode.size = 1234;
        inode.used_blocks = INODE_ADDRS as u16;
        inode.blocks = [9, 8, 7, 6, 5, 4, 3, 2];
        write_inode(&rd, &sb, inode_id, &inode);

        assert_eq!(read_inode(&rd, &sb, inode_id).unwrap(), inode);
        assert!(read_inode(&rd, &sb, inode_id - 1).unwrap().is_free());
        assert!(read_inode(&rd, &sb, inode_id + 1).unwrap().is_free());
    }

    #[test]
    fn test_last_record() {
        let (rd, sb) = formatted();
        let last = sb.inode_count - 1;
        let inode = Inode::new(FileType::Directory);
        write_inode(&rd, &sb, last, &inode);
        assert_eq!(read_inode(&rd, &sb, last).unwrap(), inode);
    }

    #[test]
    fn test_alloc_first_fit() {
        let (rd, sb) = formatted();
        assert_eq!(alloc_inode(&rd, &sb, FileType::Directory), Ok(0));
        assert_eq!(alloc_inode(&rd, &sb, FileType::File), Ok(1));
        assert_eq!(alloc_inode(&rd, &sb, FileType::File), Ok(2));
        free_inode(&rd, &sb, 1).unwrap();
        assert_eq!(alloc_inode(&rd, &sb, FileType::File), Ok(1));

        let inode = read_inode(&rd, &sb, 1).unwrap();
        assert_eq!(inode.links, 1);
        assert_eq!(inode.open_count, 0);
        assert_eq!(inode.size, 0);
        assert_eq!(inode.used_blocks, 0);
    }

    #[test]
    fn test_free_releases_blocks() {
        let (rd, sb) = formatted();
        alloc_inode(&rd, &sb, FileType::Directory).unwrap();
        let id = alloc_inode(&rd, &sb, FileType::File).unwrap();
        let mut inode = read_inode(&rd, &sb, id).unwrap();
        grow_blocks(&rd, &sb, &mut inode, 3).unwrap();
        write_inode(&rd, &sb, id, &inode);
        assert_eq!(count_used_blocks(&rd, &sb), 3);

        free_inode(&rd, &sb, id).unwrap();
        assert_eq!(count_used_blocks(&rd, &sb), 0);
        assert!(read_inode(&rd, &sb, id).unwrap().is_free());
    }

    #[test]
    fn test_grow_rolls_back() {
        let (rd, sb) = formatted();
        // Leave exactly two free data slots.
        for _ in 0..MAX_FILE_COUNT - 2 {
            alloc_data_block(&rd, &sb).unwrap();
        }
        let mut inode = Inode::new(FileType::File);
        grow_blocks(&rd, &sb, &mut inode, 1).unwrap();
        let before = inode;

        assert_eq!(grow_blocks(&rd, &sb, &mut inode, 4), Err(FsError::NoFreeBlocks));
        assert_eq!(inode, before);
        assert_eq!(count_used_blocks(&rd, &sb), MAX_FILE_COUNT - 1);
    }

    #[test]
    #[should_panic(expected = "root inode is pinned")]
    fn test_root_is_pinned() {
        let (rd, sb) = formatted();
        alloc_inode(&rd, &sb, FileType::Directory).unwrap();
        let _ = free_inode(&rd, &sb, ROOT_INODE_ID);
    }
}
