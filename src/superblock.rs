use log::trace;

use crate::block_dev::{BlockDevice, DataBlock};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::SuperBlock;

/// Reads block 0 and checks the magic number.
/// Returns `None` for an unformatted volume. A volume carrying the magic
/// number but a layout other than this build's geometry is `Inconsistent`.
pub fn read_superblock<D: BlockDevice + ?Sized>(device: &D) -> Result<Option<SuperBlock>> {
    let mut buf: DataBlock = [0; BLOCK_SIZE];
    device.read_block(SUPERBLOCK_ID, &mut buf);
    let superblock = SuperBlock::decode(&buf);
    trace!("superblock magic {:#x}", superblock.magic);

    if !superblock.is_valid() {
        return Ok(None);
    }
    if superblock != SuperBlock::new() {
        return Err(FsError::Inconsistent(format!(
            "superblock layout {superblock:?} does not match this geometry"
        )));
    }
    Ok(Some(superblock))
}

pub fn write_superblock<D: BlockDevice + ?Sized>(device: &D, superblock: &SuperBlock) {
    let mut buf: DataBlock = [0; BLOCK_SIZE];
    superblock.encode(&mut buf);
    device.write_block(SUPERBLOCK_ID, &buf);
}

/// Zeroes every block of the volume and persists a fresh superblock.
pub fn format_volume<D: BlockDevice + ?Sized>(device: &D) -> Result<SuperBlock> {
    if device.num_blocks() < FS_SIZE {
        return Err(FsError::DeviceTooSmall {
            required: FS_SIZE,
            actual: device.num_blocks(),
        });
    }

    let zero: DataBlock = [0; BLOCK_SIZE];
    for block_id in 0..FS_SIZE {
        device.write_block(block_id, &zero);
    }

    let superblock = SuperBlock::new();
    write_superblock(device, &superblock);
    Ok(superblock)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_dev::RamDisk;

    #[test]
    fn test_read_superblock() {
        let rd = RamDisk::new(FS_SIZE);
        assert_eq!(read_superblock(&rd), Ok(None));

        let sb = format_volume(&rd).unwrap();
        assert_eq!(read_superblock(&rd), Ok(Some(sb)));

        let shifted = SuperBlock {
            data_blocks: sb.data_blocks + 1,
            ..sb
        };
        write_superblock(&rd, &shifted);
        assert!(matches!(read_superblock(&rd), Err(FsError::Inconsistent(_))));
    }
}
