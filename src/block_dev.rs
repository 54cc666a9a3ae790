use alloc::vec;
use alloc::vec::Vec;
use std::sync::Mutex;

use crate::config::BLOCK_SIZE;

pub type DataBlock = [u8; BLOCK_SIZE];

/// A fixed-capacity array of equally sized blocks.
/// Reads and writes are synchronous and always succeed; out-of-range
/// block IDs are a caller bug.
pub trait BlockDevice: Send + Sync {
    /// Returns the number of blocks in the block device.
    fn num_blocks(&self) -> usize;

    /// Reads a block of data from the block device.
    fn read_block(&self, block_id: usize, buf: &mut DataBlock);

    /// Writes a block of data to the block device.
    fn write_block(&self, block_id: usize, buf: &DataBlock);
}

/// Volatile in-memory block device.
pub struct RamDisk {
    inner: Mutex<Vec<u8>>,
    num_blocks: usize,
}

impl RamDisk {
    /// Creates a new zeroed RamDisk with the specified number of blocks.
    pub fn new(num_blocks: usize) -> Self {
        RamDisk {
            inner: Mutex::new(vec![0u8; num_blocks * BLOCK_SIZE]),
            num_blocks,
        }
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut DataBlock) {
        assert!(block_id < self.num_blocks, "block {block_id} out of range");
        let start = block_id * BLOCK_SIZE;
        let data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.copy_from_slice(&data[start..start + BLOCK_SIZE]);
    }

    fn write_block(&self, block_id: usize, buf: &DataBlock) {
        assert!(block_id < self.num_blocks, "block {block_id} out of range");
        let start = block_id * BLOCK_SIZE;
        let mut data = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        data[start..start + BLOCK_SIZE].copy_from_slice(buf);
    }
}
