pub const MAGIC: u32 = 0xa455;

pub const BLOCK_SIZE: usize = 512;
pub const FS_SIZE: usize = 2048; // Volume size in blocks
pub const SUPERBLOCK_ID: usize = 0; // Block ID for the superblock
pub const ROOT_INODE_ID: u32 = 0; // Inode ID for the root directory

pub const MAX_FILE_COUNT: usize = 1000; // Number of inodes, also number of data blocks
pub const INODE_ADDRS: usize = 8; // Number of direct pointers in an inode
pub const INODE_SIZE: usize = 12 + 4 * INODE_ADDRS; // Encoded size, records may straddle blocks
pub const MAX_FILE_SIZE: usize = INODE_ADDRS * BLOCK_SIZE;

pub const MAX_FILE_NAME_LEN: usize = 32;
pub const DIR_ENTRY_SIZE: usize = 4 + MAX_FILE_NAME_LEN; // inode ID + name
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;
pub const MAX_DIR_ENTRIES: usize = INODE_ADDRS * ENTRIES_PER_BLOCK;
pub const DOT_NAME: &str = ".";
pub const DOTDOT_NAME: &str = "..";

pub const MAX_OPEN_FILES: usize = MAX_FILE_COUNT;

pub const fn ceil_div(m: usize, n: usize) -> usize {
    m.div_ceil(n)
}

pub const INODE_TABLE_BLOCKS: usize = ceil_div(MAX_FILE_COUNT * INODE_SIZE, BLOCK_SIZE);
pub const BITMAP_BLOCKS: usize = ceil_div(MAX_FILE_COUNT, BLOCK_SIZE);
