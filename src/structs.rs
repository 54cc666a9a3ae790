//! On-disk records and their binary codec.
//! Every field is fixed-width little-endian; the in-memory structs never
//! alias block buffers, callers decode into a local value, mutate it and
//! encode it back.

use crate::block_dev::DataBlock;
use crate::config::*;
use crate::error::{FsError, Result};

fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,         // Magic number to identify the filesystem
    pub fs_size: u32,       // Total number of blocks in the filesystem
    pub inode_start: u32,   // Block number where the inode table starts
    pub inode_count: u32,   // Number of inodes that can be allocated
    pub inode_blocks: u32,  // Size of the inode table in blocks
    pub bitmap_start: u32,  // Block number where the block bitmap starts
    pub bitmap_blocks: u32, // Size of the block bitmap in blocks
    pub data_start: u32,    // Block number where data blocks start
    pub data_blocks: u32,   // Number of data blocks, one per bitmap slot
}

impl SuperBlock {
    /// Computes the volume layout from the compile-time geometry.
    pub fn new() -> Self {
        let inode_start = SUPERBLOCK_ID + 1;
        let bitmap_start = inode_start + INODE_TABLE_BLOCKS;
        let data_start = bitmap_start + BITMAP_BLOCKS;
        Self {
            magic: MAGIC,
            fs_size: FS_SIZE as u32,
            inode_start: inode_start as u32,
            inode_count: MAX_FILE_COUNT as u32,
            inode_blocks: INODE_TABLE_BLOCKS as u32,
            bitmap_start: bitmap_start as u32,
            bitmap_blocks: BITMAP_BLOCKS as u32,
            data_start: data_start as u32,
            data_blocks: MAX_FILE_COUNT as u32,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn encode(&self, buf: &mut DataBlock) {
        buf.fill(0);
        let fields = [
            self.magic,
            self.fs_size,
            self.inode_start,
            self.inode_count,
            self.inode_blocks,
            self.bitmap_start,
            self.bitmap_blocks,
            self.data_start,
            self.data_blocks,
        ];
        for (i, field) in fields.into_iter().enumerate() {
            put_u32(buf, i * 4, field);
        }
    }

    pub fn decode(buf: &DataBlock) -> Self {
        Self {
            magic: get_u32(buf, 0),
            fs_size: get_u32(buf, 4),
            inode_start: get_u32(buf, 8),
            inode_count: get_u32(buf, 12),
            inode_blocks: get_u32(buf, 16),
            bitmap_start: get_u32(buf, 20),
            bitmap_blocks: get_u32(buf, 24),
            data_start: get_u32(buf, 28),
            data_blocks: get_u32(buf, 32),
        }
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Free = 0,
    File = 1,
    Directory = 2,
}

impl TryFrom<u16> for FileType {
    type Error = FsError;

    fn try_from(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(FileType::Free),
            1 => Ok(FileType::File),
            2 => Ok(FileType::Directory),
            other => Err(FsError::Inconsistent(format!("unknown inode type {other}"))),
        }
    }
}

/// Inode record layout:
/// | type u16 | links u16 | open_count u16 | used_blocks u16 | size u32 | blocks [u32; INODE_ADDRS] |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub ftype: FileType,
    pub links: u16,
    pub open_count: u16,
    pub used_blocks: u16,
    pub size: u32,
    /// Data-region slot indices, only the first `used_blocks` are meaningful.
    pub blocks: [u32; INODE_ADDRS],
}

impl Inode {
    pub const FREE: Self = Self {
        ftype: FileType::Free,
        links: 0,
        open_count: 0,
        used_blocks: 0,
        size: 0,
        blocks: [0; INODE_ADDRS],
    };

    /// A freshly created inode, named by exactly one directory entry.
    pub fn new(ftype: FileType) -> Self {
        Self {
            ftype,
            links: 1,
            ..Self::FREE
        }
    }

    pub fn is_free(&self) -> bool {
        self.ftype == FileType::Free
    }

    pub fn is_dir(&self) -> bool {
        self.ftype == FileType::Directory
    }

    pub fn owned_blocks(&self) -> &[u32] {
        &self.blocks[..self.used_blocks as usize]
    }

    pub fn encode(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), INODE_SIZE);
        put_u16(buf, 0, self.ftype as u16);
        put_u16(buf, 2, self.links);
        put_u16(buf, 4, self.open_count);
        put_u16(buf, 6, self.used_blocks);
        put_u32(buf, 8, self.size);
        for (i, &block) in self.blocks.iter().enumerate() {
            put_u32(buf, 12 + i * 4, block);
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        assert_eq!(buf.len(), INODE_SIZE);
        let mut blocks = [0; INODE_ADDRS];
        for (i, block) in blocks.iter_mut().enumerate() {
            *block = get_u32(buf, 12 + i * 4);
        }
        let inode = Self {
            ftype: FileType::try_from(get_u16(buf, 0))?,
            links: get_u16(buf, 2),
            open_count: get_u16(buf, 4),
            used_blocks: get_u16(buf, 6),
            size: get_u32(buf, 8),
            blocks,
        };
        if inode.used_blocks as usize > INODE_ADDRS {
            return Err(FsError::Inconsistent(format!(
                "inode claims {} blocks",
                inode.used_blocks
            )));
        }
        Ok(inode)
    }
}

/// A single name component: non-empty, at most `MAX_FILE_NAME_LEN` bytes,
/// no '/' and no NUL.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
        return Err(FsError::InvalidName);
    }
    if name.bytes().any(|c| c == b'/' || c == 0) {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

/// Directory entry layout: | inode u32 | name [u8; MAX_FILE_NAME_LEN], NUL padded |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_id: u32,
    name: [u8; MAX_FILE_NAME_LEN],
}

impl DirEntry {
    pub fn new(inode_id: u32, name: &str) -> Result<Self> {
        check_name(name)?;
        let mut arr = [0; MAX_FILE_NAME_LEN];
        arr[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self { inode_id, name: arr })
    }

    fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_FILE_NAME_LEN);
        &self.name[..len]
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(self.name_bytes()).unwrap_or_default()
    }

    pub fn name_eq(&self, name: &str) -> bool {
        self.name_bytes() == name.as_bytes()
    }

    pub fn encode(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), DIR_ENTRY_SIZE);
        put_u32(buf, 0, self.inode_id);
        buf[4..].copy_from_slice(&self.name);
    }

    pub fn decode(buf: &[u8]) -> Self {
        assert_eq!(buf.len(), DIR_ENTRY_SIZE);
        let mut name = [0; MAX_FILE_NAME_LEN];
        name.copy_from_slice(&buf[4..]);
        Self {
            inode_id: get_u32(buf, 0),
            name,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_superblock_layout() {
        let sb = SuperBlock::new();
        assert_eq!(sb.inode_start, 1);
        assert_eq!(sb.inode_blocks as usize, (MAX_FILE_COUNT * INODE_SIZE).div_ceil(BLOCK_SIZE));
        assert_eq!(sb.bitmap_start, sb.inode_start + sb.inode_blocks);
        assert_eq!(sb.data_start, sb.bitmap_start + sb.bitmap_blocks);
        assert!(sb.data_start + sb.data_blocks <= sb.fs_size);

        let mut buf = [0u8; BLOCK_SIZE];
        sb.encode(&mut buf);
        assert_eq!(&buf[..4], &MAGIC.to_le_bytes());
        assert_eq!(SuperBlock::decode(&buf), sb);
    }

    #[test]
    fn test_inode_codec_is_little_endian() {
        let mut inode = Inode::new(FileType::Directory);
        inode.size = 0x0102_0304;
        inode.used_blocks = 2;
        inode.blocks[0] = 7;
        inode.blocks[1] = 0x0a0b;

        let mut buf = [0u8; INODE_SIZE];
        inode.encode(&mut buf);
        assert_eq!(&buf[0..2], &[2, 0]);
        assert_eq!(&buf[2..4], &[1, 0]);
        assert_eq!(&buf[8..12], &[4, 3, 2, 1]);
        assert_eq!(&buf[16..20], &[0x0b, 0x0a, 0, 0]);
        assert_eq!(Inode::decode(&buf).unwrap(), inode);
    }

    #[test]
    fn test_inode_record_has_no_padding() {
        assert_eq!(INODE_SIZE, 44);
        assert_eq!(INODE_TABLE_BLOCKS, 86);

        // A free record overwrites every byte of its slot.
        let mut buf = [0xeeu8; INODE_SIZE];
        Inode::FREE.encode(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));

        // The last block pointer ends exactly at the record end.
        let mut inode = Inode::new(FileType::File);
        inode.blocks[INODE_ADDRS - 1] = 0x0403_0201;
        inode.encode(&mut buf);
        assert_eq!(&buf[INODE_SIZE - 4..], &[1, 2, 3, 4]);
        assert_eq!(Inode::decode(&buf), Ok(inode));
    }

    #[test]
    fn test_inode_decode_rejects_garbage() {
        let mut buf = [0u8; INODE_SIZE];
        buf[0] = 9;
        assert!(matches!(Inode::decode(&buf), Err(FsError::Inconsistent(_))));

        let mut buf = [0u8; INODE_SIZE];
        buf[6] = INODE_ADDRS as u8 + 1;
        assert!(matches!(Inode::decode(&buf), Err(FsError::Inconsistent(_))));
    }

    #[test]
    fn test_name_rules() {
        assert!(check_name("a.txt").is_ok());
        assert!(check_name(&"x".repeat(MAX_FILE_NAME_LEN)).is_ok());
        assert_eq!(check_name(""), Err(FsError::InvalidName));
        assert_eq!(check_name(&"x".repeat(MAX_FILE_NAME_LEN + 1)), Err(FsError::InvalidName));
        assert_eq!(check_name("a/b"), Err(FsError::InvalidName));
        assert_eq!(check_name("a\0"), Err(FsError::InvalidName));
    }

    #[test]
    fn test_dir_entry_name() {
        let full = "y".repeat(MAX_FILE_NAME_LEN);
        let entry = DirEntry::new(3, &full).unwrap();
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        entry.encode(&mut buf);
        let decoded = DirEntry::decode(&buf);
        assert_eq!(decoded.inode_id, 3);
        assert_eq!(decoded.name(), full);

        let short = DirEntry::new(4, "test").unwrap();
        assert!(short.name_eq("test"));
        assert!(!short.name_eq("test1"));
        assert!(!short.name_eq("tes"));
    }
}
