use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::NamedTempFile;

mod common;

use common::{entry_names, read_file, setup, write_file};
use lepton::*;

/// Block device backed by a host file.
pub struct VirtDisk {
    inner: Mutex<File>,
    num_blocks: usize,
}

impl VirtDisk {
    pub fn new(file: File, num_blocks: usize) -> Self {
        file.set_len((num_blocks * BLOCK_SIZE) as u64).unwrap();
        VirtDisk {
            inner: Mutex::new(file),
            num_blocks,
        }
    }
}

impl BlockDevice for VirtDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut DataBlock) {
        assert!(block_id < self.num_blocks);
        let mut inner = self.inner.lock().unwrap();
        inner.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64)).unwrap();
        inner.read_exact(buf).unwrap();
    }

    fn write_block(&self, block_id: usize, buf: &DataBlock) {
        assert!(block_id < self.num_blocks);
        let mut inner = self.inner.lock().unwrap();
        inner.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64)).unwrap();
        inner.write_all(buf).unwrap();
    }
}

fn open_disk(image: &NamedTempFile, num_blocks: usize) -> Arc<VirtDisk> {
    Arc::new(VirtDisk::new(image.reopen().unwrap(), num_blocks))
}

#[test]
fn test_disk_survives_reopen() {
    setup();
    let image = NamedTempFile::new().unwrap();
    let payload: Vec<u8> = (0..3000).map(|i| (i % 251) as u8).collect();

    {
        let mut fs = FileSystem::mount(open_disk(&image, FS_SIZE)).unwrap();
        write_file(&mut fs, "payload", &payload);
        fs.mkdir("sub").unwrap();
        fs.cd("sub").unwrap();
        write_file(&mut fs, "inner", b"inside");
        fs.cd("..").unwrap();
        fs.link("payload", "alias").unwrap();
    }

    let mut fs = FileSystem::mount(open_disk(&image, FS_SIZE)).unwrap();
    assert_eq!(entry_names(&fs), [".", "..", "payload", "sub", "alias"]);
    assert_eq!(fs.stat("alias").unwrap().links, 2);
    assert_eq!(read_file(&mut fs, "alias"), payload);
    fs.cd("sub").unwrap();
    assert_eq!(read_file(&mut fs, "inner"), b"inside");
    assert_eq!(fs.check().unwrap(), Usage { inodes: 4, blocks: 9 });
}

#[test]
fn test_mount_is_idempotent() {
    setup();
    let image = NamedTempFile::new().unwrap();
    {
        let mut fs = FileSystem::mount(open_disk(&image, FS_SIZE)).unwrap();
        write_file(&mut fs, "f", b"once");
    }

    for _ in 0..3 {
        let mut fs = FileSystem::mount(open_disk(&image, FS_SIZE)).unwrap();
        assert_eq!(read_file(&mut fs, "f"), b"once");
        assert_eq!(fs.check().unwrap(), Usage { inodes: 2, blocks: 2 });
    }
}

#[test]
fn test_garbage_image_is_formatted() {
    setup();
    let image = NamedTempFile::new().unwrap();
    {
        let mut file = image.reopen().unwrap();
        let mut noise = vec![0u8; FS_SIZE * BLOCK_SIZE];
        StdRng::seed_from_u64(0x1e9).fill_bytes(&mut noise);
        file.write_all(&noise).unwrap();
    }

    let fs = FileSystem::mount(open_disk(&image, FS_SIZE)).unwrap();
    assert_eq!(entry_names(&fs), [".", ".."]);
    assert_eq!(fs.check().unwrap(), Usage { inodes: 1, blocks: 1 });
    assert_eq!(read_superblock(&*fs.device()), Ok(Some(SuperBlock::new())));
}

#[test]
fn test_blocks_past_volume_untouched() {
    setup();
    let image = NamedTempFile::new().unwrap();
    let disk = open_disk(&image, FS_SIZE + 1);
    let marker = [0xa5u8; BLOCK_SIZE];
    disk.write_block(FS_SIZE, &marker);

    let mut fs = FileSystem::mount(Arc::clone(&disk)).unwrap();
    write_file(&mut fs, "f", &[1u8; MAX_FILE_SIZE]);
    fs.mkfs().unwrap();

    let mut block = [0u8; BLOCK_SIZE];
    disk.read_block(FS_SIZE, &mut block);
    assert_eq!(block, marker);
}

#[test]
fn test_foreign_layout_is_rejected() {
    setup();
    let image = NamedTempFile::new().unwrap();
    {
        let mut fs = FileSystem::mount(open_disk(&image, FS_SIZE)).unwrap();
        write_file(&mut fs, "f", b"data");
    }

    // Right magic number, inode table placed outside the volume.
    let disk = open_disk(&image, FS_SIZE);
    let foreign = SuperBlock {
        inode_start: 5000,
        ..SuperBlock::new()
    };
    write_superblock(&*disk, &foreign);
    assert!(matches!(
        FileSystem::mount(Arc::clone(&disk)),
        Err(Error::Inconsistent(_))
    ));

    // The volume is left alone, restoring block 0 brings the data back.
    write_superblock(&*disk, &SuperBlock::new());
    let mut fs = FileSystem::mount(disk).unwrap();
    assert_eq!(read_file(&mut fs, "f"), b"data");
}
