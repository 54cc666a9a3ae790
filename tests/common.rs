//! Common utilities for tests
#![allow(dead_code)]

use std::sync::Arc;

use lepton::*;

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fresh_fs() -> FileSystem<RamDisk> {
    setup();
    FileSystem::mount(Arc::new(RamDisk::new(FS_SIZE))).unwrap()
}

pub fn write_file(fs: &mut FileSystem<impl BlockDevice>, name: &str, data: &[u8]) {
    let fd = fs.open(name, OpenFlag::WRONLY.into()).unwrap();
    assert_eq!(fs.write(fd, data).unwrap(), data.len());
    fs.close(fd).unwrap();
}

pub fn read_file(fs: &mut FileSystem<impl BlockDevice>, name: &str) -> Vec<u8> {
    let fd = fs.open(name, BitFlags::empty()).unwrap();
    let mut buf = vec![0u8; MAX_FILE_SIZE];
    let n = fs.read(fd, &mut buf).unwrap();
    fs.close(fd).unwrap();
    buf.truncate(n);
    buf
}

pub fn entry_names(fs: &FileSystem<impl BlockDevice>) -> Vec<String> {
    fs.list()
        .unwrap()
        .iter()
        .map(|entry| entry.name().to_string())
        .collect()
}
