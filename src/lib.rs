//! Lepton is a tiny Unix-like file system living on a fixed-size block device.
//! For simplicity, no support for permissions, timestamps, indirect blocks or journaling.
//!
//! Lepton File System's linear layout:
//! - Superblock (block 0)
//! - Inode Table
//! - Block Bitmap
//! - Data Blocks (one per bitmap slot)
//!
//! Lepton's layers (from bottom to top):
//! 1. Block Device: Abstraction for low level devices.          | User implemented, `RamDisk` provided
//! 2. Bitmap: First-fit data block allocation.                   | Fs implemented
//! 3. Inode: File metadata with direct block pointers.           | Fs implemented
//! 4. Directory: Dense entry arrays with swap-removal.           | Fs implemented
//! 5. File: Byte reads and writes over an inode's blocks.        | Fs implemented
//! 6. FileSystem: Session with working directory and descriptors | Fs implemented
//!
//! Every operation reads what it needs from the device, mutates a local
//! copy and writes it back before returning. There is no block cache.

extern crate alloc;

mod config;
mod block_dev;
mod structs;
mod bitmap;
mod superblock;
mod inode;
mod directory;
mod file;
mod fd_table;
mod fs;
mod error;

pub use block_dev::{BlockDevice, DataBlock, RamDisk};
pub use config::*;
pub use superblock::*;
pub use structs::*;
pub use inode::{alloc_inode, free_inode, read_inode, write_inode};
pub use directory::{dir_add_entry, dir_lookup, dir_remove_entry, read_dir};
pub use fd_table::{AccessMode, OpenFlag};
pub use fs::*;
pub use error::FsError as Error;
pub use error::Result;

pub use enumflags2::BitFlags;
