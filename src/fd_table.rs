//! Open file descriptors: which inode, opened how, and where the cursor is.

use alloc::vec;
use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use crate::config::MAX_OPEN_FILES;
use crate::error::{FsError, Result};

/// Open flags. No flag at all means read-only.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// Write only
    WRONLY = 0b01,
    /// Read and write
    RDWR = 0b10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn from_flags(flags: BitFlags<OpenFlag>) -> Result<Self> {
        match (flags.contains(OpenFlag::WRONLY), flags.contains(OpenFlag::RDWR)) {
            (false, false) => Ok(AccessMode::ReadOnly),
            (true, false) => Ok(AccessMode::WriteOnly),
            (false, true) => Ok(AccessMode::ReadWrite),
            (true, true) => Err(FsError::InvalidFlags),
        }
    }

    pub fn readable(self) -> bool {
        self != AccessMode::WriteOnly
    }

    pub fn writable(self) -> bool {
        self != AccessMode::ReadOnly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode_id: u32,
    pub mode: AccessMode,
    /// Absolute byte offset, independent per descriptor.
    pub cursor: usize,
}

#[derive(Debug)]
pub struct FdTable {
    slots: Vec<Option<OpenFile>>,
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_OPEN_FILES],
        }
    }

    /// Takes the lowest free slot, cursor at 0.
    pub fn open(&mut self, inode_id: u32, mode: AccessMode) -> Result<usize> {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)?;
        self.slots[fd] = Some(OpenFile {
            inode_id,
            mode,
            cursor: 0,
        });
        Ok(fd)
    }

    /// Frees the slot and hands back what was open there.
    /// Inode bookkeeping is the caller's business.
    pub fn close(&mut self, fd: usize) -> Result<OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(FsError::BadDescriptor(fd))
    }

    #[cfg(test)]
    pub fn get(&self, fd: usize) -> Result<&OpenFile> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FsError::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::BadDescriptor(fd))
    }

    pub fn clear(&mut self) {
        self.slots.fill(None);
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
