use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use enumflags2::BitFlags;
use log::{debug, info, warn};

use crate::bitmap::{count_used_blocks, is_block_used};
use crate::block_dev::BlockDevice;
use crate::config::*;
use crate::directory::{dir_add_entry, dir_is_empty, dir_lookup, dir_remove_entry, read_dir};
use crate::error::{FsError, Result};
use crate::fd_table::{AccessMode, FdTable, OpenFlag};
use crate::file::{fread, fwrite};
use crate::inode::{alloc_inode, free_inode, read_inode, release_inode, write_inode};
use crate::structs::*;
use crate::superblock::{format_volume, read_superblock};

/// What `stat` reports about a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode_id: u32,
    pub ftype: FileType,
    pub links: u16,
    pub size: u32,
    pub blocks: u16,
}

/// Live inodes and used data blocks, as counted by `FileSystem::check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub inodes: usize,
    pub blocks: usize,
}

/// One mounted session over a volume.
///
/// The session owns the working directory and the descriptor table, so
/// sessions over different devices can exist side by side. A device takes
/// one session at a time: mounting it again drops the open counts of the
/// previous session's descriptors.
/// Every method writes its changes to the device before returning; nothing
/// is cached between calls.
/// Methods take `&mut self`, user should wrap a lock around it if needed.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    device: Arc<D>,
    superblock: SuperBlock,
    cwd: u32,
    cwd_path: String,
    fds: FdTable,
}

/// Writes the inode back, or frees it once nothing refers to it any more.
fn settle<D: BlockDevice + ?Sized>(
    device: &D,
    superblock: &SuperBlock,
    inode_id: u32,
    inode: &Inode,
) -> Result<()> {
    if inode.links == 0 && inode.open_count == 0 {
        free_inode(device, superblock, inode_id)
    } else {
        write_inode(device, superblock, inode_id, inode);
        Ok(())
    }
}

/// Lays out a fresh volume with a root directory holding '.' and '..'.
fn format_device<D: BlockDevice + ?Sized>(device: &D) -> Result<SuperBlock> {
    let superblock = format_volume(device)?;
    let root = alloc_inode(device, &superblock, FileType::Directory)?;
    assert_eq!(root, ROOT_INODE_ID);

    let seeded = dir_add_entry(device, &superblock, root, root, DOT_NAME)
        .and_then(|_| dir_add_entry(device, &superblock, root, root, DOTDOT_NAME));
    if let Err(e) = seeded {
        release_inode(device, &superblock, root)?;
        return Err(e);
    }

    info!("formatted volume: {superblock:?}");
    Ok(superblock)
}

/// Descriptors do not survive a mount: zero stale open counts and free
/// inodes that were unlinked while still open.
fn reclaim_orphans<D: BlockDevice + ?Sized>(device: &D, superblock: &SuperBlock) -> Result<()> {
    for inode_id in 0..superblock.inode_count {
        let mut inode = read_inode(device, superblock, inode_id)?;
        if inode.is_free() || inode.open_count == 0 {
            continue;
        }
        inode.open_count = 0;
        if inode.links == 0 {
            warn!("reclaiming orphan inode {inode_id}");
        }
        settle(device, superblock, inode_id, &inode)?;
    }
    Ok(())
}

impl<D: BlockDevice> FileSystem<D> {
    fn with_superblock(device: Arc<D>, superblock: SuperBlock) -> Self {
        Self {
            device,
            superblock,
            cwd: ROOT_INODE_ID,
            cwd_path: String::from("/"),
            fds: FdTable::new(),
        }
    }

    /// Mounts the volume, formatting it first if block 0 carries no valid
    /// magic number. Existing contents are trusted as they are.
    pub fn mount(device: Arc<D>) -> Result<Self> {
        if device.num_blocks() < FS_SIZE {
            return Err(FsError::DeviceTooSmall {
                required: FS_SIZE,
                actual: device.num_blocks(),
            });
        }

        let superblock = match read_superblock(&*device)? {
            Some(superblock) => {
                info!("mounting formatted volume");
                reclaim_orphans(&*device, &superblock)?;
                superblock
            }
            None => {
                info!("volume not formatted, formatting");
                format_device(&*device)?
            }
        };
        Ok(Self::with_superblock(device, superblock))
    }

    /// Formats the volume unconditionally and mounts it.
    pub fn format(device: Arc<D>) -> Result<Self> {
        let superblock = format_device(&*device)?;
        Ok(Self::with_superblock(device, superblock))
    }

    /// Reinitializes the volume to an empty root directory.
    /// All descriptors of this session are dropped.
    pub fn mkfs(&mut self) -> Result<()> {
        self.superblock = format_device(&*self.device)?;
        self.cwd = ROOT_INODE_ID;
        self.cwd_path = String::from("/");
        self.fds.clear();
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<u32> {
        check_name(name)?;
        dir_lookup(&*self.device, &self.superblock, self.cwd, name)
    }

    /// Fails with `AlreadyExists` if `name` is taken in the working directory.
    fn ensure_absent(&self, name: &str) -> Result<()> {
        match self.lookup(name) {
            Ok(_) => Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Opens `name` in the working directory.
    /// A missing name is created as an empty file when `flags` ask for write
    /// access. Returns the new descriptor.
    pub fn open(&mut self, name: &str, flags: BitFlags<OpenFlag>) -> Result<usize> {
        let mode = AccessMode::from_flags(flags)?;
        let found = self.lookup(name);
        let device = &*self.device;
        let superblock = &self.superblock;

        let (inode_id, created) = match found {
            Ok(inode_id) => (inode_id, false),
            Err(FsError::NotFound) if mode.writable() => {
                let inode_id = alloc_inode(device, superblock, FileType::File)?;
                if let Err(e) = dir_add_entry(device, superblock, self.cwd, inode_id, name) {
                    free_inode(device, superblock, inode_id)?;
                    return Err(e);
                }
                (inode_id, true)
            }
            Err(e) => return Err(e),
        };

        let mut inode = read_inode(device, superblock, inode_id)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }

        let fd = match self.fds.open(inode_id, mode) {
            Ok(fd) => fd,
            Err(e) => {
                if created {
                    dir_remove_entry(device, superblock, self.cwd, name)?;
                    free_inode(device, superblock, inode_id)?;
                }
                return Err(e);
            }
        };
        inode.open_count += 1;
        write_inode(device, superblock, inode_id, &inode);

        debug!("open '{name}' -> fd {fd} (inode {inode_id}, {mode:?})");
        Ok(fd)
    }

    /// Closes the descriptor; the inode goes away with its last link and
    /// last descriptor.
    pub fn close(&mut self, fd: usize) -> Result<()> {
        let file = self.fds.close(fd)?;
        let device = &*self.device;
        let mut inode = read_inode(device, &self.superblock, file.inode_id)?;
        if inode.is_free() || inode.open_count == 0 {
            return Err(FsError::Inconsistent(format!(
                "inode {} has no open descriptors",
                file.inode_id
            )));
        }
        inode.open_count -= 1;
        settle(device, &self.superblock, file.inode_id, &inode)
    }

    /// Reads up to `buf.len()` bytes at the cursor and advances it.
    /// Returns 0 at end of file.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let device = &*self.device;
        let superblock = &self.superblock;
        let file = self.fds.get_mut(fd)?;
        if !file.mode.readable() {
            return Err(FsError::NotReadable);
        }

        let inode = read_inode(device, superblock, file.inode_id)?;
        let bytes_read = fread(device, superblock, &inode, file.cursor, buf);
        file.cursor += bytes_read;
        Ok(bytes_read)
    }

    /// Writes at the cursor and advances it. Writing past the end
    /// zero-fills the gap; the file never grows past `MAX_FILE_SIZE`.
    pub fn write(&mut self, fd: usize, data: &[u8]) -> Result<usize> {
        let device = &*self.device;
        let superblock = &self.superblock;
        let file = self.fds.get_mut(fd)?;
        if !file.mode.writable() {
            return Err(FsError::NotWritable);
        }

        let mut inode = read_inode(device, superblock, file.inode_id)?;
        let bytes_written = fwrite(device, superblock, file.inode_id, &mut inode, file.cursor, data)?;
        file.cursor += bytes_written;
        Ok(bytes_written)
    }

    /// Moves the cursor to an absolute offset, possibly past the end.
    pub fn lseek(&mut self, fd: usize, offset: i64) -> Result<usize> {
        let file = self.fds.get_mut(fd)?;
        if offset < 0 {
            return Err(FsError::InvalidOffset(offset));
        }
        file.cursor = usize::try_from(offset).map_err(|_| FsError::InvalidOffset(offset))?;
        Ok(file.cursor)
    }

    pub fn mkdir(&mut self, name: &str) -> Result<()> {
        self.ensure_absent(name)?;
        let device = &*self.device;
        let superblock = &self.superblock;

        let dir_id = alloc_inode(device, superblock, FileType::Directory)?;
        let linked = dir_add_entry(device, superblock, dir_id, dir_id, DOT_NAME)
            .and_then(|_| dir_add_entry(device, superblock, dir_id, self.cwd, DOTDOT_NAME))
            .and_then(|_| dir_add_entry(device, superblock, self.cwd, dir_id, name));
        if let Err(e) = linked {
            warn!("mkdir '{name}' failed: {e}");
            free_inode(device, superblock, dir_id)?;
            return Err(e);
        }

        debug!("mkdir '{name}' -> inode {dir_id}");
        Ok(())
    }

    /// Removes an empty subdirectory of the working directory.
    pub fn rmdir(&mut self, name: &str) -> Result<()> {
        if name == DOT_NAME || name == DOTDOT_NAME {
            return Err(FsError::ReservedName);
        }
        let dir_id = self.lookup(name)?;
        let device = &*self.device;
        let superblock = &self.superblock;

        let mut dir = read_inode(device, superblock, dir_id)?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !dir_is_empty(device, superblock, dir_id)? {
            return Err(FsError::DirectoryNotEmpty);
        }

        dir_remove_entry(device, superblock, self.cwd, name)?;
        dir.links -= 1;
        settle(device, superblock, dir_id, &dir)
    }

    /// Changes the working directory to `.`, `..` or a subdirectory.
    pub fn cd(&mut self, name: &str) -> Result<()> {
        let target = self.lookup(name)?;
        if name == DOT_NAME {
            return Ok(());
        }
        if !read_inode(&*self.device, &self.superblock, target)?.is_dir() {
            return Err(FsError::NotADirectory);
        }

        self.cwd = target;
        if name == DOTDOT_NAME {
            let cut = self.cwd_path.rfind('/').unwrap_or(0);
            self.cwd_path.truncate(cut.max(1));
        } else {
            if self.cwd_path.len() > 1 {
                self.cwd_path.push('/');
            }
            self.cwd_path.push_str(name);
        }
        debug!("cd '{name}' -> inode {target} ({})", self.cwd_path);
        Ok(())
    }

    /// Adds `new_name` as another name for the file `old_name`.
    pub fn link(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.ensure_absent(new_name)?;
        let inode_id = self.lookup(old_name)?;
        let device = &*self.device;
        let superblock = &self.superblock;

        let mut inode = read_inode(device, superblock, inode_id)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        dir_add_entry(device, superblock, self.cwd, inode_id, new_name)?;
        inode.links += 1;
        write_inode(device, superblock, inode_id, &inode);
        Ok(())
    }

    /// Removes a file name. The data stays reachable through other links
    /// and open descriptors.
    pub fn unlink(&mut self, name: &str) -> Result<()> {
        let inode_id = self.lookup(name)?;
        let device = &*self.device;
        let superblock = &self.superblock;

        let mut inode = read_inode(device, superblock, inode_id)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        dir_remove_entry(device, superblock, self.cwd, name)?;
        inode.links -= 1;
        settle(device, superblock, inode_id, &inode)
    }

    pub fn stat(&self, name: &str) -> Result<Stat> {
        let inode_id = self.lookup(name)?;
        let inode = read_inode(&*self.device, &self.superblock, inode_id)?;
        Ok(Stat {
            inode_id,
            ftype: inode.ftype,
            links: inode.links,
            size: inode.size,
            blocks: inode.used_blocks,
        })
    }

    /// Absolute path of the working directory.
    pub fn pwd(&self) -> &str {
        &self.cwd_path
    }

    /// Entries of the working directory, '.' and '..' included.
    pub fn list(&self) -> Result<Vec<DirEntry>> {
        read_dir(&*self.device, &self.superblock, self.cwd)
    }

    /// Raw inode record, bypassing name resolution.
    pub fn inode(&self, inode_id: u32) -> Result<Inode> {
        if inode_id >= self.superblock.inode_count {
            return Err(FsError::NotFound);
        }
        read_inode(&*self.device, &self.superblock, inode_id)
    }

    /// Cross-checks the inode table against the bitmap: every used flag is
    /// owned by exactly one live inode, free inodes hold nothing, and sizes
    /// fit in the owned blocks.
    pub fn check(&self) -> Result<Usage> {
        let device = &*self.device;
        let superblock = &self.superblock;
        let mut owners: Vec<Option<u32>> = vec![None; superblock.data_blocks as usize];
        let mut usage = Usage { inodes: 0, blocks: 0 };

        for inode_id in 0..superblock.inode_count {
            let inode = read_inode(device, superblock, inode_id)?;
            if inode.is_free() {
                if inode.links != 0 || inode.open_count != 0 || inode.used_blocks != 0 {
                    return Err(FsError::Inconsistent(format!("free inode {inode_id} is not empty")));
                }
                continue;
            }

            usage.inodes += 1;
            if inode.size as usize > inode.used_blocks as usize * BLOCK_SIZE {
                return Err(FsError::Inconsistent(format!("inode {inode_id} size exceeds its blocks")));
            }
            for &slot in inode.owned_blocks() {
                let owner = owners
                    .get_mut(slot as usize)
                    .ok_or_else(|| FsError::Inconsistent(format!("inode {inode_id} owns bad slot {slot}")))?;
                if let Some(other) = owner.replace(inode_id) {
                    return Err(FsError::Inconsistent(format!(
                        "slot {slot} owned by inodes {other} and {inode_id}"
                    )));
                }
                if !is_block_used(device, superblock, slot) {
                    return Err(FsError::Inconsistent(format!("slot {slot} of inode {inode_id} marked free")));
                }
                usage.blocks += 1;
            }
        }

        let flagged = count_used_blocks(device, superblock);
        if flagged != usage.blocks {
            return Err(FsError::Inconsistent(format!(
                "{flagged} slots marked used, {} owned",
                usage.blocks
            )));
        }
        Ok(usage)
    }

    pub fn root_inode_id(&self) -> u32 {
        ROOT_INODE_ID
    }

    pub fn cwd_inode_id(&self) -> u32 {
        self.cwd
    }

    pub fn open_files(&self) -> usize {
        self.fds.open_count()
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }
}
