use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no free data blocks")]
    NoFreeBlocks,

    #[error("no free inodes")]
    NoFreeInodes,

    #[error("too many open files")]
    TooManyOpenFiles,

    #[error("directory is full")]
    DirectoryFull,

    #[error("no such file or directory")]
    NotFound,

    #[error("file already exists")]
    AlreadyExists,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("invalid file name")]
    InvalidName,

    #[error("'.' and '..' cannot be removed")]
    ReservedName,

    #[error("invalid open flags")]
    InvalidFlags,

    #[error("invalid seek offset {0}")]
    InvalidOffset(i64),

    #[error("bad file descriptor {0}")]
    BadDescriptor(usize),

    #[error("descriptor not opened for reading")]
    NotReadable,

    #[error("descriptor not opened for writing")]
    NotWritable,

    #[error("file too large")]
    FileTooLarge,

    #[error("device too small: need {required} blocks, got {actual}")]
    DeviceTooSmall { required: usize, actual: usize },

    #[error("inconsistent file system: {0}")]
    Inconsistent(String),
}

pub type Result<T> = core::result::Result<T, FsError>;
