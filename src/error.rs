//! Errors

use std::io;

use thiserror::Error;

use crate::compressor::Compressor;

/// Errors generated by the core read path.
///
/// Variant names follow the error taxonomy of the on-disk format reference
/// one-to-one so a corrupted-archive failure can be matched on without
/// inspecting the message text.
#[derive(Error, Debug)]
pub enum SqshError {
    #[error("std io error: {0}")]
    StdIo(#[from] io::Error),

    #[error("deku error: {0:?}")]
    Deku(#[from] deku::DekuError),

    #[error("allocation failure")]
    Malloc,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("out of bounds access at index {0}")]
    OutOfBounds(u64),

    #[error("size mismatch")]
    SizeMismatch,

    #[error("block_log does not match block_size")]
    BlocksizeMismatch,

    #[error("superblock shorter than 96 bytes")]
    SuperblockTooSmall,

    #[error("magic bytes did not match 'hsqs'")]
    WrongMagic,

    #[error("unsupported compression: {0:?}")]
    CompressionUnsupported(Compressor),

    #[error("decompression failed")]
    CompressionDecompress,

    #[error("decompressor reported finished before consuming all input")]
    CompressionFinished,

    #[error("corrupted inode")]
    CorruptedInode,

    #[error("corrupted directory entry")]
    CorruptedDirectoryEntry,

    #[error("corrupted directory header")]
    CorruptedDirectoryHeader,

    #[error("not a directory")]
    NotADirectory,

    #[error("not a regular file")]
    NotAFile,

    #[error("not a symlink")]
    NotASymlink,

    #[error("no such file or directory")]
    NoSuchFile,

    #[error("no such element")]
    NoSuchElement,

    #[error("no such extended attribute")]
    NoSuchXattr,

    #[error("directory has no extended index")]
    NoExtendedDirectory,

    #[error("already at the root of the archive")]
    WalkerCannotGoUp,

    #[error("cursor is not positioned on a directory entry")]
    WalkerCannotGoDown,

    #[error("too many symlinks followed while resolving path")]
    TooManySymlinksFollowed,

    #[error("inode map is inconsistent")]
    InodeMapIsInconsistent,

    #[error("directory recursion detected")]
    DirectoryRecursion,

    #[error("mapper failed to initialize")]
    MapperInit,

    #[error("mapper failed to map a byte range")]
    MapperMap,

    #[error("invalid range header returned by remote mapper")]
    CurlInvalidRangeHeader,

    #[error("mutex lock failed")]
    MutexLockFailed,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<SqshError> for io::Error {
    fn from(value: SqshError) -> Self {
        use SqshError::*;
        match value {
            StdIo(io) => io,
            NoSuchFile => Self::from(io::ErrorKind::NotFound),
            CompressionUnsupported(_) => Self::from(io::ErrorKind::Unsupported),
            other => Self::new(io::ErrorKind::InvalidData, other),
        }
    }
}
