//! The fixed 96-byte archive header: parsing, validation, and flag
//! introspection.

use deku::prelude::*;
use tracing::{error, info};

use crate::compressor::Compressor;
use crate::error::SqshError;

/// `0x73717368` read little-endian, `"hsqs"` on disk.
pub const MAGIC: [u8; 4] = *b"hsqs";

pub const MIN_BLOCK_SIZE: u32 = 0x1000;
pub const MAX_BLOCK_SIZE: u32 = 0x10_0000;

/// `0xFFFF_FFFF_FFFF_FFFF`: sentinel meaning "this optional table is absent".
pub const NOT_SET: u64 = 0xffff_ffff_ffff_ffff;

/// Fixed 96-byte archive header. See the on-disk format reference, `§3.2`,
/// for field-by-field semantics.
#[derive(Debug, Copy, Clone, DekuRead, DekuWrite, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct SuperBlock {
    #[deku(assert_eq = "MAGIC")]
    pub magic: [u8; 4],
    pub inode_count: u32,
    pub mod_time: u32,
    pub block_size: u32,
    pub frag_count: u32,
    pub compressor: Compressor,
    pub block_log: u16,
    pub flags: u16,
    pub id_count: u16,
    pub version_major: u16,
    pub version_minor: u16,
    /// Packed `(outer_offset, inner_offset)`, see [`crate::inode::InodeRef`].
    pub root_inode_ref: u64,
    pub bytes_used: u64,
    pub id_table_start: u64,
    pub xattr_id_table_start: u64,
    pub inode_table_start: u64,
    pub directory_table_start: u64,
    pub fragment_table_start: u64,
    pub export_table_start: u64,
}

#[rustfmt::skip]
#[allow(dead_code)]
#[derive(Debug, Copy, Clone)]
pub(crate) enum Flags {
    InodesStoredUncompressed    = 0b0000_0000_0000_0001,
    DataBlockStoredUncompressed = 0b0000_0000_0000_0010,
    Unused                      = 0b0000_0000_0000_0100,
    FragmentsStoredUncompressed = 0b0000_0000_0000_1000,
    FragmentsAreNotUsed         = 0b0000_0000_0001_0000,
    FragmentsAreAlwaysGenerated = 0b0000_0000_0010_0000,
    DataHasBeenDeduplicated     = 0b0000_0000_0100_0000,
    NFSExportTableExists        = 0b0000_0000_1000_0000,
    XattrsAreStoredUncompressed = 0b0000_0001_0000_0000,
    NoXattrsInArchive           = 0b0000_0010_0000_0000,
    CompressorOptionsArePresent = 0b0000_0100_0000_0000,
}

impl SuperBlock {
    pub fn inodes_uncompressed(&self) -> bool {
        self.flags & Flags::InodesStoredUncompressed as u16 != 0
    }

    pub fn data_block_stored_uncompressed(&self) -> bool {
        self.flags & Flags::DataBlockStoredUncompressed as u16 != 0
    }

    pub fn fragments_stored_uncompressed(&self) -> bool {
        self.flags & Flags::FragmentsStoredUncompressed as u16 != 0
    }

    pub fn fragments_are_not_used(&self) -> bool {
        self.flags & Flags::FragmentsAreNotUsed as u16 != 0
    }

    pub fn fragments_are_always_generated(&self) -> bool {
        self.flags & Flags::FragmentsAreAlwaysGenerated as u16 != 0
    }

    pub fn data_has_been_deduplicated(&self) -> bool {
        self.flags & Flags::DataHasBeenDeduplicated as u16 != 0
    }

    pub fn xattrs_are_stored_uncompressed(&self) -> bool {
        self.flags & Flags::XattrsAreStoredUncompressed as u16 != 0
    }

    pub fn compressor_options_are_present(&self) -> bool {
        self.flags & Flags::CompressorOptionsArePresent as u16 != 0
    }

    /// Whether a fragment table is present. Named to match the common
    /// `has_*` accessor convention rather than exposing the raw (inverted)
    /// on-disk flag bit.
    pub fn has_fragments(&self) -> bool {
        !self.fragments_are_not_used() && self.fragment_table_start != NOT_SET
    }

    pub fn has_export_table(&self) -> bool {
        self.flags & Flags::NFSExportTableExists as u16 != 0 && self.export_table_start != NOT_SET
    }

    pub fn has_xattr_table(&self) -> bool {
        self.flags & Flags::NoXattrsInArchive as u16 == 0 && self.xattr_id_table_start != NOT_SET
    }

    /// Validate the invariants from `§3.2`: magic, `block_log == log2(block_size)`,
    /// `bytes_used <= mapper_size - archive_offset`, version `== 4.0`.
    pub fn validate(&self, mapper_size: u64) -> Result<(), SqshError> {
        if self.magic != MAGIC {
            error!("bad magic");
            return Err(SqshError::WrongMagic);
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
            || !self.block_size.is_power_of_two()
            || 1u32.checked_shl(self.block_log as u32) != Some(self.block_size)
        {
            error!(block_size = self.block_size, block_log = self.block_log, "block size/log mismatch");
            return Err(SqshError::BlocksizeMismatch);
        }
        if self.bytes_used > mapper_size {
            error!(bytes_used = self.bytes_used, mapper_size, "bytes_used exceeds archive size");
            return Err(SqshError::SizeMismatch);
        }
        if self.version_major != 4 || self.version_minor != 0 {
            error!(major = self.version_major, minor = self.version_minor, "unsupported version");
            return Err(SqshError::WrongMagic);
        }
        info!(
            block_size = self.block_size,
            inode_count = self.inode_count,
            compressor = ?self.compressor,
            "superblock validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SuperBlock {
        SuperBlock {
            magic: MAGIC,
            inode_count: 2,
            mod_time: 0,
            block_size: 131072,
            frag_count: 0,
            compressor: Compressor::Xz,
            block_log: 17,
            flags: 0,
            id_count: 1,
            version_major: 4,
            version_minor: 0,
            root_inode_ref: 0,
            bytes_used: 200,
            id_table_start: 100,
            xattr_id_table_start: NOT_SET,
            inode_table_start: 96,
            directory_table_start: 150,
            fragment_table_start: NOT_SET,
            export_table_start: NOT_SET,
        }
    }

    #[test]
    fn validates_clean_superblock() {
        sample().validate(1000).unwrap();
    }

    #[test]
    fn rejects_bad_magic() {
        let mut sb = sample();
        sb.magic = *b"xxxx";
        assert!(matches!(sb.validate(1000), Err(SqshError::WrongMagic)));
    }

    #[test]
    fn rejects_block_log_mismatch() {
        let mut sb = sample();
        sb.block_log = 16;
        assert!(matches!(sb.validate(1000), Err(SqshError::BlocksizeMismatch)));
    }

    #[test]
    fn rejects_bytes_used_past_archive() {
        let sb = sample();
        assert!(matches!(sb.validate(50), Err(SqshError::SizeMismatch)));
    }

    #[test]
    fn has_fragments_respects_flag_and_sentinel() {
        let mut sb = sample();
        assert!(!sb.has_fragments());
        sb.fragment_table_start = 500;
        assert!(sb.has_fragments());
        sb.flags |= Flags::FragmentsAreNotUsed as u16;
        assert!(!sb.has_fragments());
    }
}
