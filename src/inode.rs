//! [`Inode`] (`§3.4`): the 14 on-disk inode variants (1-7 basic, 8-14
//! extended), parsed directly off a metablock stream.
//!
//! Extended symlink/device/ipc (10-14) have no counterpart in the reader
//! this crate started from; their layouts come from the archive format's C
//! reference headers instead.

use std::sync::Arc;

use deku::reader::Reader as DekuReader_;
use deku::prelude::*;
use deku::DekuReader;

use crate::archive::Archive;
use crate::error::SqshError;
use crate::metablock::{MetablockIterator, MetablockReader};

pub(crate) const NO_FRAGMENT: u32 = 0xffff_ffff;
pub(crate) const NO_XATTR: u32 = 0xffff_ffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub id: InodeId,
    pub header: InodeHeader,
    pub inner: InodeInner,
}

impl Inode {
    /// Parse one inode straight off the inode metablock stream. `block_size`
    /// and `block_log` are needed to size the basic file's block list.
    pub fn read(
        reader: &mut MetablockReader,
        block_size: u32,
        block_log: u16,
    ) -> Result<Self, SqshError> {
        let mut deku_reader = DekuReader_::new(reader);
        let id = InodeId::from_reader_with_ctx(&mut deku_reader, deku::ctx::Endian::Little)?;
        let header =
            InodeHeader::from_reader_with_ctx(&mut deku_reader, deku::ctx::Endian::Little)?;
        let inner = InodeInner::from_reader_with_ctx(
            &mut deku_reader,
            (deku::ctx::Endian::Little, id, block_size, block_log),
        )?;
        Ok(Self { id, header, inner })
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.inner, InodeInner::BasicDirectory(_) | InodeInner::ExtendedDirectory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self.inner, InodeInner::BasicFile(_) | InodeInner::ExtendedFile(_))
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.inner, InodeInner::BasicSymlink(_) | InodeInner::ExtendedSymlink(_))
    }

    pub fn xattr_index(&self) -> Option<u32> {
        let idx = match &self.inner {
            InodeInner::ExtendedDirectory(d) => d.xattr_index,
            InodeInner::ExtendedFile(f) => f.xattr_index,
            InodeInner::ExtendedSymlink(s) => s.xattr_index,
            InodeInner::ExtendedBlockDevice(d) | InodeInner::ExtendedCharacterDevice(d) => {
                d.xattr_index
            }
            InodeInner::ExtendedNamedPipe(p) | InodeInner::ExtendedSocket(p) => p.xattr_index,
            _ => return None,
        };
        (idx != NO_XATTR).then_some(idx)
    }
}

#[derive(Debug, DekuRead, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u16")]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
#[rustfmt::skip]
pub enum InodeId {
    BasicDirectory          = 1,
    BasicFile               = 2,
    BasicSymlink            = 3,
    BasicBlockDevice        = 4,
    BasicCharacterDevice    = 5,
    BasicNamedPipe          = 6,
    BasicSocket             = 7,
    ExtendedDirectory       = 8,
    ExtendedFile            = 9,
    ExtendedSymlink         = 10,
    ExtendedBlockDevice     = 11,
    ExtendedCharacterDevice = 12,
    ExtendedNamedPipe       = 13,
    ExtendedSocket          = 14,
}

#[derive(Debug, DekuRead, Clone, Copy, PartialEq, Eq, Default)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct InodeHeader {
    pub permissions: u16,
    /// index into the id table
    pub uid: u16,
    /// index into the id table
    pub gid: u16,
    pub mtime: u32,
    pub inode_number: u32,
}

#[derive(Debug, DekuRead, Clone, PartialEq, Eq)]
#[deku(
    ctx = "endian: deku::ctx::Endian, id: InodeId, block_size: u32, block_log: u16",
    id = "id"
)]
pub enum InodeInner {
    #[deku(id = "InodeId::BasicDirectory")]
    BasicDirectory(#[deku(ctx = "endian")] BasicDirectory),
    #[deku(id = "InodeId::BasicFile")]
    BasicFile(#[deku(ctx = "endian, block_size, block_log")] BasicFile),
    #[deku(id = "InodeId::BasicSymlink")]
    BasicSymlink(#[deku(ctx = "endian")] BasicSymlink),
    #[deku(id = "InodeId::BasicBlockDevice")]
    BasicBlockDevice(#[deku(ctx = "endian")] BasicDevice),
    #[deku(id = "InodeId::BasicCharacterDevice")]
    BasicCharacterDevice(#[deku(ctx = "endian")] BasicDevice),
    #[deku(id = "InodeId::BasicNamedPipe")]
    BasicNamedPipe(#[deku(ctx = "endian")] BasicIpc),
    #[deku(id = "InodeId::BasicSocket")]
    BasicSocket(#[deku(ctx = "endian")] BasicIpc),
    #[deku(id = "InodeId::ExtendedDirectory")]
    ExtendedDirectory(#[deku(ctx = "endian")] ExtendedDirectory),
    #[deku(id = "InodeId::ExtendedFile")]
    ExtendedFile(#[deku(ctx = "endian, block_size, block_log")] ExtendedFile),
    #[deku(id = "InodeId::ExtendedSymlink")]
    ExtendedSymlink(#[deku(ctx = "endian")] ExtendedSymlink),
    #[deku(id = "InodeId::ExtendedBlockDevice")]
    ExtendedBlockDevice(#[deku(ctx = "endian")] ExtendedDevice),
    #[deku(id = "InodeId::ExtendedCharacterDevice")]
    ExtendedCharacterDevice(#[deku(ctx = "endian")] ExtendedDevice),
    #[deku(id = "InodeId::ExtendedNamedPipe")]
    ExtendedNamedPipe(#[deku(ctx = "endian")] ExtendedIpc),
    #[deku(id = "InodeId::ExtendedSocket")]
    ExtendedSocket(#[deku(ctx = "endian")] ExtendedIpc),
}

#[derive(Debug, DekuRead, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicDirectory {
    pub block_index: u32,
    pub link_count: u32,
    pub file_size: u16,
    pub block_offset: u16,
    pub parent_inode: u32,
}

#[derive(Debug, DekuRead, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedDirectory {
    pub link_count: u32,
    pub file_size: u32,
    pub block_index: u32,
    pub parent_inode: u32,
    #[deku(assert = "*index_count < 256")]
    pub index_count: u16,
    pub block_offset: u16,
    pub xattr_index: u32,
    #[deku(count = "*index_count")]
    pub dir_index: Vec<DirectoryIndex>,
}

#[derive(Debug, DekuRead, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct DirectoryIndex {
    pub index: u32,
    pub start: u32,
    #[deku(assert = "*name_size < 256")]
    pub name_size: u32,
    #[deku(count = "*name_size + 1")]
    pub name: Vec<u8>,
}

#[derive(Debug, DekuRead, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian, block_size: u32, block_log: u16")]
pub struct BasicFile {
    pub blocks_start: u32,
    pub frag_index: u32,
    pub block_offset: u32,
    pub file_size: u32,
    #[deku(count = "block_count(block_size, block_log, *frag_index, *file_size as u64)")]
    pub block_sizes: Vec<DataSize>,
}

#[derive(Debug, DekuRead, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian, block_size: u32, block_log: u16")]
pub struct ExtendedFile {
    pub blocks_start: u64,
    pub file_size: u64,
    pub sparse: u64,
    pub link_count: u32,
    pub frag_index: u32,
    pub block_offset: u32,
    pub xattr_index: u32,
    #[deku(count = "block_count(block_size, block_log, *frag_index, *file_size)")]
    pub block_sizes: Vec<DataSize>,
}

impl ExtendedFile {
    pub fn has_fragment(&self) -> bool {
        self.frag_index != NO_FRAGMENT
    }
}

impl BasicFile {
    pub fn has_fragment(&self) -> bool {
        self.frag_index != NO_FRAGMENT
    }
}

/// A single data-block's on-disk size; bit 24 marks the block stored
/// uncompressed. A zero size is a hole (`§8.1`, sparse files).
#[derive(Debug, DekuRead, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct DataSize {
    raw: u32,
}

const DATA_UNCOMPRESSED_BIT: u32 = 1 << 24;

impl DataSize {
    pub fn uncompressed(&self) -> bool {
        self.raw & DATA_UNCOMPRESSED_BIT != 0
    }

    pub fn size(&self) -> u32 {
        self.raw & !DATA_UNCOMPRESSED_BIT
    }

    pub fn is_hole(&self) -> bool {
        self.size() == 0
    }
}

fn block_count(block_size: u32, block_log: u16, fragment: u32, file_size: u64) -> u64 {
    if fragment == NO_FRAGMENT {
        (file_size + u64::from(block_size) - 1) >> block_log
    } else {
        file_size >> block_log
    }
}

#[derive(DekuRead, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicSymlink {
    pub link_count: u32,
    #[deku(assert = "*target_size < 256")]
    pub target_size: u32,
    #[deku(count = "target_size")]
    pub target_path: Vec<u8>,
}

impl std::fmt::Debug for BasicSymlink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicSymlink")
            .field("link_count", &self.link_count)
            .field("target_size", &self.target_size)
            .field("target_path", &String::from_utf8_lossy(&self.target_path))
            .finish()
    }
}

#[derive(DekuRead, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedSymlink {
    pub link_count: u32,
    #[deku(assert = "*target_size < 256")]
    pub target_size: u32,
    #[deku(count = "target_size")]
    pub target_path: Vec<u8>,
    pub xattr_index: u32,
}

impl std::fmt::Debug for ExtendedSymlink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedSymlink")
            .field("link_count", &self.link_count)
            .field("target_size", &self.target_size)
            .field("target_path", &String::from_utf8_lossy(&self.target_path))
            .field("xattr_index", &self.xattr_index)
            .finish()
    }
}

impl BasicSymlink {
    pub fn target(&self) -> &[u8] {
        &self.target_path
    }
}

impl ExtendedSymlink {
    pub fn target(&self) -> &[u8] {
        &self.target_path
    }
}

#[derive(Debug, DekuRead, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicDevice {
    pub link_count: u32,
    pub device: u32,
}

#[derive(Debug, DekuRead, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedDevice {
    pub link_count: u32,
    pub device: u32,
    pub xattr_index: u32,
}

#[derive(Debug, DekuRead, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicIpc {
    pub link_count: u32,
}

#[derive(Debug, DekuRead, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedIpc {
    pub link_count: u32,
    pub xattr_index: u32,
}

pub fn ref_outer(inode_ref: u64) -> u64 {
    inode_ref >> 16
}

pub fn ref_inner(inode_ref: u64) -> u64 {
    inode_ref & 0xffff
}

pub fn pack_ref(outer: u64, inner: u16) -> u64 {
    (outer << 16) | inner as u64
}

/// [`File`] (`§4.9`): an inode plus the archive context needed to act on
/// it — a packed inode reference, and (when opened through a directory
/// listing) the parent directory's inode and inode_ref for consistency
/// checks and `..` resolution.
#[derive(Clone)]
pub struct File {
    pub(crate) archive: Arc<Archive>,
    pub(crate) inode_ref: u64,
    pub(crate) inode: Inode,
    pub(crate) dir_inode: Option<u32>,
    pub(crate) parent_inode_ref: Option<u64>,
}

impl File {
    pub fn open(archive: &Arc<Archive>, inode_ref: u64) -> Result<Self, SqshError> {
        let sb = archive.superblock();
        let mut reader = MetablockReader::new(MetablockIterator::new(
            archive.map_manager(),
            archive.meta_extract(),
            sb.inode_table_start,
            ref_outer(inode_ref),
            ref_inner(inode_ref),
        ));
        let inode = Inode::read(&mut reader, sb.block_size, sb.block_log)?;
        Ok(Self { archive: archive.clone(), inode_ref, inode, dir_inode: None, parent_inode_ref: None })
    }

    pub fn inode_ref(&self) -> u64 {
        self.inode_ref
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    pub fn is_dir(&self) -> bool {
        self.inode.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.inode.is_file()
    }

    pub fn is_symlink(&self) -> bool {
        self.inode.is_symlink()
    }

    pub fn permission(&self) -> u16 {
        self.inode.header.permissions
    }

    pub fn uid_index(&self) -> u16 {
        self.inode.header.uid
    }

    pub fn gid_index(&self) -> u16 {
        self.inode.header.gid
    }

    pub fn modified_time(&self) -> u32 {
        self.inode.header.mtime
    }

    pub fn inode_number(&self) -> u32 {
        self.inode.header.inode_number
    }

    pub fn size(&self) -> u64 {
        match &self.inode.inner {
            InodeInner::BasicDirectory(d) => d.file_size as u64,
            InodeInner::ExtendedDirectory(d) => d.file_size as u64,
            InodeInner::BasicFile(f) => f.file_size as u64,
            InodeInner::ExtendedFile(f) => f.file_size,
            InodeInner::BasicSymlink(s) => s.target_size as u64,
            InodeInner::ExtendedSymlink(s) => s.target_size as u64,
            _ => 0,
        }
    }

    pub fn has_fragment(&self) -> bool {
        match &self.inode.inner {
            InodeInner::BasicFile(f) => f.has_fragment(),
            InodeInner::ExtendedFile(f) => f.has_fragment(),
            _ => false,
        }
    }

    pub fn fragment_block_index(&self) -> Option<u32> {
        match &self.inode.inner {
            InodeInner::BasicFile(f) if f.has_fragment() => Some(f.frag_index),
            InodeInner::ExtendedFile(f) if f.has_fragment() => Some(f.frag_index),
            _ => None,
        }
    }

    pub fn fragment_block_offset(&self) -> Option<u32> {
        match &self.inode.inner {
            InodeInner::BasicFile(f) if f.has_fragment() => Some(f.block_offset),
            InodeInner::ExtendedFile(f) if f.has_fragment() => Some(f.block_offset),
            _ => None,
        }
    }

    pub fn blocks_start(&self) -> Option<u64> {
        match &self.inode.inner {
            InodeInner::BasicFile(f) => Some(f.blocks_start as u64),
            InodeInner::ExtendedFile(f) => Some(f.blocks_start),
            _ => None,
        }
    }

    pub fn block_sizes(&self) -> &[DataSize] {
        match &self.inode.inner {
            InodeInner::BasicFile(f) => &f.block_sizes,
            InodeInner::ExtendedFile(f) => &f.block_sizes,
            _ => &[],
        }
    }

    pub fn block_count(&self) -> u64 {
        self.block_sizes().len() as u64
    }

    pub fn directory_block_start(&self) -> Option<u32> {
        match &self.inode.inner {
            InodeInner::BasicDirectory(d) => Some(d.block_index),
            InodeInner::ExtendedDirectory(d) => Some(d.block_index),
            _ => None,
        }
    }

    pub fn directory_block_offset(&self) -> Option<u16> {
        match &self.inode.inner {
            InodeInner::BasicDirectory(d) => Some(d.block_offset),
            InodeInner::ExtendedDirectory(d) => Some(d.block_offset),
            _ => None,
        }
    }

    pub fn directory_parent_inode(&self) -> Option<u32> {
        match &self.inode.inner {
            InodeInner::BasicDirectory(d) => Some(d.parent_inode),
            InodeInner::ExtendedDirectory(d) => Some(d.parent_inode),
            _ => None,
        }
    }

    pub fn symlink_target(&self) -> Option<&[u8]> {
        match &self.inode.inner {
            InodeInner::BasicSymlink(s) => Some(s.target()),
            InodeInner::ExtendedSymlink(s) => Some(s.target()),
            _ => None,
        }
    }

    pub fn device_id(&self) -> Option<u32> {
        match &self.inode.inner {
            InodeInner::BasicBlockDevice(d) | InodeInner::BasicCharacterDevice(d) => {
                Some(d.device)
            }
            InodeInner::ExtendedBlockDevice(d) | InodeInner::ExtendedCharacterDevice(d) => {
                Some(d.device)
            }
            _ => None,
        }
    }

    pub fn xattr_index(&self) -> Option<u32> {
        self.inode.xattr_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{Compressor, DefaultExtractor};
    use crate::extract_manager::ExtractManager;
    use crate::map_manager::MapManager;
    use crate::mapper::{MemoryMapper, Mapper};
    use crate::metablock::MetablockIterator;
    use std::sync::Arc;

    fn stream_reader(payload: &[u8]) -> MetablockReader {
        let header = (payload.len() as u16) | (1 << 15);
        let mut block = header.to_le_bytes().to_vec();
        block.extend_from_slice(payload);

        let mapper: Arc<dyn Mapper> = Arc::new(MemoryMapper::new(block, 0).unwrap());
        let map_manager = Arc::new(MapManager::new(mapper, 64, 8));
        let extract = Arc::new(ExtractManager::new(Arc::new(DefaultExtractor), Compressor::None, 8));
        MetablockReader::new(MetablockIterator::new(map_manager, extract, 0, 0, 0))
    }

    #[test]
    fn parses_basic_symlink() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u16.to_le_bytes()); // InodeId::BasicSymlink
        payload.extend_from_slice(&0o755u16.to_le_bytes()); // permissions
        payload.extend_from_slice(&0u16.to_le_bytes()); // uid
        payload.extend_from_slice(&0u16.to_le_bytes()); // gid
        payload.extend_from_slice(&0u32.to_le_bytes()); // mtime
        payload.extend_from_slice(&1u32.to_le_bytes()); // inode_number
        payload.extend_from_slice(&1u32.to_le_bytes()); // link_count
        payload.extend_from_slice(&6u32.to_le_bytes()); // target_size
        payload.extend_from_slice(b"target");

        let mut reader = stream_reader(&payload);
        let inode = Inode::read(&mut reader, 131072, 17).unwrap();
        assert!(inode.is_symlink());
        match &inode.inner {
            InodeInner::BasicSymlink(s) => assert_eq!(s.target(), b"target"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn data_size_reports_uncompressed_and_hole() {
        let compressed = DataSize { raw: 100 };
        let uncompressed = DataSize { raw: 100 | DATA_UNCOMPRESSED_BIT };
        let hole = DataSize { raw: 0 };
        assert!(!compressed.uncompressed());
        assert!(uncompressed.uncompressed());
        assert_eq!(compressed.size(), 100);
        assert!(hole.is_hole());
    }
}
