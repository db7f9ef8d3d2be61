//! [`Archive`] (`§4.9`, `§6.1`, `§6.3`): the top-level handle bundling the
//! mapper stack, both extract caches, the superblock and its side tables.
//! One `Archive` is shared (`Arc`) by every [`File`](crate::inode::File)
//! opened from it.

use std::sync::Arc;

use deku::DekuContainerRead;
use deku::DekuReader;
use tracing::warn;

use crate::compressor::{CompressionOptions, Compressor, DefaultExtractor, Extractor};
use crate::error::SqshError;
use crate::extract_manager::ExtractManager;
use crate::fragment::{FragmentEntry, FRAGMENT_ENTRY_SIZE};
use crate::inode::File;
use crate::inode_map::InodeMap;
use crate::map_manager::{self, MapManager};
use crate::mapper::{FileMapper, MemoryMapper, Mapper};
use crate::metablock::METADATA_MAXSIZE;
use crate::reader::Reader as ChunkReader;
use crate::map_reader::MapIterator;
use crate::superblock::SuperBlock;
use crate::table::Table;
use crate::xattr::XattrIdTable;

pub const SUPERBLOCK_SIZE: usize = 96;
pub const DEFAULT_MAX_SYMLINK_DEPTH: u32 = 100;

pub struct Archive {
    superblock: SuperBlock,
    compression_options: Option<CompressionOptions>,
    map_manager: Arc<MapManager>,
    meta_extract: Arc<ExtractManager>,
    data_extract: Arc<ExtractManager>,
    id_table: Table<u32>,
    fragment_table: Option<Table<FragmentEntry>>,
    xattr_id_table: Option<XattrIdTable>,
    inode_map: Arc<InodeMap>,
    max_symlink_depth: u32,
    zero_block: Arc<Vec<u8>>,
}

impl Archive {
    /// Open an in-memory archive with default options.
    pub fn open(data: impl Into<Arc<[u8]>>) -> Result<Arc<Self>, SqshError> {
        OpenOptions::new().open_memory(data)
    }

    /// Open an archive backed by an already-open file, with default options.
    pub fn open_file(file: std::fs::File) -> Result<Arc<Self>, SqshError> {
        OpenOptions::new().open_file(file)
    }

    pub fn superblock(&self) -> SuperBlock {
        self.superblock
    }

    pub fn compression_options(&self) -> Option<&CompressionOptions> {
        self.compression_options.as_ref()
    }

    pub fn map_manager(&self) -> Arc<MapManager> {
        self.map_manager.clone()
    }

    pub fn meta_extract(&self) -> Arc<ExtractManager> {
        self.meta_extract.clone()
    }

    pub fn data_extract(&self) -> Arc<ExtractManager> {
        self.data_extract.clone()
    }

    pub fn id_table(&self) -> &Table<u32> {
        &self.id_table
    }

    pub fn fragment_table(&self) -> Option<&Table<FragmentEntry>> {
        self.fragment_table.as_ref()
    }

    pub fn export_table(&self) -> Option<&Table<u64>> {
        self.inode_map.as_export_table()
    }

    pub fn xattr_id_table(&self) -> Option<&XattrIdTable> {
        self.xattr_id_table.as_ref()
    }

    pub fn inode_map(&self) -> &Arc<InodeMap> {
        &self.inode_map
    }

    pub fn max_symlink_depth(&self) -> u32 {
        self.max_symlink_depth
    }

    /// A shared all-zero buffer of exactly `block_size` bytes, handed out by
    /// the file content iterator for sparse blocks (`§4.11`, `§8.2` scenario
    /// 8) instead of allocating a fresh zeroed `Vec` per hole.
    pub fn zero_block(&self) -> &Arc<Vec<u8>> {
        &self.zero_block
    }

    pub fn root_file(self: &Arc<Self>) -> Result<File, SqshError> {
        File::open(self, self.superblock.root_inode_ref)
    }

    pub fn open_file_by_ref(self: &Arc<Self>, inode_ref: u64) -> Result<File, SqshError> {
        File::open(self, inode_ref)
    }

    /// Resolve a `/`-separated path, following a symlink on the terminal
    /// segment too.
    pub fn open_path(self: &Arc<Self>, path: &str) -> Result<File, SqshError> {
        crate::path_resolver::resolve(self, path, true)
    }

    /// Like [`Self::open_path`] but does not follow a symlink at the final
    /// segment (`lstat`-style).
    pub fn lopen_path(self: &Arc<Self>, path: &str) -> Result<File, SqshError> {
        crate::path_resolver::resolve(self, path, false)
    }
}

/// Builder for [`Archive::open`]'s configurable variants (`§6.1`).
pub struct OpenOptions {
    mapper: Option<Arc<dyn Mapper>>,
    archive_offset: u64,
    mapper_block_size: Option<u64>,
    mapper_lru_size: usize,
    max_symlink_depth: u32,
    compression_ids_allowed: Option<Vec<Compressor>>,
    extractor: Arc<dyn Extractor>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            mapper: None,
            archive_offset: 0,
            mapper_block_size: None,
            mapper_lru_size: map_manager::DEFAULT_LRU_SIZE,
            max_symlink_depth: DEFAULT_MAX_SYMLINK_DEPTH,
            compression_ids_allowed: None,
            extractor: Arc::new(DefaultExtractor),
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Offset of the archive within its underlying source, for concatenated
    /// payloads (e.g. a bootloader stub prepended to the squashfs image).
    /// Only consulted by [`Self::open_memory`]/[`Self::open_file`]; a
    /// caller-supplied [`Mapper`] handles its own offset translation.
    pub fn archive_offset(mut self, offset: u64) -> Self {
        self.archive_offset = offset;
        self
    }

    pub fn mapper_block_size(mut self, size: u64) -> Self {
        self.mapper_block_size = Some(size);
        self
    }

    pub fn mapper_lru_size(mut self, size: usize) -> Self {
        self.mapper_lru_size = size;
        self
    }

    pub fn max_symlink_depth(mut self, depth: u32) -> Self {
        self.max_symlink_depth = depth;
        self
    }

    pub fn compression_ids_allowed(mut self, ids: Vec<Compressor>) -> Self {
        self.compression_ids_allowed = Some(ids);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn open_memory(mut self, data: impl Into<Arc<[u8]>>) -> Result<Arc<Archive>, SqshError> {
        self.mapper = Some(Arc::new(MemoryMapper::new(data, self.archive_offset)?));
        self.open()
    }

    pub fn open_file(mut self, file: std::fs::File) -> Result<Arc<Archive>, SqshError> {
        self.mapper = Some(Arc::new(FileMapper::new(file, self.archive_offset)?));
        self.open()
    }

    pub fn open(self) -> Result<Arc<Archive>, SqshError> {
        let mapper = self.mapper.ok_or(SqshError::MapperInit)?;
        let archive_size = mapper.size();
        let block_size_hint = mapper.block_size_hint();
        let block_size = self.mapper_block_size.unwrap_or(block_size_hint as u64);
        let map_manager = Arc::new(MapManager::new(mapper, block_size, self.mapper_lru_size));

        let superblock = read_superblock(&map_manager)?;
        superblock.validate(archive_size)?;

        if let Some(allowed) = &self.compression_ids_allowed {
            if !allowed.contains(&superblock.compressor) {
                return Err(SqshError::CompressionUnsupported(superblock.compressor));
            }
        }

        let compression_options = if superblock.compressor_options_are_present() {
            match read_compression_options(&map_manager, &self.extractor, &superblock) {
                Ok(opts) => opts,
                Err(e) => {
                    warn!(error = ?e, "failed to parse compressor options, using defaults");
                    None
                }
            }
        } else {
            None
        };

        let meta_extract = Arc::new(ExtractManager::new(
            self.extractor.clone(),
            superblock.compressor,
            self.mapper_lru_size,
        ));
        let data_extract = Arc::new(ExtractManager::new(
            self.extractor.clone(),
            superblock.compressor,
            self.mapper_lru_size,
        ));

        let id_table = Table::new(
            map_manager.clone(),
            meta_extract.clone(),
            superblock.id_table_start,
            4,
            superblock.id_count as u64,
        )?;

        let fragment_table = if superblock.has_fragments() {
            Some(Table::new(
                map_manager.clone(),
                meta_extract.clone(),
                superblock.fragment_table_start,
                FRAGMENT_ENTRY_SIZE,
                superblock.frag_count as u64,
            )?)
        } else {
            None
        };

        let xattr_id_table = if superblock.has_xattr_table() {
            Some(XattrIdTable::new(
                map_manager.clone(),
                meta_extract.clone(),
                superblock.xattr_id_table_start,
            )?)
        } else {
            None
        };

        let inode_map = Arc::new(if superblock.has_export_table() {
            let export_table = Table::new(
                map_manager.clone(),
                meta_extract.clone(),
                superblock.export_table_start,
                8,
                superblock.inode_count as u64,
            )?;
            InodeMap::from_export_table(export_table)
        } else {
            InodeMap::dynamic()
        });

        let zero_block = Arc::new(vec![0u8; superblock.block_size as usize]);

        Ok(Arc::new(Archive {
            superblock,
            compression_options,
            map_manager,
            meta_extract,
            data_extract,
            id_table,
            fragment_table,
            xattr_id_table,
            inode_map,
            max_symlink_depth: self.max_symlink_depth,
            zero_block,
        }))
    }
}

fn read_superblock(map_manager: &Arc<MapManager>) -> Result<SuperBlock, SqshError> {
    let mut reader = ChunkReader::new(MapIterator::new(map_manager.clone(), 0));
    let bytes = reader.advance(0, SUPERBLOCK_SIZE)?;
    let (_, superblock) = SuperBlock::from_bytes((&bytes, 0))?;
    Ok(superblock)
}

/// Reads the compressor-tuning metablock that immediately follows the
/// superblock. Unlike the rest of this crate's tables, this is a single
/// fixed-position read, not a lazily-addressed stream, so it goes through
/// the mapper directly rather than via [`crate::metablock::MetablockReader`].
fn read_compression_options(
    map_manager: &Arc<MapManager>,
    extractor: &Arc<dyn Extractor>,
    superblock: &SuperBlock,
) -> Result<Option<CompressionOptions>, SqshError> {
    let mut reader = ChunkReader::new(MapIterator::new(map_manager.clone(), SUPERBLOCK_SIZE as u64));
    let header_bytes = reader.advance(0, 2)?;
    let raw = u16::from_le_bytes([header_bytes[0], header_bytes[1]]);
    let uncompressed = raw & (1 << 15) != 0;
    let size = (raw & !(1 << 15)) as usize;
    if size > METADATA_MAXSIZE {
        return Ok(None);
    }
    let payload = reader.advance(0, size)?;

    let decoded = if uncompressed {
        payload
    } else {
        let mut out = Vec::new();
        extractor.decompress(&payload, &mut out, superblock.compressor)?;
        out
    };

    let mut cursor = std::io::Cursor::new(&decoded);
    let mut deku_reader = deku::reader::Reader::new(&mut cursor);
    let opts = CompressionOptions::from_reader_with_ctx(
        &mut deku_reader,
        (deku::ctx::Endian::Little, superblock.compressor),
    )?;
    Ok(Some(opts))
}
