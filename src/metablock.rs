//! [`MetablockIterator`] / `MetablockReader` (`§4.7`, `§3.3`): walks a
//! metablock stream — a concatenation of up-to-8192-byte compressed units,
//! each with a 2-byte length header — and exposes it as a logical stream of
//! *uncompressed* payloads.

use std::sync::Arc;

use tracing::error;

use crate::compressor::Compressor;
use crate::error::SqshError;
use crate::extract_manager::{ExtractManager, ExtractView};
use crate::map_manager::MapManager;
use crate::map_reader::{MapIterator, MapReader};
use crate::reader::{IteratorImpl, Reader};

pub const METADATA_MAXSIZE: usize = 0x2000;
const UNCOMPRESSED_BIT: u16 = 1 << 15;

pub type MetablockReader = Reader<MetablockIterator>;

/// Walks a metablock stream. `outer_offset` addresses the byte at which a
/// metablock header begins, counted from `stream_base`; `inner_offset`
/// addresses a byte within that metablock's *uncompressed* payload.
pub struct MetablockIterator {
    map_reader: MapReader,
    extract: Arc<ExtractManager>,
    stream_base: u64,
    pos: u64,
    initial_skip: usize,
    current: Option<ExtractView>,
}

impl MetablockIterator {
    pub fn new(
        map_manager: Arc<MapManager>,
        extract: Arc<ExtractManager>,
        stream_base: u64,
        outer_offset: u64,
        inner_offset: u64,
    ) -> Self {
        let map_reader = MapReader::new(MapIterator::new(map_manager, stream_base + outer_offset));
        Self {
            map_reader,
            extract,
            stream_base,
            pos: outer_offset,
            initial_skip: inner_offset as usize,
            current: None,
        }
    }

    fn read_one(&mut self) -> Result<Option<ExtractView>, SqshError> {
        let header = match self.map_reader.advance(0, 2) {
            Ok(h) => h,
            Err(SqshError::OutOfBounds(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let raw = u16::from_le_bytes([header[0], header[1]]);
        let compressed = raw & UNCOMPRESSED_BIT == 0;
        let on_disk_size = (raw & !UNCOMPRESSED_BIT) as usize;
        if on_disk_size > METADATA_MAXSIZE {
            error!(on_disk_size, "metablock header exceeds 8192 bytes");
            return Err(SqshError::SizeMismatch);
        }

        let address = self.stream_base + self.pos;
        let payload = self.map_reader.advance(0, on_disk_size)?;
        self.pos += 2 + on_disk_size as u64;

        let view = if compressed {
            self.extract.uncompress(address, &payload)?
        } else {
            if payload.len() > METADATA_MAXSIZE {
                error!("uncompressed metablock payload exceeds 8192 bytes");
                return Err(SqshError::SizeMismatch);
            }
            self.extract.passthrough(address, &payload)
        };
        Ok(Some(view))
    }

    pub fn map_manager(&self) -> Arc<MapManager> {
        self.map_reader.inner().manager()
    }

    pub fn extract_manager(&self) -> Arc<ExtractManager> {
        self.extract.clone()
    }

    pub fn stream_base(&self) -> u64 {
        self.stream_base
    }

    /// Fast-forward across whole metablocks without decompressing them,
    /// relying on the invariant that every non-landing metablock in a
    /// skip series is exactly 8192 bytes uncompressed.
    pub fn skip_metablocks(&mut self, count: u64) -> Result<(), SqshError> {
        for _ in 0..count {
            let header = self.map_reader.advance(0, 2)?;
            let raw = u16::from_le_bytes([header[0], header[1]]);
            let on_disk_size = (raw & !UNCOMPRESSED_BIT) as usize;
            self.map_reader.advance(on_disk_size as u64, 0)?;
            self.pos += 2 + on_disk_size as u64;
        }
        self.current = None;
        Ok(())
    }
}

impl IteratorImpl for MetablockIterator {
    fn next(&mut self, _desired_size: usize) -> Result<bool, SqshError> {
        match self.read_one()? {
            Some(view) => {
                self.current = Some(view);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn data(&self) -> &[u8] {
        self.current.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }

    fn initial_skip(&self) -> usize {
        self.initial_skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::DefaultExtractor;
    use crate::mapper::{MemoryMapper, Mapper};

    fn build_stream(blocks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for block in blocks {
            let header = (block.len() as u16) | UNCOMPRESSED_BIT; // stored uncompressed
            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(block);
        }
        out
    }

    fn reader_for(data: Vec<u8>, outer: u64, inner: u64) -> MetablockReader {
        let mapper: Arc<dyn Mapper> = Arc::new(MemoryMapper::new(data, 0).unwrap());
        let map_manager = Arc::new(MapManager::new(mapper, 64, 8));
        let extract = Arc::new(ExtractManager::new(Arc::new(DefaultExtractor), Compressor::None, 8));
        MetablockReader::new(MetablockIterator::new(map_manager, extract, 0, outer, inner))
    }

    #[test]
    fn reads_uncompressed_payload() {
        let data = build_stream(&[b"hello world"]);
        let mut reader = reader_for(data, 0, 0);
        assert_eq!(reader.advance(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn honors_inner_offset() {
        let data = build_stream(&[b"hello world"]);
        let mut reader = reader_for(data, 0, 6);
        assert_eq!(reader.advance(0, 5).unwrap(), b"world");
    }

    #[test]
    fn crosses_metablock_boundary() {
        let data = build_stream(&[b"abcd", b"efgh"]);
        let mut reader = reader_for(data, 0, 2);
        assert_eq!(reader.advance(0, 4).unwrap(), b"cdef");
    }
}
