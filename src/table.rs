//! [`Table`] (`§4.8`): two-level random access to a packed array of
//! fixed-size records — a top-level array of metablock addresses directly
//! in the archive, each metablock holding up to 8192 bytes of the logical
//! array.

use std::io::Cursor;
use std::marker::PhantomData;
use std::sync::Arc;

use deku::reader::Reader as DekuReader_;
use deku::DekuReader;

use crate::error::SqshError;
use crate::extract_manager::ExtractManager;
use crate::map_manager::MapManager;
use crate::map_reader::MapIterator;
use crate::metablock::{MetablockIterator, MetablockReader, METADATA_MAXSIZE};
use crate::reader::Reader as ChunkReader;

/// Random access to an array of `T` records spread across a metablock
/// stream, addressed via a lookup table of metablock addresses.
pub struct Table<T> {
    map_manager: Arc<MapManager>,
    extract: Arc<ExtractManager>,
    lookup: Vec<u64>,
    element_size: usize,
    count: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Table<T>
where
    T: for<'a> DekuReader<'a, deku::ctx::Endian>,
{
    /// `table_start` is the archive address of the top-level lookup array
    /// (raw `u64`s, not inside a metablock stream); `element_size` is the
    /// on-disk record size; `count` is the number of logical elements.
    pub fn new(
        map_manager: Arc<MapManager>,
        extract: Arc<ExtractManager>,
        table_start: u64,
        element_size: usize,
        count: u64,
    ) -> Result<Self, SqshError> {
        let total_bytes = element_size as u64 * count;
        let num_metablocks = if total_bytes == 0 {
            0
        } else {
            (total_bytes + METADATA_MAXSIZE as u64 - 1) / METADATA_MAXSIZE as u64
        };

        let mut raw = ChunkReader::new(MapIterator::new(map_manager.clone(), table_start));
        let mut lookup = Vec::with_capacity(num_metablocks as usize);
        for _ in 0..num_metablocks {
            let bytes = raw.advance(0, 8)?;
            lookup.push(u64::from_le_bytes(bytes.try_into().unwrap()));
        }

        Ok(Self { map_manager, extract, lookup, element_size, count, _marker: PhantomData })
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: u64) -> Result<T, SqshError> {
        if index >= self.count {
            return Err(SqshError::NoSuchElement);
        }
        let byte_index = index * self.element_size as u64;
        let metablock_idx = (byte_index / METADATA_MAXSIZE as u64) as usize;
        let inner_offset = byte_index % METADATA_MAXSIZE as u64;
        let address = *self
            .lookup
            .get(metablock_idx)
            .ok_or(SqshError::OutOfBounds(index))?;

        let mut reader = MetablockReader::new(MetablockIterator::new(
            self.map_manager.clone(),
            self.extract.clone(),
            address,
            0,
            inner_offset,
        ));
        let bytes = reader.advance(0, self.element_size)?;
        let mut cursor = Cursor::new(&bytes);
        let mut deku_reader = DekuReader_::new(&mut cursor);
        T::from_reader_with_ctx(&mut deku_reader, deku::ctx::Endian::Little)
            .map_err(SqshError::from)
    }
}
