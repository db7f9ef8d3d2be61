//! [`MapIterator`] / `MapReader` (`§4.3`): a logical contiguous byte stream
//! over [`MapManager`] blocks.

use std::sync::Arc;

use crate::error::SqshError;
use crate::map_manager::MapManager;
use crate::mapper::MapSlice;
use crate::reader::{IteratorImpl, Reader};

pub type MapReader = Reader<MapIterator>;

/// Walks successive mapper blocks starting at a byte address rounded down
/// to a block boundary.
pub struct MapIterator {
    manager: Arc<MapManager>,
    block_index: u64,
    initial_skip: usize,
    current: Option<MapSlice>,
}

impl MapIterator {
    pub fn new(manager: Arc<MapManager>, start_offset: u64) -> Self {
        let block_size = manager.block_size();
        let initial_skip = (start_offset % block_size) as usize;
        Self { manager, block_index: start_offset / block_size, initial_skip, current: None }
    }
}

impl MapIterator {
    pub fn manager(&self) -> Arc<MapManager> {
        self.manager.clone()
    }
}

impl IteratorImpl for MapIterator {
    fn next(&mut self, _desired_size: usize) -> Result<bool, SqshError> {
        if self.current.is_some() {
            self.block_index += 1;
        }
        match self.manager.get(self.block_index) {
            Ok(slice) => {
                self.current = Some(slice);
                Ok(true)
            }
            Err(SqshError::OutOfBounds(_)) => {
                self.current = None;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn data(&self) -> &[u8] {
        self.current.as_ref().map(MapSlice::data).unwrap_or(&[])
    }

    fn initial_skip(&self) -> usize {
        self.initial_skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{MemoryMapper, Mapper};

    fn manager(data: Vec<u8>, block_size: u64) -> Arc<MapManager> {
        let mapper: Arc<dyn Mapper> = Arc::new(MemoryMapper::new(data, 0).unwrap());
        Arc::new(MapManager::new(mapper, block_size, 8))
    }

    #[test]
    fn reads_across_block_boundary() {
        let data: Vec<u8> = (0u8..20).collect();
        let mgr = manager(data.clone(), 8);
        let mut reader = MapReader::new(MapIterator::new(mgr, 0));
        let got = reader.advance(5, 10).unwrap();
        assert_eq!(got, data[5..15]);
    }

    #[test]
    fn errors_past_archive_end() {
        let data: Vec<u8> = (0u8..20).collect();
        let mgr = manager(data, 8);
        let mut reader = MapReader::new(MapIterator::new(mgr, 0));
        assert!(reader.advance(0, 100).is_err());
    }
}
