use std::sync::Arc;

use crate::error::SqshError;
use crate::mapper::{MapSlice, Mapper};

/// Zero-copy mapper over an in-memory buffer. `archive_offset` is applied
/// once here: callers always address byte 0 as the start of the superblock.
pub struct MemoryMapper {
    data: Arc<[u8]>,
}

impl MemoryMapper {
    pub fn new(data: impl Into<Arc<[u8]>>, archive_offset: u64) -> Result<Self, SqshError> {
        let data: Arc<[u8]> = data.into();
        let offset = usize::try_from(archive_offset).map_err(|_| SqshError::IntegerOverflow)?;
        if offset > data.len() {
            return Err(SqshError::OutOfBounds(archive_offset));
        }
        let data: Arc<[u8]> = Arc::from(&data[offset..]);
        Ok(Self { data })
    }
}

impl Mapper for MemoryMapper {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn map(&self, offset: u64, size: usize) -> Result<MapSlice, SqshError> {
        let offset = usize::try_from(offset).map_err(|_| SqshError::IntegerOverflow)?;
        let end = offset
            .checked_add(size)
            .ok_or(SqshError::IntegerOverflow)?
            .min(self.data.len());
        if offset > self.data.len() {
            return Err(SqshError::OutOfBounds(offset as u64));
        }
        Ok(MapSlice(Arc::from(&self.data[offset..end])))
    }
}
