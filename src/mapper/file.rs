use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::error::SqshError;
use crate::mapper::{MapSlice, Mapper};

/// Mapper over a plain `File`, applying `archive_offset` at every seek, the
/// way `backhand`'s `SquashfsReaderWithOffset` translates at the `Seek`
/// boundary rather than in a higher layer.
pub struct FileMapper {
    file: Mutex<File>,
    offset: u64,
    size: u64,
}

impl FileMapper {
    pub fn new(mut file: File, archive_offset: u64) -> Result<Self, SqshError> {
        let total = file.seek(SeekFrom::End(0))?;
        let size = total
            .checked_sub(archive_offset)
            .ok_or(SqshError::OutOfBounds(archive_offset))?;
        Ok(Self { file: Mutex::new(file), offset: archive_offset, size })
    }
}

impl Mapper for FileMapper {
    fn size(&self) -> u64 {
        self.size
    }

    fn map(&self, offset: u64, size: usize) -> Result<MapSlice, SqshError> {
        let archive_offset = offset.checked_add(self.offset).ok_or(SqshError::IntegerOverflow)?;
        let clamped = size.min((self.size.saturating_sub(offset)) as usize);
        let mut buf = vec![0u8; clamped];
        {
            // Released while not held by other threads reading different
            // offsets is not possible with a single `File` handle; the lock
            // is only contended for the duration of the syscalls below, not
            // for the lifetime of the returned slice.
            let mut file = self.file.lock().map_err(|_| SqshError::MutexLockFailed)?;
            file.seek(SeekFrom::Start(archive_offset))
                .map_err(|_| SqshError::MapperMap)?;
            file.read_exact(&mut buf).map_err(|_| SqshError::MapperMap)?;
        }
        Ok(MapSlice(Arc::from(buf)))
    }
}
