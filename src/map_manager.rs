//! Reference-counted LRU cache of [`MapSlice`]s (`§4.2`).

use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::trace;

use crate::error::SqshError;
use crate::mapper::{MapSlice, Mapper};
use crate::refcounted_cache::insert_refcounted;

pub const DEFAULT_LRU_SIZE: usize = 32;

/// Caches mapper slices in a reference-counted LRU; exposes `get(block_index)`.
///
/// `MapSlice` is itself an `Arc<[u8]>`, but eviction is more than "drop our
/// clone": `§3.8` requires the cache never evict a slice that some other
/// clone is still using, so inserts go through
/// [`crate::refcounted_cache::insert_refcounted`] rather than a plain
/// capacity-bounded `put`.
pub struct MapManager {
    mapper: Arc<dyn Mapper>,
    block_size: u64,
    cap: usize,
    cache: Mutex<LruCache<u64, MapSlice>>,
}

impl MapManager {
    pub fn new(mapper: Arc<dyn Mapper>, block_size: u64, lru_size: usize) -> Self {
        Self { mapper, block_size, cap: lru_size.max(1), cache: Mutex::new(LruCache::unbounded()) }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn archive_size(&self) -> u64 {
        self.mapper.size()
    }

    fn block_count(&self) -> u64 {
        let size = self.archive_size();
        (size + self.block_size - 1) / self.block_size
    }

    /// Retain and return the mapper block at `block_index`.
    pub fn get(&self, block_index: u64) -> Result<MapSlice, SqshError> {
        if block_index >= self.block_count() {
            return Err(SqshError::OutOfBounds(block_index));
        }
        if let Some(hit) = self.cache.lock().map_err(|_| SqshError::MutexLockFailed)?.get(&block_index)
        {
            trace!(block_index, "map cache hit");
            return Ok(hit.clone());
        }

        // Release the lock for the duration of the mapper call so other
        // block indices can proceed in parallel. A racing thread may map
        // the same block concurrently; whichever insert happens last wins
        // the cache slot, both slices are equally valid.
        let offset = block_index
            .checked_mul(self.block_size)
            .ok_or(SqshError::IntegerOverflow)?;
        let remaining = self.archive_size().saturating_sub(offset);
        let size = self.block_size.min(remaining) as usize;
        let slice = self.mapper.map(offset, size)?;

        let mut cache = self.cache.lock().map_err(|_| SqshError::MutexLockFailed)?;
        insert_refcounted(&mut cache, self.cap, block_index, slice.clone(), MapSlice::strong_count);
        Ok(slice)
    }
}
