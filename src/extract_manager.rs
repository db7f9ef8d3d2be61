//! [`ExtractManager`] / [`ExtractView`] (`§4.5`, `§4.6`): decompression
//! cache keyed by the archive address a compressed chunk begins at.
//!
//! Two independent managers exist per archive — one for the metablock
//! stream (8 KiB buffers), one for data blocks (`block_size` buffers) —
//! because their buffer sizes and retention patterns differ (`§3.8`).

use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::trace;

use crate::compressor::{Compressor, Extractor};
use crate::error::SqshError;
use crate::refcounted_cache::insert_refcounted;

pub const DEFAULT_LRU_SIZE: usize = 32;

/// A decompressed buffer, reference-counted so a caller can retain one past
/// an eviction. The cache itself never drops the last owning reference: see
/// [`crate::refcounted_cache`] for the refcount-gated eviction this relies
/// on to satisfy `§3.8`.
pub type ExtractView = Arc<Vec<u8>>;

pub struct ExtractManager {
    extractor: Arc<dyn Extractor>,
    compressor: Compressor,
    cap: usize,
    cache: Mutex<LruCache<u64, ExtractView>>,
}

impl ExtractManager {
    pub fn new(extractor: Arc<dyn Extractor>, compressor: Compressor, lru_size: usize) -> Self {
        Self {
            extractor,
            compressor,
            cap: lru_size.max(1),
            cache: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Decompress the block beginning at archive address `address`, or
    /// return the cached buffer from a previous call.
    ///
    /// `compressed` must be the on-disk bytes for exactly that block;
    /// `compressed_len_hint` is only used for the trace log.
    pub fn uncompress(&self, address: u64, compressed: &[u8]) -> Result<ExtractView, SqshError> {
        {
            let mut cache = self.cache.lock().map_err(|_| SqshError::MutexLockFailed)?;
            if let Some(hit) = cache.get(&address) {
                trace!(address, "extract cache hit");
                return Ok(hit.clone());
            }
        }

        // Decompress without holding the lock so other addresses can
        // proceed in parallel (`§4.5`).
        let mut out = Vec::new();
        self.extractor.decompress(compressed, &mut out, self.compressor)?;
        let view: ExtractView = Arc::new(out);

        let mut cache = self.cache.lock().map_err(|_| SqshError::MutexLockFailed)?;
        match cache.get(&address) {
            // Another thread raced us and inserted first; either buffer is
            // byte-for-byte equal, so keep whichever is already cached.
            Some(theirs) => Ok(theirs.clone()),
            None => {
                insert_refcounted(&mut cache, self.cap, address, view.clone(), Arc::strong_count);
                Ok(view)
            }
        }
    }

    /// Bypass the cache for uncompressed blocks (no-op decompression path);
    /// still charged against the same address space so a later compressed
    /// read at the same address is consistent.
    pub fn passthrough(&self, address: u64, bytes: &[u8]) -> ExtractView {
        let view: ExtractView = Arc::new(bytes.to_vec());
        if let Ok(mut cache) = self.cache.lock() {
            insert_refcounted(&mut cache, self.cap, address, view.clone(), Arc::strong_count);
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::DefaultExtractor;

    #[test]
    fn dedups_identical_address() {
        let mgr = ExtractManager::new(Arc::new(DefaultExtractor), Compressor::None, 8);
        let a = mgr.uncompress(100, b"hello").unwrap();
        let b = mgr.uncompress(100, b"hello").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dedup_survives_eviction_by_capacity() {
        let mgr = ExtractManager::new(Arc::new(DefaultExtractor), Compressor::None, 1);
        let first = mgr.uncompress(0, b"hello").unwrap();
        // touch enough other addresses to cycle the capacity-1 cache many
        // times over while `first` is still retained.
        for addr in 1..16 {
            mgr.uncompress(addr, b"other").unwrap();
        }
        let again = mgr.uncompress(0, b"hello").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
}
