//! Shared eviction discipline for [`crate::map_manager::MapManager`] and
//! [`crate::extract_manager::ExtractManager`]: an LRU cache that refuses to
//! evict an entry while something outside the cache still holds a clone of
//! it (`§3.8`: "Eviction is permitted only when the refcount reaches
//! zero").
//!
//! Both caches store `Arc`-backed values and only need read access to their
//! strong count, so this is plain free functions over an *unbounded*
//! `lru::LruCache` rather than a new cache type: the cap is enforced here,
//! not by the `lru` crate, since `LruCache::put` has no way to skip an
//! eviction.

use std::hash::Hash;

use lru::LruCache;

/// Inserts `value` under `key`, evicting least-recently-used entries first
/// but only those where `strong_count(&entry) <= 1` (the cache is the only
/// owner left). If every entry currently in the cache is still externally
/// retained, the cache is left over `target_cap` rather than evicting a
/// live buffer — it shrinks back down on a later insert once callers drop
/// their references.
pub fn insert_refcounted<K, V>(
    cache: &mut LruCache<K, V>,
    target_cap: usize,
    key: K,
    value: V,
    strong_count: impl Fn(&V) -> usize,
) where
    K: Hash + Eq,
{
    if !cache.contains(&key) {
        let mut held = Vec::new();
        while cache.len() >= target_cap {
            let Some((k, v)) = cache.pop_lru() else { break };
            if strong_count(&v) <= 1 {
                break;
            }
            held.push((k, v));
        }
        for (k, v) in held.into_iter().rev() {
            cache.put(k, v);
        }
    }
    cache.put(key, value);
}
