//! The in-memory photo payload cache.

use bytes::Bytes;
use photogrid_sources::PhotoId;

use crate::config::InMemoryCacheConfig;

type InMemoryCache = moka::sync::Cache<PhotoId, Bytes>;

/// A bounded in-memory cache of fetched image payloads.
///
/// Entries are weighed by their payload size, so the configured capacity
/// bounds the total memory spent on cached images. Reads and writes are
/// linearized internally; callers never need external locking.
///
/// Only successful fetches are ever stored. A failed fetch leaves no trace
/// here, so a later request for the same photo starts over.
#[derive(Clone)]
pub struct PhotoCache {
    cache: InMemoryCache,
}

impl std::fmt::Debug for PhotoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoCache")
            .field("entries", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}

impl PhotoCache {
    /// Creates a new cache with the configured capacity.
    pub fn new(config: &InMemoryCacheConfig) -> Self {
        let cache = InMemoryCache::builder()
            .name("photos")
            .max_capacity(config.photo_capacity)
            // NOTE: we count the bookkeeping structures towards the weight as well
            .weigher(|_k, v: &Bytes| {
                let overhead = std::mem::size_of::<(PhotoId, Bytes)>() as u32;
                (v.len() as u32).saturating_add(overhead)
            })
            .build();

        Self { cache }
    }

    /// Looks up the payload for the given photo.
    pub fn get(&self, id: PhotoId) -> Option<Bytes> {
        let payload = self.cache.get(&id);
        match payload {
            Some(_) => metric!(counter("caches.photo.hit") += 1),
            None => metric!(counter("caches.photo.miss") += 1),
        }
        payload
    }

    /// Stores the payload for the given photo, overwriting any previous entry.
    pub fn insert(&self, id: PhotoId, payload: Bytes) {
        metric!(timer("caches.photo.file.size") = payload.len() as u64);
        self.cache.insert(id, payload);
    }
}
