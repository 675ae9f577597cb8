use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use sha2::{Digest, Sha256};

/// Bounded LRU cache of fully assembled PCM payloads, keyed by voice and text.
///
/// A hit replays the stored audio without contacting the upstream
/// synthesizer. Hit/miss counters are surfaced by the metrics endpoint.
pub struct AudioCache {
    entries: Mutex<LruCache<String, Arc<Vec<u8>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AudioCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Derive the cache key for a synthesis request.
    pub fn key(voice_id: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(voice_id.as_bytes());
        // separator keeps ("ab", "c") and ("a", "bc") distinct
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        match entries.get(key) {
            Some(pcm) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(pcm))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: String, pcm: Vec<u8>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, Arc::new(pcm));
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
