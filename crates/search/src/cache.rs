//! Result cache keyed by query signature, scoped to one snapshot epoch.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use pixelynth_core::QuerySignature;
use tracing::debug;

use crate::DocId;

pub struct ResultCache {
    epoch: u64,
    entries: LruCache<QuerySignature, Arc<[DocId]>>,
    hits: u64,
    misses: u64,
}

impl Default for ResultCache {
    fn default() -> Self { Self::unbounded() }
}

impl ResultCache {
    /// Keeps every signature seen during an epoch.
    pub fn unbounded() -> Self {
        Self { epoch: 0, entries: LruCache::unbounded(), hits: 0, misses: 0 }
    }

    /// Evicts least recently used signatures beyond `cap`; `None` is unbounded.
    pub fn with_capacity(cap: Option<NonZeroUsize>) -> Self {
        match cap {
            Some(cap) => Self { epoch: 0, entries: LruCache::new(cap), hits: 0, misses: 0 },
            None => Self::unbounded(),
        }
    }

    /// Cached ids for `sig` under `epoch`, computing and storing them on a miss.
    /// A different epoch drops every entry first.
    pub fn get_or_compute<F>(&mut self, epoch: u64, sig: &QuerySignature, compute: F) -> Arc<[DocId]>
    where
        F: FnOnce() -> Vec<DocId>,
    {
        if epoch != self.epoch {
            if !self.entries.is_empty() {
                debug!(from = self.epoch, to = epoch, dropped = self.entries.len(), "cache: epoch changed");
            }
            self.entries.clear();
            self.epoch = epoch;
        }
        if let Some(hit) = self.entries.get(sig) {
            self.hits += 1;
            metrics::counter!("result_cache_hits_total", 1u64);
            return Arc::clone(hit);
        }
        self.misses += 1;
        metrics::counter!("result_cache_misses_total", 1u64);
        let ids: Arc<[DocId]> = compute().into();
        self.entries.put(sig.clone(), Arc::clone(&ids));
        ids
    }

    pub fn epoch(&self) -> u64 { self.epoch }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn hits(&self) -> u64 { self.hits }
    pub fn misses(&self) -> u64 { self.misses }
}
