//! Read-through cache in front of a [`RumorRepository`].
//!
//! Single rumors and list pages are kept in bounded LRU maps; statistics
//! are kept as one slot. Writes go straight to the inner repository and
//! then drop whatever they could have made stale:
//!
//! | write    | by-id entry | list pages | statistics |
//! |----------|-------------|------------|------------|
//! | `create` | –           | dropped    | dropped    |
//! | `update` | dropped     | dropped    | dropped    |
//! | `delete` | dropped     | dropped    | dropped    |
//!
//! Every invalidation also advances a generation counter. A read that
//! missed only stores its result if the generation is unchanged since the
//! read began, so a value loaded before a concurrent write is never cached
//! after that write's invalidation.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::CacheConfig;
use crate::error::{Result, RumorError};
use crate::metrics::RumorCounters;
use crate::repository::{ListQuery, RumorPage, RumorRepository, RumorStatistics};
use crate::rumor::Rumor;
use crate::types::RumorId;

/// A [`RumorRepository`] decorator that caches reads.
pub struct CachedRepository<R> {
    inner: R,
    enabled: bool,
    by_id: Mutex<LruCache<RumorId, Rumor>>,
    pages: Mutex<LruCache<ListQuery, RumorPage>>,
    stats: Mutex<Option<RumorStatistics>>,
    generation: AtomicU64,
    counters: Arc<RumorCounters>,
}

impl<R: std::fmt::Debug> std::fmt::Debug for CachedRepository<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository")
            .field("inner", &self.inner)
            .field("enabled", &self.enabled)
            .field("cached_rumors", &self.by_id.lock().len())
            .field("cached_pages", &self.pages.lock().len())
            .finish_non_exhaustive()
    }
}

impl<R: RumorRepository> CachedRepository<R> {
    /// Wrap `inner`, counting hits and misses in `counters`.
    #[must_use]
    pub fn new(inner: R, config: &CacheConfig, counters: Arc<RumorCounters>) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            enabled: config.enabled,
            by_id: Mutex::new(LruCache::new(capacity)),
            pages: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(None),
            generation: AtomicU64::new(0),
            counters,
        }
    }

    /// The wrapped repository.
    #[must_use]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.by_id.lock().clear();
        self.invalidate_listings();
    }

    fn hit(&self) {
        RumorCounters::bump(&self.counters.cache_hits);
    }

    fn miss(&self) {
        RumorCounters::bump(&self.counters.cache_misses);
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn invalidate_listings(&self) {
        self.bump_generation();
        self.pages.lock().clear();
        *self.stats.lock() = None;
    }

    fn invalidate(&self, id: RumorId) {
        self.bump_generation();
        self.by_id.lock().pop(&id);
        self.invalidate_listings();
        trace!(rumor = %id, "Cache entries invalidated");
    }
}

impl<R: RumorRepository> RumorRepository for CachedRepository<R> {
    fn get_by_id(&self, id: RumorId) -> Result<Option<Rumor>> {
        if !self.enabled {
            return self.inner.get_by_id(id);
        }
        if let Some(rumor) = self.by_id.lock().get(&id) {
            self.hit();
            return Ok(Some(rumor.clone()));
        }
        self.miss();
        let generation = self.generation();
        let loaded = self.inner.get_by_id(id)?;
        if let Some(rumor) = &loaded {
            let mut by_id = self.by_id.lock();
            if self.is_current(generation) {
                by_id.put(id, rumor.clone());
            } else {
                trace!(rumor = %id, "Skipped caching a read that raced a write");
            }
        }
        Ok(loaded)
    }

    fn create(&self, rumor: &Rumor) -> Result<()> {
        self.inner.create(rumor)?;
        self.invalidate_listings();
        Ok(())
    }

    fn update(&self, rumor: &mut Rumor) -> Result<()> {
        match self.inner.update(rumor) {
            Ok(()) => {
                self.invalidate(rumor.id);
                Ok(())
            }
            Err(err @ RumorError::VersionConflict { .. }) => {
                // The cached copy lost the race too.
                self.bump_generation();
                self.by_id.lock().pop(&rumor.id);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn delete(&self, id: RumorId) -> Result<bool> {
        let existed = self.inner.delete(id)?;
        self.invalidate(id);
        Ok(existed)
    }

    fn list(&self, query: &ListQuery) -> Result<RumorPage> {
        if !self.enabled {
            return self.inner.list(query);
        }
        if let Some(page) = self.pages.lock().get(query) {
            self.hit();
            return Ok(page.clone());
        }
        self.miss();
        let generation = self.generation();
        let page = self.inner.list(query)?;
        let mut pages = self.pages.lock();
        if self.is_current(generation) {
            pages.put(query.clone(), page.clone());
        }
        Ok(page)
    }

    fn statistics(&self) -> Result<RumorStatistics> {
        if !self.enabled {
            return self.inner.statistics();
        }
        if let Some(stats) = self.stats.lock().as_ref() {
            self.hit();
            return Ok(stats.clone());
        }
        self.miss();
        let generation = self.generation();
        let stats = self.inner.statistics()?;
        let mut slot = self.stats.lock();
        if self.is_current(generation) {
            *slot = Some(stats.clone());
        }
        Ok(stats)
    }
}
