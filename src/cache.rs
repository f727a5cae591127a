// Schema cache - process-wide memo of field-definition documents per entity kind

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::entity::EntityKind;
use crate::error::ProfileResult;
use crate::schema::{SchemaDocument, SchemaSource};

/// Cached document plus when and in which generation it was loaded
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub document: Arc<SchemaDocument>,
    pub loaded_at: Instant,
    pub generation: u64,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    invalidations: AtomicU64,
}

/// Memoizes schema documents keyed by entity kind.
///
/// Entries are immutable `Arc` snapshots. Replacing one swaps the pointer under
/// the write lock, so readers always see a complete document, possibly a stale
/// one. Nothing is reloaded until `invalidate` is called.
///
/// Every invalidation bumps the generation. A load only publishes its document
/// if the generation it started under is still current, so a load racing an
/// invalidation never caches what it read before the edit.
pub struct SchemaCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    source: Arc<dyn SchemaSource>,
    generation: AtomicU64,
    metrics: CacheMetrics,
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("stats", &self.stats())
            .finish()
    }
}

impl SchemaCache {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            source,
            generation: AtomicU64::new(0),
            metrics: CacheMetrics::default(),
        }
    }

    /// Return the cached document for `kind`, loading it on first access
    #[instrument(skip(self))]
    pub async fn get_or_load(&self, kind: EntityKind) -> ProfileResult<Arc<SchemaDocument>> {
        let key = kind.cache_key();

        if let Some(entry) = self.entries.read().await.get(&key) {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Schema cache hit for {}", key);
            return Ok(entry.document.clone());
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation.load(Ordering::SeqCst);

        // Load failures propagate and are not cached
        let document = Arc::new(self.source.load(kind).await?);
        self.metrics.loads.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(
                "Schema for {} was invalidated during load; not caching generation {}",
                key, generation
            );
            return Ok(document);
        }
        let entry = CacheEntry {
            document: document.clone(),
            loaded_at: Instant::now(),
            generation,
        };
        entries.insert(key.clone(), entry);

        info!(
            "Cached {} profile fields under {} (generation {})",
            document.len(),
            key,
            generation
        );
        Ok(document)
    }

    /// Drop the cached document for `kind`; the next read reloads it.
    /// Loads already in flight will not publish their result.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, kind: EntityKind) {
        let key = kind.cache_key();
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
        if entries.remove(&key).is_some() {
            info!("Invalidated schema cache entry {}", key);
        }
    }

    pub async fn invalidate_all(&self) {
        for kind in EntityKind::ALL {
            self.invalidate(kind).await;
        }
    }

    /// Cached entry for `kind`, without loading
    pub async fn peek(&self, kind: EntityKind) -> Option<CacheEntry> {
        self.entries.read().await.get(&kind.cache_key()).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            loads: self.metrics.loads.load(Ordering::Relaxed),
            invalidations: self.metrics.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfileError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Source whose YAML can be swapped at runtime and which counts loads
    struct CountingSource {
        yaml: Mutex<String>,
        loads: AtomicUsize,
    }

    impl CountingSource {
        fn new(yaml: &str) -> Arc<Self> {
            Arc::new(Self {
                yaml: Mutex::new(yaml.to_string()),
                loads: AtomicUsize::new(0),
            })
        }

        fn set(&self, yaml: &str) {
            *self.yaml.lock().unwrap() = yaml.to_string();
        }
    }

    #[async_trait]
    impl SchemaSource for CountingSource {
        async fn load(&self, kind: EntityKind) -> ProfileResult<SchemaDocument> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let yaml = self.yaml.lock().unwrap().clone();
            SchemaDocument::from_yaml_str(kind.schema_key(), &yaml)
        }
    }

    /// Source that reads its YAML, then parks the first load until released
    struct StalledSource {
        yaml: Mutex<String>,
        stall_next: AtomicBool,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SchemaSource for StalledSource {
        async fn load(&self, kind: EntityKind) -> ProfileResult<SchemaDocument> {
            let yaml = self.yaml.lock().unwrap().clone();
            if self.stall_next.swap(false, Ordering::SeqCst) {
                self.started.notify_one();
                self.release.notified().await;
            }
            SchemaDocument::from_yaml_str(kind.schema_key(), &yaml)
        }
    }

    #[tokio::test]
    async fn test_repeated_reads_hit_cache() {
        let source = CountingSource::new("bio:\n  type: string\n");
        let cache = SchemaCache::new(source.clone());

        let first = cache.get_or_load(EntityKind::User).await.unwrap();
        let second = cache.get_or_load(EntityKind::User).await.unwrap();
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_kinds_are_cached_independently() {
        let source = CountingSource::new("bio:\n  type: string\n");
        let cache = SchemaCache::new(source.clone());

        cache.get_or_load(EntityKind::User).await.unwrap();
        cache.get_or_load(EntityKind::Group).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);

        cache.invalidate(EntityKind::Group).await;
        assert!(cache.peek(EntityKind::User).await.is_some());
        assert!(cache.peek(EntityKind::Group).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_picks_up_new_definitions() {
        let source = CountingSource::new("bio:\n  type: string\n");
        let cache = SchemaCache::new(source.clone());

        let before = cache.get_or_load(EntityKind::User).await.unwrap();
        source.set("bio:\n  type: string\nshoe_size:\n  type: number\n");

        // still the old snapshot until invalidated
        let stale = cache.get_or_load(EntityKind::User).await.unwrap();
        assert_eq!(stale.field_names(), vec!["bio"]);

        cache.invalidate(EntityKind::User).await;
        let after = cache.get_or_load(EntityKind::User).await.unwrap();
        assert_eq!(after.field_names(), vec!["bio", "shoe_size"]);
        // readers holding the old snapshot keep a complete document
        assert_eq!(before.field_names(), vec!["bio"]);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_invalidate_during_load_discards_stale_document() {
        let source = Arc::new(StalledSource {
            yaml: Mutex::new("bio:\n  type: string\n".to_string()),
            stall_next: AtomicBool::new(true),
            started: Notify::new(),
            release: Notify::new(),
        });
        let cache = Arc::new(SchemaCache::new(source.clone()));

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_load(EntityKind::User).await })
        };
        source.started.notified().await;

        // admin edits the definitions while the first load is still running
        *source.yaml.lock().unwrap() =
            "bio:\n  type: string\npronouns:\n  type: string\n".to_string();
        cache.invalidate(EntityKind::User).await;
        source.release.notify_one();

        let in_flight = reader.await.unwrap().unwrap();
        assert_eq!(in_flight.field_names(), vec!["bio"]);
        assert!(cache.peek(EntityKind::User).await.is_none());

        let fresh = cache.get_or_load(EntityKind::User).await.unwrap();
        assert_eq!(fresh.field_names(), vec!["bio", "pronouns"]);
    }

    #[tokio::test]
    async fn test_load_errors_are_not_cached() {
        let source = CountingSource::new("bio:\n  type: mystery\n");
        let cache = SchemaCache::new(source.clone());

        let err = cache.get_or_load(EntityKind::User).await.unwrap_err();
        assert!(matches!(err, ProfileError::SchemaLoad { .. }));
        assert!(cache.peek(EntityKind::User).await.is_none());

        source.set("bio:\n  type: string\n");
        assert!(cache.get_or_load(EntityKind::User).await.is_ok());
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
