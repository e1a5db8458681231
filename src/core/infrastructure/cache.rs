//! Item metadata cache
//!
//! Keeps parsed `/metadata/{identifier}` results so repeated show views,
//! downloads and ratings runs do not hit Archive.org again. A JSON index on
//! disk is always present; Redis is layered in front when configured.

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::core::data::models::{Recording, Track};
use crate::core::services::archive::Review;
use crate::error::{CacheError, Result};

const INDEX_FILE: &str = "metadata_index.json";
const REDIS_KEY_PREFIX: &str = "deadarchive:item:";

/// What we keep from an item's metadata response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedItem {
    pub recording: Recording,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&mut self, identifier: &str) -> Option<CachedItem>;
    async fn put(&mut self, identifier: &str, item: CachedItem) -> Result<()>;
    async fn clear(&mut self) -> Result<()>;
    fn stats(&self) -> CacheStats;
    async fn cleanup_old_entries(&mut self) -> Result<()>;
    async fn save_index(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_requests: u64,
    pub cache_hits: u64,
    pub hit_rate_percent: f64,
    pub last_cleanup: u64,
}

impl CacheStats {
    fn with_hit_rate(mut self) -> Self {
        self.hit_rate_percent = if self.total_requests > 0 {
            (self.cache_hits as f64 / self.total_requests as f64) * 100.0
        } else {
            0.0
        };
        self
    }
}

#[derive(Serialize, Deserialize, Clone)]
struct CacheEntry {
    item: CachedItem,
    cached_at: u64,
    last_accessed: u64,
    access_count: u32,
}

#[derive(Serialize, Deserialize)]
struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
    total_requests: u64,
    cache_hits: u64,
    last_cleanup: u64,
}

impl CacheIndex {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            total_requests: 0,
            cache_hits: 0,
            last_cleanup: current_timestamp(),
        }
    }
}

pub struct FileCache {
    cache_dir: PathBuf,
    index: CacheIndex,
    max_age_secs: u64,
    max_entries: usize,
}

impl FileCache {
    pub fn new(cache_dir: PathBuf, max_age_hours: u64) -> Result<Self> {
        fs::create_dir_all(&cache_dir)?;

        let index_path = cache_dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            let content = fs::read_to_string(&index_path)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Discarding unreadable cache index {}: {}", index_path.display(), e);
                CacheIndex::new()
            })
        } else {
            CacheIndex::new()
        };

        Ok(Self {
            cache_dir,
            index,
            max_age_secs: max_age_hours * 3600,
            max_entries: 20_000,
        })
    }

    #[cfg(test)]
    fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.cached_at) > self.max_age_secs
    }
}

#[async_trait]
impl MetadataCache for FileCache {
    async fn get(&mut self, identifier: &str) -> Option<CachedItem> {
        self.index.total_requests += 1;
        let now = current_timestamp();

        let expired = match self.index.entries.get(identifier) {
            Some(entry) => self.is_expired(entry, now),
            None => {
                debug!("Cache miss for {}", identifier);
                return None;
            }
        };
        if expired {
            debug!("Cache entry expired for {}", identifier);
            self.index.entries.remove(identifier);
            return None;
        }

        let entry = self.index.entries.get_mut(identifier)?;
        entry.access_count += 1;
        entry.last_accessed = now;
        self.index.cache_hits += 1;

        debug!("Cache hit for {}", identifier);
        Some(entry.item.clone())
    }

    async fn put(&mut self, identifier: &str, item: CachedItem) -> Result<()> {
        let now = current_timestamp();
        self.index.entries.insert(
            identifier.to_string(),
            CacheEntry {
                item,
                cached_at: now,
                last_accessed: now,
                access_count: 1,
            },
        );

        if self.index.entries.len() > self.max_entries {
            self.cleanup_old_entries().await?;
        }
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.index = CacheIndex::new();

        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)?;
            fs::create_dir_all(&self.cache_dir)?;
        }

        info!("File cache cleared");
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.index.entries.len(),
            total_requests: self.index.total_requests,
            cache_hits: self.index.cache_hits,
            hit_rate_percent: 0.0,
            last_cleanup: self.index.last_cleanup,
        }
        .with_hit_rate()
    }

    async fn cleanup_old_entries(&mut self) -> Result<()> {
        let now = current_timestamp();
        let max_age = self.max_age_secs;

        let before = self.index.entries.len();
        self.index
            .entries
            .retain(|_, entry| now.saturating_sub(entry.cached_at) <= max_age);
        let after_expiry = self.index.entries.len();

        // Still over capacity: evict least recently used
        if self.index.entries.len() > self.max_entries {
            let mut by_access: Vec<(String, u64)> = self
                .index
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.last_accessed))
                .collect();
            by_access.sort_by_key(|(_, last)| *last);

            let excess = self.index.entries.len() - self.max_entries;
            for (key, _) in by_access.into_iter().take(excess) {
                self.index.entries.remove(&key);
            }
        }

        self.index.last_cleanup = now;
        info!(
            "File cache cleanup: {} -> {} -> {} entries",
            before,
            after_expiry,
            self.index.entries.len()
        );
        Ok(())
    }

    async fn save_index(&self) -> Result<()> {
        let index_path = self.cache_dir.join(INDEX_FILE);
        let content = serde_json::to_string(&self.index).map_err(CacheError::Serialization)?;
        fs::create_dir_all(&self.cache_dir)?;

        let tmp_path = index_path.with_extension("json.tmp");
        fs::write(&tmp_path, &content)?;
        fs::rename(&tmp_path, &index_path)?;
        Ok(())
    }
}

pub struct RedisCache {
    client: RedisClient,
    ttl_seconds: u64,
    stats: CacheStats,
}

impl RedisCache {
    pub fn new(redis_url: &str, max_age_hours: u64) -> Result<Self> {
        let client = RedisClient::open(redis_url).map_err(CacheError::Redis)?;

        Ok(Self {
            client,
            ttl_seconds: (max_age_hours * 3600).max(1),
            stats: CacheStats {
                last_cleanup: current_timestamp(),
                ..Default::default()
            },
        })
    }

    fn key(identifier: &str) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, identifier)
    }
}

#[async_trait]
impl MetadataCache for RedisCache {
    async fn get(&mut self, identifier: &str) -> Option<CachedItem> {
        self.stats.total_requests += 1;
        let key = Self::key(identifier);

        let mut con = match self.client.get_async_connection().await {
            Ok(con) => con,
            Err(e) => {
                warn!("Failed to connect to Redis: {}", e);
                return None;
            }
        };

        match con.get::<_, Option<String>>(&key).await {
            Ok(Some(value)) => match serde_json::from_str::<CachedItem>(&value) {
                Ok(item) => {
                    self.stats.cache_hits += 1;
                    debug!("Redis cache hit for {}", identifier);
                    Some(item)
                }
                Err(e) => {
                    warn!("Failed to deserialize cached item {}: {}", identifier, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Redis get error for {}: {}", key, e);
                None
            }
        }
    }

    async fn put(&mut self, identifier: &str, item: CachedItem) -> Result<()> {
        let value = serde_json::to_string(&item).map_err(CacheError::Serialization)?;
        let mut con = self
            .client
            .get_async_connection()
            .await
            .map_err(CacheError::Redis)?;

        let _: () = con
            .set_ex(Self::key(identifier), value, self.ttl_seconds)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        let mut con = self
            .client
            .get_async_connection()
            .await
            .map_err(CacheError::Redis)?;

        let pattern = format!("{}*", REDIS_KEY_PREFIX);
        let keys: Vec<String> = con.keys(&pattern).await.map_err(CacheError::Redis)?;
        if !keys.is_empty() {
            let _: () = con.del(&keys).await.map_err(CacheError::Redis)?;
        }

        self.stats = CacheStats {
            last_cleanup: current_timestamp(),
            ..Default::default()
        };
        info!("Redis cache cleared, removed {} keys", keys.len());
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.clone().with_hit_rate()
    }

    async fn cleanup_old_entries(&mut self) -> Result<()> {
        // Expiry is handled by the TTL set on each key
        self.stats.last_cleanup = current_timestamp();
        Ok(())
    }

    async fn save_index(&self) -> Result<()> {
        Ok(())
    }
}

/// Redis in front of the file cache. Reads fall through; writes go to both.
pub struct HybridCache {
    redis: Option<RedisCache>,
    file: FileCache,
}

impl HybridCache {
    pub fn new(cache_dir: PathBuf, redis_url: Option<&str>, max_age_hours: u64) -> Result<Self> {
        let file = FileCache::new(cache_dir, max_age_hours)?;

        let redis = match redis_url {
            Some(url) => match RedisCache::new(url, max_age_hours) {
                Ok(cache) => {
                    info!("Redis cache initialized");
                    Some(cache)
                }
                Err(e) => {
                    warn!("Failed to initialize Redis cache, using file cache only: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self { redis, file })
    }

    pub fn has_redis(&self) -> bool {
        self.redis.is_some()
    }
}

#[async_trait]
impl MetadataCache for HybridCache {
    async fn get(&mut self, identifier: &str) -> Option<CachedItem> {
        if let Some(redis) = &mut self.redis {
            if let Some(item) = redis.get(identifier).await {
                return Some(item);
            }
        }

        let item = self.file.get(identifier).await?;

        // Warm Redis from the file layer
        if let Some(redis) = &mut self.redis {
            if let Err(e) = redis.put(identifier, item.clone()).await {
                debug!("Failed to refresh Redis from file cache: {}", e);
            }
        }
        Some(item)
    }

    async fn put(&mut self, identifier: &str, item: CachedItem) -> Result<()> {
        let redis_error = match &mut self.redis {
            Some(redis) => redis.put(identifier, item.clone()).await.err(),
            None => None,
        };
        let file_error = self.file.put(identifier, item).await.err();

        match (redis_error, file_error) {
            (Some(redis_err), Some(file_err)) => Err(CacheError::AllLayersFailed(format!(
                "Redis: {}, File: {}",
                redis_err, file_err
            ))
            .into()),
            (Some(e), None) => {
                debug!("Redis put failed, file cache kept the entry: {}", e);
                Ok(())
            }
            (None, Some(e)) if self.redis.is_none() => Err(e),
            (None, Some(e)) => {
                debug!("File cache put failed, Redis kept the entry: {}", e);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    async fn clear(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(redis) = &mut self.redis {
            if let Err(e) = redis.clear().await {
                errors.push(format!("Redis: {}", e));
            }
        }
        if let Err(e) = self.file.clear().await {
            errors.push(format!("File: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CacheError::AllLayersFailed(errors.join(", ")).into())
        }
    }

    fn stats(&self) -> CacheStats {
        let file_stats = self.file.stats();
        match &self.redis {
            Some(redis) => {
                let redis_stats = redis.stats();
                CacheStats {
                    total_entries: file_stats.total_entries,
                    total_requests: file_stats.total_requests + redis_stats.total_requests,
                    cache_hits: file_stats.cache_hits + redis_stats.cache_hits,
                    hit_rate_percent: 0.0,
                    last_cleanup: file_stats.last_cleanup.max(redis_stats.last_cleanup),
                }
                .with_hit_rate()
            }
            None => file_stats,
        }
    }

    async fn cleanup_old_entries(&mut self) -> Result<()> {
        if let Some(redis) = &mut self.redis {
            redis.cleanup_old_entries().await?;
        }
        self.file.cleanup_old_entries().await
    }

    async fn save_index(&self) -> Result<()> {
        self.file.save_index().await
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::models::Recording;

    fn item(id: &str) -> CachedItem {
        CachedItem {
            recording: Recording::new(id),
            tracks: Vec::new(),
            reviews: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_file_cache_hit_and_miss() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileCache::new(dir.path().to_path_buf(), 24).unwrap();

        assert!(cache.get("gd77-05-08").await.is_none());
        cache.put("gd77-05-08", item("gd77-05-08")).await.unwrap();
        let hit = cache.get("gd77-05-08").await.unwrap();
        assert_eq!(hit.recording.identifier, "gd77-05-08");

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert!((stats.hit_rate_percent - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_file_cache_persists_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = FileCache::new(dir.path().to_path_buf(), 24).unwrap();
            cache.put("a", item("a")).await.unwrap();
            cache.save_index().await.unwrap();
        }
        let mut reopened = FileCache::new(dir.path().to_path_buf(), 24).unwrap();
        assert!(reopened.get("a").await.is_some());
    }

    #[tokio::test]
    async fn test_clear_resets_entries_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileCache::new(dir.path().to_path_buf(), 24).unwrap();
        cache.put("a", item("a")).await.unwrap();
        cache.get("a").await;

        cache.clear().await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_requests, 0);
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileCache::new(dir.path().to_path_buf(), 24)
            .unwrap()
            .with_max_entries(2);
        cache.put("a", item("a")).await.unwrap();
        cache.put("b", item("b")).await.unwrap();
        cache.put("c", item("c")).await.unwrap();
        assert_eq!(cache.stats().total_entries, 2);
    }

    #[tokio::test]
    async fn test_hybrid_without_redis_uses_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = HybridCache::new(dir.path().to_path_buf(), None, 24).unwrap();
        assert!(!cache.has_redis());
        cache.put("a", item("a")).await.unwrap();
        assert!(cache.get("a").await.is_some());
        assert_eq!(cache.stats().total_entries, 1);
    }
}
