//! Infrastructure concerns: the layered metadata cache.

pub mod cache;

pub use cache::{CacheStats, CachedItem, FileCache, HybridCache, MetadataCache, RedisCache};
