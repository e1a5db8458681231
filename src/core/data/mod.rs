//! Data layer
//!
//! SQLite cache of the show catalog plus the row types it stores.

pub mod database;
pub mod models;

pub use database::{CatalogCounts, CatalogTx, Database, ShowFilter};
pub use models::{DownloadEntry, DownloadStatus, Recording, Show, SourceType, SyncMetadata, Track, Venue};
