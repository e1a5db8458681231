//! Core functionality modules
//!
//! - `data`: SQLite catalog and download queue
//! - `services`: Archive.org client and metadata lookups
//! - `infrastructure`: metadata cache layers
//! - `catalog`: normalization, grouping, import, sync and ratings
//! - `search`, `downloads`: user-facing operations over the catalog

pub mod catalog;
pub mod data;
pub mod downloads;
pub mod infrastructure;
pub mod search;
pub mod services;

pub use data::Database;
