//! External services integration
//!
//! - Archive.org advanced search, metadata and download endpoints
//! - Lenient deserializers for Archive.org's loosely typed JSON
//! - Cached metadata lookups with database fallback

pub mod archive;
pub mod flexible;
pub mod metadata;

pub use archive::ArchiveClient;
pub use metadata::{MetadataService, SharedCache, SharedDatabase};
