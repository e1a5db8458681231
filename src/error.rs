//! Error handling for the deadarchive application
//!
//! This module provides a hierarchical error system. Batch operations (sync,
//! import, downloads) log and skip per-item failures, so these types mostly
//! surface from setup paths and single-item commands.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeadArchiveError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("File system error: {0}")]
    FileSystem(#[from] FileSystemError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed: {0}")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Database corruption detected")]
    Corruption,

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API rate limit exceeded")]
    RateLimit,

    #[error("API response invalid: {reason}")]
    InvalidResponse { reason: String },

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

#[derive(Error, Debug)]
pub enum FileSystemError {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("Unsafe file name: {name}")]
    UnsafeFileName { name: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid config format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine platform directories")]
    NoProjectDirs,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    Serialization(serde_json::Error),

    #[error("Both cache layers failed: {0}")]
    AllLayersFailed(String),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported catalog source: {path}")]
    UnsupportedSource { path: PathBuf },

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed entry {name}: {reason}")]
    MalformedEntry { name: String, reason: String },

    #[error("Catalog bundle is empty: {path}")]
    EmptyBundle { path: PathBuf },

    #[error("Failed to list bundle files: {0}")]
    Walk(String),
}

pub type Result<T> = std::result::Result<T, DeadArchiveError>;

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(
                ffi::Error {
                    code: ffi::ErrorCode::DatabaseCorrupt,
                    ..
                },
                _,
            ) => DatabaseError::Corruption,
            _ => DatabaseError::Query(err),
        }
    }
}

use rusqlite::ffi;

impl From<rusqlite::Error> for DeadArchiveError {
    fn from(err: rusqlite::Error) -> Self {
        DeadArchiveError::Database(err.into())
    }
}

impl From<reqwest::Error> for DeadArchiveError {
    fn from(err: reqwest::Error) -> Self {
        DeadArchiveError::Network(NetworkError::Http(err))
    }
}

impl From<std::io::Error> for FileSystemError {
    fn from(err: std::io::Error) -> Self {
        FileSystemError::Io(err)
    }
}

impl From<std::io::Error> for DeadArchiveError {
    fn from(err: std::io::Error) -> Self {
        DeadArchiveError::FileSystem(FileSystemError::Io(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err)
    }
}

impl From<serde_json::Error> for DeadArchiveError {
    fn from(err: serde_json::Error) -> Self {
        DeadArchiveError::Cache(CacheError::Serialization(err))
    }
}

impl From<toml::de::Error> for DeadArchiveError {
    fn from(err: toml::de::Error) -> Self {
        DeadArchiveError::Config(ConfigError::InvalidFormat(err))
    }
}

impl From<toml::ser::Error> for DeadArchiveError {
    fn from(err: toml::ser::Error) -> Self {
        DeadArchiveError::Config(ConfigError::Serialize(err))
    }
}

impl From<zip::result::ZipError> for DeadArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        DeadArchiveError::Import(ImportError::Zip(err))
    }
}

impl From<tokio::task::JoinError> for DeadArchiveError {
    fn from(err: tokio::task::JoinError) -> Self {
        DeadArchiveError::Internal(err.into())
    }
}

impl DeadArchiveError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DeadArchiveError::Network(NetworkError::Http(e)) => {
                e.is_timeout() || e.is_connect() || e.is_request()
            }
            DeadArchiveError::Network(NetworkError::RateLimit) => true,
            DeadArchiveError::Network(NetworkError::Status { status, .. }) => *status >= 500,
            _ => false,
        }
    }
}
