use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use directories::ProjectDirs;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};

pub mod builder;
pub mod env;
pub mod validation;

pub use builder::ConfigBuilder;

pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://archive.org";
pub const DEFAULT_COLLECTION: &str = "GratefulDead";

/// Archive.org refuses advanced-search pages larger than this.
pub const MAX_SEARCH_ROWS: usize = 10_000;

fn default_start_year() -> i32 {
    1965
}

fn default_end_year() -> i32 {
    1995
}

fn default_search_row_limit() -> usize {
    MAX_SEARCH_ROWS
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_interval_ms() -> u64 {
    250
}

fn default_parallel_downloads() -> usize {
    3
}

fn default_preferred_formats() -> Vec<String> {
    vec![
        "VBR MP3".to_string(),
        "Ogg Vorbis".to_string(),
        "Flac".to_string(),
    ]
}

fn default_cache_max_age_hours() -> u64 {
    24 * 7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database file path
    pub database_path: PathBuf,

    /// Archive.org base URL
    pub archive_base_url: String,

    /// Archive.org collection holding the recordings
    pub collection: String,

    /// Where downloaded audio files are stored
    pub download_dir: PathBuf,

    /// First year covered by catalog sync
    #[serde(default = "default_start_year")]
    pub start_year: i32,

    /// Last year covered by catalog sync
    #[serde(default = "default_end_year")]
    pub end_year: i32,

    /// Max rows per advanced-search request
    #[serde(default = "default_search_row_limit")]
    pub search_row_limit: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between retry attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Minimum spacing between API requests (milliseconds)
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    #[serde(default = "default_parallel_downloads")]
    pub parallel_downloads: usize,

    /// Audio formats to download, most preferred first
    #[serde(default = "default_preferred_formats")]
    pub preferred_formats: Vec<String>,

    /// Redis URL for metadata cache (optional)
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_cache_max_age_hours")]
    pub cache_max_age_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_path = default_data_path();

        Self {
            database_path: data_path.join("deadarchive.db"),
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            download_dir: data_path.join("downloads"),
            start_year: default_start_year(),
            end_year: default_end_year(),
            search_row_limit: default_search_row_limit(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_interval_ms: default_request_interval_ms(),
            parallel_downloads: default_parallel_downloads(),
            preferred_formats: default_preferred_formats(),
            redis_url: None,
            cache_max_age_hours: default_cache_max_age_hours(),
        }
    }
}

/// Platform data directory, or `/data` when running under Docker.
pub(crate) fn default_data_path() -> PathBuf {
    if std::env::var(env::EnvVars::DOCKER).is_ok() {
        return PathBuf::from("/data");
    }
    match ProjectDirs::from("org", "deadarchive", "deadarchive") {
        Some(project_dirs) => project_dirs.data_dir().to_path_buf(),
        None => {
            warn!("ProjectDirs unavailable; falling back to current directory for data path");
            PathBuf::from(".")
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `.env` and `DEADARCHIVE_*` variables.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_file = match config_path {
            Some(path) => PathBuf::from(path),
            None => Self::default_config_path()?,
        };

        let base = if config_file.exists() {
            debug!("Loading config from {}", config_file.display());
            let content = fs::read_to_string(&config_file)?;
            toml::from_str::<Config>(&content)?
        } else {
            Self::default()
        };

        let config = ConfigBuilder::from_config(base).load_from_env()?.build()?;

        if let Some(parent) = config.database_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !config_file.exists() {
            if let Some(parent) = config_file.parent() {
                fs::create_dir_all(parent)?;
            }
            config.save(&config_file)?;
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn default_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("org", "deadarchive", "deadarchive")
            .ok_or(ConfigError::NoProjectDirs)?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Self::default_config_path()
    }

    /// Directory holding the metadata cache index.
    pub fn cache_dir(&self) -> PathBuf {
        self.database_path
            .parent()
            .unwrap_or(&self.database_path)
            .join("cache")
    }
}
