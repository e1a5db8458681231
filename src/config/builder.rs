use std::path::{Path, PathBuf};
use crate::error::Result;
use crate::config::validation::ConfigValidator;
use crate::config::env::{EnvVars, EnvParser};
use crate::config::{default_data_path, Config, DEFAULT_ARCHIVE_BASE_URL, DEFAULT_COLLECTION, MAX_SEARCH_ROWS};

/// Configuration builder with validation and type safety
#[derive(Default)]
pub struct ConfigBuilder {
    database_path: Option<PathBuf>,
    archive_base_url: Option<String>,
    collection: Option<String>,
    download_dir: Option<PathBuf>,
    start_year: Option<i32>,
    end_year: Option<i32>,
    search_row_limit: Option<usize>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    request_interval_ms: Option<u64>,
    parallel_downloads: Option<usize>,
    preferred_formats: Option<Vec<String>>,
    redis_url: Option<Option<String>>,
    cache_max_age_hours: Option<u64>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-loaded configuration (e.g. the TOML file)
    pub fn from_config(config: Config) -> Self {
        Self {
            database_path: Some(config.database_path),
            archive_base_url: Some(config.archive_base_url),
            collection: Some(config.collection),
            download_dir: Some(config.download_dir),
            start_year: Some(config.start_year),
            end_year: Some(config.end_year),
            search_row_limit: Some(config.search_row_limit),
            max_retries: Some(config.max_retries),
            retry_delay_ms: Some(config.retry_delay_ms),
            request_interval_ms: Some(config.request_interval_ms),
            parallel_downloads: Some(config.parallel_downloads),
            preferred_formats: Some(config.preferred_formats),
            redis_url: Some(config.redis_url),
            cache_max_age_hours: Some(config.cache_max_age_hours),
        }
    }

    pub fn database_path<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ConfigValidator::validate_db_path(&path)?;
        self.database_path = Some(path);
        Ok(self)
    }

    pub fn archive_base_url<S: Into<String>>(mut self, url: S) -> Result<Self> {
        let url = url.into();
        ConfigValidator::validate_url(&url, "Archive.org base")?;
        self.archive_base_url = Some(url.trim_end_matches('/').to_string());
        Ok(self)
    }

    pub fn collection<S: Into<String>>(mut self, collection: S) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn download_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.download_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn year_span(mut self, start: i32, end: i32) -> Result<Self> {
        ConfigValidator::validate_year_span(start, end)?;
        self.start_year = Some(start);
        self.end_year = Some(end);
        Ok(self)
    }

    pub fn search_row_limit(mut self, rows: usize) -> Result<Self> {
        ConfigValidator::validate_range(rows, 100, MAX_SEARCH_ROWS, "search row limit")?;
        self.search_row_limit = Some(rows);
        Ok(self)
    }

    pub fn max_retries(mut self, retries: u32) -> Result<Self> {
        ConfigValidator::validate_range(retries, 1, 10, "max retries")?;
        self.max_retries = Some(retries);
        Ok(self)
    }

    pub fn retry_delay_ms(mut self, delay: u64) -> Result<Self> {
        ConfigValidator::validate_range(delay, 0, 60_000, "retry delay (ms)")?;
        self.retry_delay_ms = Some(delay);
        Ok(self)
    }

    pub fn request_interval_ms(mut self, interval: u64) -> Result<Self> {
        ConfigValidator::validate_range(interval, 0, 10_000, "request interval (ms)")?;
        self.request_interval_ms = Some(interval);
        Ok(self)
    }

    pub fn parallel_downloads(mut self, parallel: usize) -> Result<Self> {
        ConfigValidator::validate_range(parallel, 1, 16, "parallel downloads")?;
        self.parallel_downloads = Some(parallel);
        Ok(self)
    }

    pub fn preferred_formats(mut self, formats: Vec<String>) -> Result<Self> {
        ConfigValidator::validate_formats(&formats)?;
        self.preferred_formats = Some(formats);
        Ok(self)
    }

    pub fn redis_url<S: Into<String>>(mut self, url: Option<S>) -> Result<Self> {
        if let Some(url) = url {
            let url = url.into();
            ConfigValidator::validate_redis_url(&url)?;
            self.redis_url = Some(Some(url));
        } else {
            self.redis_url = Some(None);
        }
        Ok(self)
    }

    pub fn cache_max_age_hours(mut self, hours: u64) -> Result<Self> {
        ConfigValidator::validate_range(hours, 1, 24 * 365, "cache max age (hours)")?;
        self.cache_max_age_hours = Some(hours);
        Ok(self)
    }

    /// Load values from environment variables with validation
    pub fn load_from_env(mut self) -> Result<Self> {
        if let Some(path) = EnvParser::parse_path(EnvVars::DATABASE_PATH)? {
            self = self.database_path(path)?;
        }

        if let Some(url) = EnvParser::parse_string(EnvVars::ARCHIVE_BASE_URL, None)? {
            self = self.archive_base_url(url)?;
        }

        if let Some(collection) = EnvParser::parse_string(EnvVars::COLLECTION, None)? {
            self = self.collection(collection);
        }

        if let Some(dir) = EnvParser::parse_path(EnvVars::DOWNLOAD_DIR)? {
            self = self.download_dir(dir);
        }

        let start = EnvParser::parse_number::<i32>(EnvVars::START_YEAR, 1960, 2100)?;
        let end = EnvParser::parse_number::<i32>(EnvVars::END_YEAR, 1960, 2100)?;
        if start.is_some() || end.is_some() {
            let start = start.or(self.start_year).unwrap_or(1965);
            let end = end.or(self.end_year).unwrap_or(1995);
            self = self.year_span(start, end)?;
        }

        if let Some(rows) = EnvParser::parse_number::<usize>(EnvVars::SEARCH_ROW_LIMIT, 100, MAX_SEARCH_ROWS)? {
            self = self.search_row_limit(rows)?;
        }

        if let Some(retries) = EnvParser::parse_number::<u32>(EnvVars::MAX_RETRIES, 1, 10)? {
            self = self.max_retries(retries)?;
        }

        if let Some(delay) = EnvParser::parse_number::<u64>(EnvVars::RETRY_DELAY_MS, 0, 60_000)? {
            self = self.retry_delay_ms(delay)?;
        }

        if let Some(interval) = EnvParser::parse_number::<u64>(EnvVars::REQUEST_INTERVAL_MS, 0, 10_000)? {
            self = self.request_interval_ms(interval)?;
        }

        if let Some(parallel) = EnvParser::parse_number::<usize>(EnvVars::PARALLEL_DOWNLOADS, 1, 16)? {
            self = self.parallel_downloads(parallel)?;
        }

        if let Some(formats) = EnvParser::parse_list(EnvVars::PREFERRED_FORMATS)? {
            self = self.preferred_formats(formats)?;
        }

        if let Some(redis) = EnvParser::parse_string(EnvVars::REDIS_URL, Some(|url| {
            ConfigValidator::validate_redis_url(url)
        }))? {
            self = self.redis_url(Some(redis))?;
        }

        if let Some(hours) = EnvParser::parse_number::<u64>(EnvVars::CACHE_MAX_AGE_HOURS, 1, 24 * 365)? {
            self = self.cache_max_age_hours(hours)?;
        }

        Ok(self)
    }

    /// Build the configuration with defaults
    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();
        let data_path = || default_data_path();

        let config = Config {
            database_path: self.database_path
                .unwrap_or_else(|| data_path().join("deadarchive.db")),
            archive_base_url: self.archive_base_url
                .unwrap_or_else(|| DEFAULT_ARCHIVE_BASE_URL.to_string()),
            collection: self.collection
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            download_dir: self.download_dir
                .unwrap_or_else(|| data_path().join("downloads")),
            start_year: self.start_year.unwrap_or(defaults.start_year),
            end_year: self.end_year.unwrap_or(defaults.end_year),
            search_row_limit: self.search_row_limit.unwrap_or(defaults.search_row_limit),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            request_interval_ms: self.request_interval_ms.unwrap_or(defaults.request_interval_ms),
            parallel_downloads: self.parallel_downloads.unwrap_or(defaults.parallel_downloads),
            preferred_formats: self.preferred_formats.unwrap_or(defaults.preferred_formats),
            redis_url: self.redis_url.unwrap_or(None),
            cache_max_age_hours: self.cache_max_age_hours.unwrap_or(defaults.cache_max_age_hours),
        };

        config.validate()?;

        Ok(config)
    }
}

impl Config {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        ConfigValidator::validate_db_path(&self.database_path)?;
        ConfigValidator::validate_url(&self.archive_base_url, "Archive.org base")?;
        ConfigValidator::validate_year_span(self.start_year, self.end_year)?;
        ConfigValidator::validate_range(self.search_row_limit, 100, MAX_SEARCH_ROWS, "search row limit")?;
        ConfigValidator::validate_range(self.max_retries, 1, 10, "max retries")?;
        ConfigValidator::validate_range(self.parallel_downloads, 1, 16, "parallel downloads")?;
        ConfigValidator::validate_formats(&self.preferred_formats)?;

        if let Some(ref url) = self.redis_url {
            ConfigValidator::validate_redis_url(url)?;
        }

        Ok(())
    }
}
