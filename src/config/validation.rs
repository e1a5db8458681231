use std::path::Path;
use url::Url;
use crate::error::{Result, DeadArchiveError};

/// Centralized configuration validation utilities
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate an http(s) URL string
    pub fn validate_url(url: &str, field_name: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| {
            DeadArchiveError::Validation(format!("Invalid {} URL '{}': {}", field_name, url, e))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(DeadArchiveError::Validation(format!(
                "{} URL must use http or https, got: {}",
                field_name, url
            )));
        }
        Ok(())
    }

    /// Validate numeric range
    pub fn validate_range<T>(value: T, min: T, max: T, field_name: &str) -> Result<()>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            return Err(DeadArchiveError::Validation(format!(
                "{} must be between {} and {}, got {}",
                field_name, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate Redis URL format
    pub fn validate_redis_url(url: &str) -> Result<()> {
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(DeadArchiveError::Validation(format!(
                "Redis URL must start with 'redis://' or 'rediss://', got: {}",
                url
            )));
        }

        Url::parse(url).map_err(|e| {
            DeadArchiveError::Validation(format!("Invalid Redis URL '{}': {}", url, e))
        })?;
        Ok(())
    }

    /// Validate database file extension
    pub fn validate_db_path(path: &Path) -> Result<()> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("db") | Some("sqlite") | Some("sqlite3") => Ok(()),
            Some(_) => Err(DeadArchiveError::Validation(format!(
                "Database file should have .db, .sqlite, or .sqlite3 extension, got: {}",
                path.display()
            ))),
            None => Err(DeadArchiveError::Validation(format!(
                "Database file should have an extension (.db, .sqlite, .sqlite3), got: {}",
                path.display()
            ))),
        }
    }

    pub fn validate_year_span(start: i32, end: i32) -> Result<()> {
        Self::validate_range(start, 1960, 2100, "start year")?;
        Self::validate_range(end, 1960, 2100, "end year")?;
        if start > end {
            return Err(DeadArchiveError::Validation(format!(
                "start year {} is after end year {}",
                start, end
            )));
        }
        Ok(())
    }

    pub fn validate_formats(formats: &[String]) -> Result<()> {
        if formats.is_empty() {
            return Err(DeadArchiveError::Validation(
                "preferred_formats must name at least one audio format".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_url() {
        assert!(ConfigValidator::validate_url("https://archive.org", "archive").is_ok());
        assert!(ConfigValidator::validate_url("not-a-url", "archive").is_err());
        assert!(ConfigValidator::validate_url("ftp://archive.org", "archive").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(ConfigValidator::validate_range(5u64, 1u64, 10u64, "test").is_ok());
        assert!(ConfigValidator::validate_range(15u64, 1u64, 10u64, "test").is_err());
        assert!(ConfigValidator::validate_range(0u64, 1u64, 10u64, "test").is_err());
    }

    #[test]
    fn test_validate_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6380").is_ok());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_validate_db_path() {
        assert!(ConfigValidator::validate_db_path(&PathBuf::from("test.db")).is_ok());
        assert!(ConfigValidator::validate_db_path(&PathBuf::from("test.sqlite3")).is_ok());
        assert!(ConfigValidator::validate_db_path(&PathBuf::from("test.txt")).is_err());
        assert!(ConfigValidator::validate_db_path(&PathBuf::from("test")).is_err());
    }

    #[test]
    fn test_validate_year_span() {
        assert!(ConfigValidator::validate_year_span(1965, 1995).is_ok());
        assert!(ConfigValidator::validate_year_span(1977, 1977).is_ok());
        assert!(ConfigValidator::validate_year_span(1995, 1965).is_err());
        assert!(ConfigValidator::validate_year_span(1800, 1995).is_err());
    }
}
