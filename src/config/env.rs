use std::env;
use std::path::PathBuf;
use crate::error::{Result, DeadArchiveError};

/// Environment variable configuration constants
pub struct EnvVars;

impl EnvVars {
    pub const DATABASE_PATH: &'static str = "DEADARCHIVE_DATABASE_PATH";
    pub const ARCHIVE_BASE_URL: &'static str = "DEADARCHIVE_ARCHIVE_BASE_URL";
    pub const COLLECTION: &'static str = "DEADARCHIVE_COLLECTION";
    pub const DOWNLOAD_DIR: &'static str = "DEADARCHIVE_DOWNLOAD_DIR";
    pub const START_YEAR: &'static str = "DEADARCHIVE_START_YEAR";
    pub const END_YEAR: &'static str = "DEADARCHIVE_END_YEAR";
    pub const SEARCH_ROW_LIMIT: &'static str = "DEADARCHIVE_SEARCH_ROW_LIMIT";
    pub const MAX_RETRIES: &'static str = "DEADARCHIVE_MAX_RETRIES";
    pub const RETRY_DELAY_MS: &'static str = "DEADARCHIVE_RETRY_DELAY_MS";
    pub const REQUEST_INTERVAL_MS: &'static str = "DEADARCHIVE_REQUEST_INTERVAL_MS";
    pub const PARALLEL_DOWNLOADS: &'static str = "DEADARCHIVE_PARALLEL_DOWNLOADS";
    pub const PREFERRED_FORMATS: &'static str = "DEADARCHIVE_PREFERRED_FORMATS";
    pub const REDIS_URL: &'static str = "DEADARCHIVE_REDIS_URL";
    pub const CACHE_MAX_AGE_HOURS: &'static str = "DEADARCHIVE_CACHE_MAX_AGE_HOURS";

    // Special environment variables
    pub const DOCKER: &'static str = "DOCKER";
}

/// Environment variable parsing utilities with validation
pub struct EnvParser;

impl EnvParser {
    /// Parse environment variable as string with validation
    pub fn parse_string(var_name: &str, validator: Option<fn(&str) -> Result<()>>) -> Result<Option<String>> {
        match env::var(var_name) {
            Ok(value) => {
                let trimmed = value.trim().to_string();
                if trimmed.is_empty() {
                    return Ok(None);
                }

                if let Some(validate_fn) = validator {
                    validate_fn(&trimmed)?;
                }

                Ok(Some(trimmed))
            }
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => {
                Err(DeadArchiveError::Validation(format!(
                    "Environment variable {} contains invalid UTF-8",
                    var_name
                )))
            }
        }
    }

    pub fn parse_path(var_name: &str) -> Result<Option<PathBuf>> {
        Ok(Self::parse_string(var_name, None)?.map(PathBuf::from))
    }

    /// Comma-separated list, empty items dropped
    pub fn parse_list(var_name: &str) -> Result<Option<Vec<String>>> {
        Ok(Self::parse_string(var_name, None)?.map(|value| {
            value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        }))
    }

    /// Parse an integer with range validation
    pub fn parse_number<T>(var_name: &str, min: T, max: T) -> Result<Option<T>>
    where
        T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
    {
        if let Some(value_str) = Self::parse_string(var_name, None)? {
            let value = value_str.parse::<T>().map_err(|_| {
                DeadArchiveError::Validation(format!(
                    "Invalid number in {}: '{}'",
                    var_name, value_str
                ))
            })?;

            if value < min || value > max {
                return Err(DeadArchiveError::Validation(format!(
                    "Value in {} must be between {} and {}, got {}",
                    var_name, min, max, value
                )));
            }

            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Get all DEADARCHIVE environment variables for debugging
    pub fn get_all_vars() -> Vec<(String, String)> {
        env::vars()
            .filter(|(key, _)| key.starts_with("DEADARCHIVE_"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_parse_number() {
        env::set_var("TEST_DA_NUM_VALID", "42");
        env::set_var("TEST_DA_NUM_OUT_OF_RANGE", "150");
        env::set_var("TEST_DA_NUM_INVALID", "not_a_number");

        assert_eq!(EnvParser::parse_number::<u64>("TEST_DA_NUM_VALID", 1, 100).unwrap(), Some(42));
        assert!(EnvParser::parse_number::<u64>("TEST_DA_NUM_OUT_OF_RANGE", 1, 100).is_err());
        assert!(EnvParser::parse_number::<u64>("TEST_DA_NUM_INVALID", 1, 100).is_err());
        assert_eq!(EnvParser::parse_number::<u64>("TEST_DA_NUM_NOT_SET", 1, 100).unwrap(), None);

        env::remove_var("TEST_DA_NUM_VALID");
        env::remove_var("TEST_DA_NUM_OUT_OF_RANGE");
        env::remove_var("TEST_DA_NUM_INVALID");
    }

    #[test]
    fn test_parse_list() {
        env::set_var("TEST_DA_LIST", "Flac, VBR MP3 ,,");
        assert_eq!(
            EnvParser::parse_list("TEST_DA_LIST").unwrap(),
            Some(vec!["Flac".to_string(), "VBR MP3".to_string()])
        );
        env::remove_var("TEST_DA_LIST");

        env::set_var("TEST_DA_BLANK", "   ");
        assert_eq!(EnvParser::parse_string("TEST_DA_BLANK", None).unwrap(), None);
        env::remove_var("TEST_DA_BLANK");
    }
}
