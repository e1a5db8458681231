//! Catalog rows stored in the local cache database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DatabaseError;

/// Where a recording's audio was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Sbd,
    Matrix,
    Aud,
    Fm,
    Remaster,
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Sbd => "SBD",
            SourceType::Matrix => "MATRIX",
            SourceType::Aud => "AUD",
            SourceType::Fm => "FM",
            SourceType::Remaster => "REMASTER",
            SourceType::Unknown => "UNKNOWN",
        }
    }

    /// Rating weight applied when aggregating reviews.
    pub fn weight(&self) -> f64 {
        match self {
            SourceType::Sbd => 1.0,
            SourceType::Matrix => 0.9,
            SourceType::Fm => 0.8,
            SourceType::Aud => 0.7,
            SourceType::Remaster => 1.0,
            SourceType::Unknown => 0.5,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SBD" | "SOUNDBOARD" => Ok(SourceType::Sbd),
            "MATRIX" => Ok(SourceType::Matrix),
            "AUD" | "AUDIENCE" => Ok(SourceType::Aud),
            "FM" => Ok(SourceType::Fm),
            "REMASTER" => Ok(SourceType::Remaster),
            "UNKNOWN" | "" => Ok(SourceType::Unknown),
            other => Err(DatabaseError::InvalidValue {
                field: "source_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub venue_id: String,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub show_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub show_id: String,
    /// YYYY-MM-DD
    pub date: String,
    pub year: i32,
    pub venue_id: String,
    pub venue_name: String,
    pub location: Option<String>,
    pub recording_count: i64,
    pub best_recording_id: Option<String>,
    pub rating: Option<f64>,
    pub rating_confidence: Option<f64>,
    pub review_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub identifier: String,
    pub show_id: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub source_type: SourceType,
    pub taper: Option<String>,
    pub lineage: Option<String>,
    /// Archive.org's raw review average
    pub avg_rating: Option<f64>,
    /// Source-weighted rating written by `ratings apply`
    #[serde(default)]
    pub weighted_rating: Option<f64>,
    pub num_reviews: i64,
    pub tracks_fetched: bool,
}

impl Recording {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            show_id: None,
            title: None,
            date: None,
            venue: None,
            location: None,
            source_type: SourceType::Unknown,
            taper: None,
            lineage: None,
            avg_rating: None,
            weighted_rating: None,
            num_reviews: 0,
            tracks_fetched: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub recording_id: String,
    pub filename: String,
    pub track_number: Option<u32>,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    pub format: Option<String>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        match (self, next) {
            (Queued, Downloading) => true,
            (Downloading, Completed) | (Downloading, Failed) => true,
            (Failed, Queued) | (Cancelled, Queued) => true,
            (Completed, _) => false,
            (_, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DownloadStatus::Queued),
            "downloading" => Ok(DownloadStatus::Downloading),
            "completed" => Ok(DownloadStatus::Completed),
            "failed" => Ok(DownloadStatus::Failed),
            "cancelled" => Ok(DownloadStatus::Cancelled),
            other => Err(DatabaseError::InvalidValue {
                field: "status".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadEntry {
    pub id: i64,
    pub recording_id: String,
    pub filename: String,
    pub url: String,
    pub local_path: String,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Snapshot of the `sync_metadata` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncMetadata {
    pub last_sync_at: Option<String>,
    pub sync_source: Option<String>,
    pub total_shows: i64,
    pub total_recordings: i64,
    pub catalog_version: Option<String>,
}

impl SyncMetadata {
    pub fn is_synced(&self) -> bool {
        self.last_sync_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_parsing() {
        assert_eq!("sbd".parse::<SourceType>().unwrap(), SourceType::Sbd);
        assert_eq!("Soundboard".parse::<SourceType>().unwrap(), SourceType::Sbd);
        assert_eq!("".parse::<SourceType>().unwrap(), SourceType::Unknown);
        assert!("tape".parse::<SourceType>().is_err());
        assert_eq!(SourceType::Matrix.to_string(), "MATRIX");
    }

    #[test]
    fn test_download_status_transitions() {
        use DownloadStatus::*;
        assert!(Queued.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Completed));
        assert!(Downloading.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Cancelled));
        assert!(Downloading.can_transition_to(Cancelled));

        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Downloading));
    }
}
