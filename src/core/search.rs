//! Catalog search
//!
//! Four lookups run side by side, each on its own read-only connection:
//! dates, venues, recordings and song titles. Their show ids are merged,
//! scored and ranked.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::core::catalog::normalize::{normalize_date, normalize_venue};
use crate::core::data::models::Show;
use crate::core::data::Database;
use crate::error::Result;

static YEAR_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})(?:[-/.](\d{1,2}))?$").unwrap());

/// Lookups over-fetch so the merge has room to rank.
const LOOKUP_FACTOR: usize = 4;
const MIN_LOOKUP_ROWS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MatchKind {
    Date,
    Venue,
    Recording,
    Track,
}

impl MatchKind {
    fn bonus(&self) -> i64 {
        match self {
            MatchKind::Date => 100,
            MatchKind::Venue => 60,
            MatchKind::Track => 40,
            MatchKind::Recording => 30,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchKind::Date => "date",
            MatchKind::Venue => "venue",
            MatchKind::Recording => "recording",
            MatchKind::Track => "song",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub show: Show,
    pub score: i64,
    pub matched: Vec<MatchKind>,
}

/// Turn a query into a `YYYY`, `YYYY-MM` or `YYYY-MM-DD` prefix if it
/// looks like a date at all.
pub fn date_prefix(query: &str) -> Option<String> {
    let query = query.trim();
    if !query.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if let Some(date) = normalize_date(query) {
        return Some(date);
    }

    let caps = YEAR_MONTH.captures(query)?;
    let year: i32 = caps[1].parse().ok()?;
    match caps.get(2) {
        Some(month) => {
            let month: u32 = month.as_str().parse().ok()?;
            (1..=12).contains(&month).then(|| format!("{:04}-{:02}", year, month))
        }
        None => Some(format!("{:04}", year)),
    }
}

#[derive(Clone)]
pub struct SearchService {
    db_path: PathBuf,
}

impl SearchService {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows = (limit * LOOKUP_FACTOR).max(MIN_LOOKUP_ROWS);
        let lowered = query.to_lowercase();
        let venue_needle = Some(normalize_venue(query)).filter(|v| !v.is_empty());

        let (dates, venues, recordings, tracks) = tokio::join!(
            self.lookup(MatchKind::Date, date_prefix(query), rows, |db, needle, rows| {
                db.show_ids_by_date_prefix(needle, rows)
            }),
            self.lookup(MatchKind::Venue, venue_needle, rows, |db, needle, rows| {
                db.show_ids_by_venue(needle, rows)
            }),
            self.lookup(MatchKind::Recording, Some(lowered.clone()), rows, |db, needle, rows| {
                db.show_ids_by_recording(needle, rows)
            }),
            self.lookup(MatchKind::Track, Some(lowered.clone()), rows, |db, needle, rows| {
                db.show_ids_by_track_title(needle, rows)
            }),
        );

        let mut matched: HashMap<String, Vec<MatchKind>> = HashMap::new();
        for (kind, ids) in [dates, venues, recordings, tracks] {
            for id in ids {
                let kinds = matched.entry(id).or_default();
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }

        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = matched.keys().cloned().collect();
        let shows = self.load_shows(ids).await?;

        let matcher = SkimMatcherV2::default();
        let mut hits: Vec<SearchHit> = shows
            .into_iter()
            .map(|show| {
                let mut kinds = matched.remove(&show.show_id).unwrap_or_default();
                kinds.sort();
                let haystack = format!(
                    "{} {} {}",
                    show.date,
                    show.venue_name,
                    show.location.as_deref().unwrap_or_default()
                );
                let fuzzy = matcher.fuzzy_match(&haystack, query).unwrap_or(0);
                let score = fuzzy + kinds.iter().map(MatchKind::bonus).sum::<i64>();
                SearchHit {
                    show,
                    score,
                    matched: kinds,
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.show.date.cmp(&b.show.date)));
        hits.truncate(limit);
        debug!("Search '{}' returned {} shows", query, hits.len());
        Ok(hits)
    }

    /// Run one lookup on its own connection. Failures are logged and yield
    /// nothing.
    async fn lookup<F>(&self, kind: MatchKind, needle: Option<String>, rows: usize, query: F) -> (MatchKind, Vec<String>)
    where
        F: FnOnce(&Database, &str, usize) -> Result<Vec<String>> + Send + 'static,
    {
        let Some(needle) = needle else {
            return (kind, Vec::new());
        };

        let path = self.db_path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let db = Database::open_read_only(&path)?;
            query(&db, &needle, rows)
        })
        .await;

        match joined {
            Ok(Ok(ids)) => (kind, ids),
            Ok(Err(e)) => {
                warn!("{} lookup failed: {}", kind.label(), e);
                (kind, Vec::new())
            }
            Err(e) => {
                warn!("{} lookup panicked: {}", kind.label(), e);
                (kind, Vec::new())
            }
        }
    }

    async fn load_shows(&self, ids: Vec<String>) -> Result<Vec<Show>> {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || Database::open_read_only(&path)?.get_shows(&ids)).await?
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::database::tests::{sample_recording, sample_show, sample_venue};
    use crate::core::data::models::{Track, Venue};

    fn seeded_file_db(dir: &Path) -> PathBuf {
        let path = dir.join("catalog.db");
        let db = Database::open(&path).unwrap();
        let tx = db.catalog();
        tx.upsert_venue(&sample_venue()).unwrap();
        tx.upsert_show(&sample_show()).unwrap();
        tx.upsert_recording(&sample_recording("gd77-05-08.sbd.hicks.4982.sbeok.shnf")).unwrap();
        tx.replace_tracks(
            "gd77-05-08.sbd.hicks.4982.sbeok.shnf",
            &[Track {
                recording_id: "gd77-05-08.sbd.hicks.4982.sbeok.shnf".to_string(),
                filename: "gd77-05-08d2t02.mp3".to_string(),
                track_number: Some(2),
                title: Some("Scarlet Begonias".to_string()),
                duration_seconds: None,
                format: None,
                size_bytes: None,
            }],
        )
        .unwrap();

        let winterland = Venue {
            venue_id: "winterland-arena".to_string(),
            name: "Winterland Arena".to_string(),
            city: Some("San Francisco".to_string()),
            state: Some("CA".to_string()),
            country: Some("USA".to_string()),
            show_count: 0,
        };
        tx.upsert_venue(&winterland).unwrap();
        let mut show = sample_show();
        show.show_id = "1977-06-09-winterland-arena".to_string();
        show.date = "1977-06-09".to_string();
        show.venue_id = winterland.venue_id.clone();
        show.venue_name = winterland.name.clone();
        show.location = Some("San Francisco, CA".to_string());
        tx.upsert_show(&show).unwrap();
        tx.refresh_counts().unwrap();
        path
    }

    #[test]
    fn test_date_prefix_forms() {
        assert_eq!(date_prefix("1977-05-08").as_deref(), Some("1977-05-08"));
        assert_eq!(date_prefix("5/8/77").as_deref(), Some("1977-05-08"));
        assert_eq!(date_prefix("1977").as_deref(), Some("1977"));
        assert_eq!(date_prefix("1977-5").as_deref(), Some("1977-05"));
        assert_eq!(date_prefix("1977-13"), None);
        assert_eq!(date_prefix("scarlet"), None);
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = SearchService::new(seeded_file_db(dir.path()));
        assert!(service.search("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_year_matches_every_show_that_year() {
        let dir = tempfile::tempdir().unwrap();
        let service = SearchService::new(seeded_file_db(dir.path()));

        let hits = service.search("1977", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.matched.contains(&MatchKind::Date)));
        assert_eq!(service.search("1977", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookups_merge_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let service = SearchService::new(seeded_file_db(dir.path()));

        let hits = service.search("scarlet", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched, vec![MatchKind::Track]);

        let hits = service.search("Barton Hall", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].show.show_id, "1977-05-08-barton-hall-cornell-university");
        assert!(hits[0].matched.contains(&MatchKind::Venue));

        let hits = service.search("san francisco", 10).await.unwrap();
        assert_eq!(hits[0].show.show_id, "1977-06-09-winterland-arena");
    }

    #[tokio::test]
    async fn test_missing_database_yields_no_hits() {
        let dir = tempfile::tempdir().unwrap();
        let service = SearchService::new(dir.path().join("absent.db"));
        // Every lookup fails to open; nothing matches
        assert!(service.search("1977", 10).await.unwrap().is_empty());
    }
}
