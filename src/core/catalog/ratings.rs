//! Show ratings from Archive.org reviews
//!
//! Recording ratings weight the average star count by source quality and
//! by how many reviews back it up. Show ratings combine the recordings of a
//! show, weighted by review count and source quality.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::core::catalog::normalize::{normalize_date, show_id};
use crate::core::catalog::progress::{ProgressTracker, SyncPhase};
use crate::core::data::models::SourceType;
use crate::core::data::Database;
use crate::core::services::metadata::MetadataService;
use crate::error::Result;

pub const RATINGS_FORMAT_VERSION: &str = "1.0.0";
pub const MIN_RATING_FOR_INCLUSION: f64 = 2.5;
pub const MIN_REVIEWS_FOR_CONFIDENCE: i64 = 3;
pub const TOP_SHOW_MIN_CONFIDENCE: f64 = 0.7;
pub const MAX_TOP_SHOWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingRating {
    pub identifier: String,
    pub rating: f64,
    pub review_count: i64,
    pub source_type: SourceType,
    pub confidence: f64,
}

impl RecordingRating {
    pub fn new(identifier: impl Into<String>, rating: f64, review_count: i64, source_type: SourceType) -> Self {
        Self {
            identifier: identifier.into(),
            rating,
            review_count,
            source_type,
            confidence: (review_count as f64 / 5.0).min(1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowRating {
    pub date: String,
    pub venue: String,
    pub rating: f64,
    pub confidence: f64,
    pub best_recording: String,
    pub recording_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopShow {
    pub show_key: String,
    pub rating: f64,
    pub date: String,
    pub venue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingsMetadata {
    pub generated_at: String,
    pub version: String,
    pub total_recordings: usize,
    pub total_shows: usize,
    pub processing_notes: String,
}

/// `ratings.json` as written by `ratings generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingsFile {
    pub metadata: RatingsMetadata,
    pub recording_ratings: BTreeMap<String, RecordingRating>,
    pub show_ratings: BTreeMap<String, ShowRating>,
    pub top_shows: Vec<TopShow>,
}

/// Rating for one recording given its star values.
///
/// Stars below 1 are treated as noise. The mean is scaled by source weight
/// and damped by up to half when fewer than five reviews back it.
pub fn compute_recording_rating(stars: &[f64], source: SourceType) -> f64 {
    let valid: Vec<f64> = stars.iter().copied().filter(|s| *s >= 1.0).collect();
    if valid.is_empty() {
        return 0.0;
    }

    let average = valid.iter().sum::<f64>() / valid.len() as f64;
    let confidence = (valid.len() as f64 / 5.0).min(1.0);
    average * source.weight() * (0.5 + 0.5 * confidence)
}

fn preference_key(r: &RecordingRating) -> (bool, bool, f64, i64) {
    (
        r.source_type == SourceType::Sbd && r.review_count >= MIN_REVIEWS_FOR_CONFIDENCE,
        r.review_count >= 5,
        r.rating,
        r.review_count,
    )
}

fn compare_preference(a: &RecordingRating, b: &RecordingRating) -> Ordering {
    let (a0, a1, a2, a3) = preference_key(a);
    let (b0, b1, b2, b3) = preference_key(b);
    a0.cmp(&b0)
        .then(a1.cmp(&b1))
        .then(a2.total_cmp(&b2))
        .then(a3.cmp(&b3))
}

/// Reviewed soundboards first, then well-reviewed recordings, then rating.
pub fn best_recording(ratings: &[RecordingRating]) -> Option<&RecordingRating> {
    ratings.iter().max_by(|a, b| compare_preference(a, b))
}

/// Returns (rating, confidence) for a group of recordings of one show.
pub fn aggregate_show_rating(ratings: &[RecordingRating]) -> Option<(f64, f64)> {
    if ratings.is_empty() {
        return None;
    }

    let (weighted_sum, total_weight) = ratings.iter().fold((0.0, 0.0), |(sum, weight), r| {
        let w = r.review_count as f64 * r.source_type.weight();
        (sum + r.rating * w, weight + w)
    });

    let rating = if total_weight > 0.0 { weighted_sum / total_weight } else { 0.0 };
    let total_reviews: i64 = ratings.iter().map(|r| r.review_count).sum();
    let confidence = (total_reviews as f64 / 10.0).min(1.0);
    Some((rating, confidence))
}

pub fn compute_show_rating(date: &str, venue: &str, ratings: &[RecordingRating]) -> Option<ShowRating> {
    let best = best_recording(ratings)?;
    let (rating, confidence) = aggregate_show_rating(ratings)?;
    Some(ShowRating {
        date: date.to_string(),
        venue: venue.to_string(),
        rating,
        confidence,
        best_recording: best.identifier.clone(),
        recording_count: ratings.len(),
    })
}

/// A rated recording together with the show it belongs to.
#[derive(Debug, Clone)]
pub struct RatedRecording {
    pub rating: RecordingRating,
    pub date: String,
    pub venue: String,
}

/// Assemble the ratings file from recordings that passed the inclusion bar.
pub fn build_ratings_file(rated: Vec<RatedRecording>, processed: usize) -> RatingsFile {
    let mut recording_ratings = BTreeMap::new();
    let mut by_show: BTreeMap<String, (String, String, Vec<RecordingRating>)> = BTreeMap::new();

    for item in rated {
        recording_ratings.insert(item.rating.identifier.clone(), item.rating.clone());
        let key = show_id(&item.date, &item.venue);
        by_show
            .entry(key)
            .or_insert_with(|| (item.date.clone(), item.venue.clone(), Vec::new()))
            .2
            .push(item.rating);
    }

    let mut show_ratings = BTreeMap::new();
    let mut top_shows = Vec::new();

    for (key, (date, venue, ratings)) in by_show {
        let show = match compute_show_rating(&date, &venue, &ratings) {
            Some(show) if show.rating >= MIN_RATING_FOR_INCLUSION => show,
            _ => continue,
        };

        if show.confidence >= TOP_SHOW_MIN_CONFIDENCE {
            top_shows.push(TopShow {
                show_key: key.clone(),
                rating: show.rating,
                date: show.date.clone(),
                venue: show.venue.clone(),
            });
        }
        show_ratings.insert(key, show);
    }

    top_shows.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    top_shows.truncate(MAX_TOP_SHOWS);

    let well_reviewed = recording_ratings
        .values()
        .filter(|r| r.review_count >= MIN_REVIEWS_FOR_CONFIDENCE)
        .count();

    RatingsFile {
        metadata: RatingsMetadata {
            generated_at: chrono::Utc::now().to_rfc3339(),
            version: RATINGS_FORMAT_VERSION.to_string(),
            total_recordings: recording_ratings.len(),
            total_shows: show_ratings.len(),
            processing_notes: format!(
                "Processed {} recordings with {} well-reviewed",
                processed, well_reviewed
            ),
        },
        recording_ratings,
        show_ratings,
        top_shows,
    }
}

impl RatingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write via a temp file so readers never see a partial file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

pub struct RatingsGenerator {
    metadata: MetadataService,
    progress: ProgressTracker,
}

impl RatingsGenerator {
    pub fn new(metadata: MetadataService, progress: ProgressTracker) -> Self {
        Self { metadata, progress }
    }

    /// Rate up to `max_recordings` recordings of the collection.
    pub async fn generate(&self, max_recordings: usize) -> Result<RatingsFile> {
        info!("Starting ratings generation for up to {} recordings", max_recordings);
        self.progress.start_phase(SyncPhase::Fetching, 0, "Listing recordings");

        let identifiers = self.metadata.client().collection_identifiers(max_recordings).await?;
        let total = identifiers.len();
        self.progress
            .start_phase(SyncPhase::Ratings, total, format!("Rating {} recordings", total));

        let mut rated = Vec::new();
        let mut processed = 0;

        for identifier in &identifiers {
            self.progress.advance(1);
            match self.rate_one(identifier).await {
                Ok(Some(item)) => {
                    processed += 1;
                    rated.push(item);
                }
                Ok(None) => processed += 1,
                Err(e) => warn!("Skipping {}: {}", identifier, e),
            }
        }

        if let Err(e) = self.metadata.save_cache().await {
            warn!("Failed to save metadata cache: {}", e);
        }

        let file = build_ratings_file(rated, processed);
        info!(
            "Generated ratings for {} shows from {} recordings",
            file.metadata.total_shows, file.metadata.total_recordings
        );
        self.progress.finish(format!("{} shows rated", file.metadata.total_shows));
        Ok(file)
    }

    async fn rate_one(&self, identifier: &str) -> Result<Option<RatedRecording>> {
        let item = match self.metadata.get_item(identifier, false).await? {
            Some(item) => item,
            None => return Ok(None),
        };

        let stars: Vec<f64> = item.reviews.iter().filter_map(|r| r.stars).filter(|s| *s > 0.0).collect();
        if stars.is_empty() {
            debug!("No reviews for {}", identifier);
            return Ok(None);
        }

        let date = match item.recording.date.as_deref().and_then(normalize_date) {
            Some(date) => date,
            None => return Ok(None),
        };

        let source = item.recording.source_type;
        let rating = compute_recording_rating(&stars, source);
        if rating < MIN_RATING_FOR_INCLUSION {
            return Ok(None);
        }

        Ok(Some(RatedRecording {
            rating: RecordingRating::new(identifier, rating, stars.len() as i64, source),
            date,
            venue: item.recording.venue.clone().unwrap_or_default(),
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyStats {
    pub shows_updated: usize,
    pub recordings_updated: usize,
    pub shows_missing: usize,
}

/// Write a ratings file into the catalog in one transaction.
pub fn apply_ratings(db: &mut Database, file: &RatingsFile) -> Result<ApplyStats> {
    db.write_batch(|tx| {
        let mut stats = ApplyStats::default();

        for (identifier, rating) in &file.recording_ratings {
            if tx.update_recording_rating(identifier, rating.rating, rating.review_count)? {
                stats.recordings_updated += 1;
            }
        }

        for (show_key, show) in &file.show_ratings {
            let best = tx
                .recording_exists(&show.best_recording)?
                .then_some(show.best_recording.as_str());
            if tx.update_show_rating(show_key, show.rating, show.confidence, best)? {
                stats.shows_updated += 1;
            } else {
                debug!("No show {} in catalog", show_key);
                stats.shows_missing += 1;
            }
        }

        Ok(stats)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::database::tests::seeded_db;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_recording_rating_formula() {
        // 5 reviews averaging 4.0, SBD: full confidence
        assert!(approx(compute_recording_rating(&[4.0, 4.0, 4.0, 4.0, 4.0], SourceType::Sbd), 4.0));
        // 1 review, AUD: 5 * 0.7 * (0.5 + 0.5 * 0.2)
        assert!(approx(compute_recording_rating(&[5.0], SourceType::Aud), 5.0 * 0.7 * 0.6));
        // Sub-1 stars are dropped before averaging
        assert!(approx(compute_recording_rating(&[0.5, 5.0], SourceType::Sbd), 5.0 * 0.6));
        assert_eq!(compute_recording_rating(&[], SourceType::Sbd), 0.0);
        assert_eq!(compute_recording_rating(&[0.0], SourceType::Sbd), 0.0);
        // Unknown sources weigh half
        assert!(approx(compute_recording_rating(&[4.0; 5], SourceType::Unknown), 2.0));
    }

    #[test]
    fn test_best_recording_prefers_reviewed_sbd() {
        let ratings = vec![
            RecordingRating::new("aud-popular", 4.9, 40, SourceType::Aud),
            RecordingRating::new("sbd-reviewed", 4.1, 3, SourceType::Sbd),
            RecordingRating::new("sbd-lonely", 5.0, 1, SourceType::Sbd),
        ];
        assert_eq!(best_recording(&ratings).unwrap().identifier, "sbd-reviewed");

        let ratings = vec![
            RecordingRating::new("matrix-few", 5.0, 2, SourceType::Matrix),
            RecordingRating::new("aud-many", 3.0, 6, SourceType::Aud),
        ];
        assert_eq!(best_recording(&ratings).unwrap().identifier, "aud-many");
        assert!(best_recording(&[]).is_none());
    }

    #[test]
    fn test_show_rating_weighting() {
        let ratings = vec![
            RecordingRating::new("a", 4.0, 4, SourceType::Sbd),
            RecordingRating::new("b", 2.0, 2, SourceType::Aud),
        ];
        let show = compute_show_rating("1977-05-08", "Barton Hall", &ratings).unwrap();
        let expected = (4.0 * 4.0 + 2.0 * 2.0 * 0.7) / (4.0 + 2.0 * 0.7);
        assert!(approx(show.rating, expected));
        assert!(approx(show.confidence, 0.6));
        assert_eq!(show.best_recording, "a");
        assert_eq!(show.recording_count, 2);
    }

    #[test]
    fn test_build_ratings_file_filters_and_ranks() {
        let rated = vec![
            RatedRecording {
                rating: RecordingRating::new("gd77-05-08.sbd", 4.8, 12, SourceType::Sbd),
                date: "1977-05-08".into(),
                venue: "Barton Hall".into(),
            },
            RatedRecording {
                rating: RecordingRating::new("gd77-05-08.aud", 3.5, 4, SourceType::Aud),
                date: "1977-05-08".into(),
                venue: "Barton Hall".into(),
            },
            RatedRecording {
                rating: RecordingRating::new("gd70-02-13.sbd", 4.5, 2, SourceType::Sbd),
                date: "1970-02-13".into(),
                venue: "Fillmore East".into(),
            },
        ];

        let file = build_ratings_file(rated, 10);
        assert_eq!(file.metadata.total_recordings, 3);
        assert_eq!(file.metadata.total_shows, 2);
        assert!(file.metadata.processing_notes.contains("Processed 10"));

        let cornell = &file.show_ratings["1977-05-08-barton-hall"];
        assert_eq!(cornell.recording_count, 2);
        assert_eq!(cornell.best_recording, "gd77-05-08.sbd");

        // Only the high-confidence show makes the top list
        assert_eq!(file.top_shows.len(), 1);
        assert_eq!(file.top_shows[0].show_key, "1977-05-08-barton-hall");
    }

    #[test]
    fn test_save_load_and_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");

        let rated = vec![RatedRecording {
            rating: RecordingRating::new("gd77-05-08.sbd.hicks.4982.sbeok.shnf", 4.9, 20, SourceType::Sbd),
            date: "1977-05-08".into(),
            venue: "Barton Hall, Cornell University".into(),
        }];
        build_ratings_file(rated, 1).save(&path).unwrap();
        let file = RatingsFile::load(&path).unwrap();

        let mut db = seeded_db();
        let stats = apply_ratings(&mut db, &file).unwrap();
        assert_eq!(stats.recordings_updated, 1);
        assert_eq!(stats.shows_updated, 1);
        assert_eq!(stats.shows_missing, 0);

        let show = db.get_show("1977-05-08-barton-hall-cornell-university").unwrap().unwrap();
        assert!(approx(show.rating.unwrap(), 4.9));
        assert_eq!(show.best_recording_id.as_deref(), Some("gd77-05-08.sbd.hicks.4982.sbeok.shnf"));

        // Archive's own average is kept for the next grouping pass
        let recording = db.get_recording("gd77-05-08.sbd.hicks.4982.sbeok.shnf").unwrap().unwrap();
        assert_eq!(recording.avg_rating, Some(4.8));
        assert!(approx(recording.weighted_rating.unwrap(), 4.9));
    }
}
