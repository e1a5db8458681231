//! Bundled catalog import
//!
//! Loads a pre-packaged catalog (directory, zip archive or single JSON
//! document, optionally gzip-compressed) into the database. Rows are written
//! in foreign-key order and in fixed-size transactions; a bad item is logged
//! and counted, never fatal to the batch.

use flate2::read::GzDecoder;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::catalog::grouping::group_into_shows;
use crate::core::catalog::normalize::{normalize_date, parse_location, venue_slug, year_of, Location};
use crate::core::catalog::progress::{ProgressTracker, SyncPhase};
use crate::core::data::database::CatalogTx;
use crate::core::data::models::{Recording, Show, SourceType, Track, Venue};
use crate::core::data::Database;
use crate::core::services::flexible::{first_string, flexible_f64, flexible_u32, flexible_u64, joined_string};
use crate::error::{FileSystemError, ImportError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 500;

// ----- bundle documents -----

#[derive(Debug, Clone, Deserialize)]
pub struct ShowDoc {
    #[serde(default, deserialize_with = "first_string")]
    pub show_id: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub venue: Option<String>,
    #[serde(default, alias = "coverage", deserialize_with = "first_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub rating: Option<f64>,
    #[serde(default, alias = "confidence", deserialize_with = "flexible_f64")]
    pub rating_confidence: Option<f64>,
    #[serde(default, alias = "best_recording_id", deserialize_with = "first_string")]
    pub best_recording: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackDoc {
    #[serde(alias = "name")]
    pub filename: String,
    #[serde(default, alias = "track", deserialize_with = "flexible_u32")]
    pub track_number: Option<u32>,
    #[serde(default, deserialize_with = "first_string")]
    pub title: Option<String>,
    #[serde(default, alias = "length", alias = "duration_seconds", deserialize_with = "flexible_f64")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "first_string")]
    pub format: Option<String>,
    #[serde(default, alias = "size_bytes", deserialize_with = "flexible_u64")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingDoc {
    pub identifier: String,
    #[serde(default, deserialize_with = "first_string")]
    pub show_id: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub venue: Option<String>,
    #[serde(default, alias = "coverage", deserialize_with = "first_string")]
    pub location: Option<String>,
    #[serde(default, alias = "source", deserialize_with = "joined_string")]
    pub source_type: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub taper: Option<String>,
    #[serde(default, deserialize_with = "joined_string")]
    pub lineage: Option<String>,
    #[serde(default, alias = "rating", deserialize_with = "flexible_f64")]
    pub avg_rating: Option<f64>,
    #[serde(default, alias = "review_count", deserialize_with = "flexible_u32")]
    pub num_reviews: Option<u32>,
    #[serde(default)]
    pub tracks: Vec<TrackDoc>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default, deserialize_with = "first_string")]
    version: Option<String>,
    #[serde(default)]
    shows: Vec<Value>,
    #[serde(default)]
    recordings: Vec<Value>,
}

// ----- raw bundle reading -----

enum Payload {
    Bytes(Vec<u8>),
    Value(Value),
}

struct RawEntry {
    name: String,
    payload: Payload,
}

impl RawEntry {
    fn decode<T: DeserializeOwned>(self) -> std::result::Result<T, (String, String)> {
        let parsed = match self.payload {
            Payload::Bytes(bytes) => serde_json::from_slice(&bytes),
            Payload::Value(value) => serde_json::from_value(value),
        };
        parsed.map_err(|e| (self.name, e.to_string()))
    }
}

#[derive(Default)]
struct RawBundle {
    version: Option<String>,
    shows: Vec<RawEntry>,
    recordings: Vec<RawEntry>,
}

impl RawBundle {
    fn is_empty(&self) -> bool {
        self.shows.is_empty() && self.recordings.is_empty()
    }

    fn absorb_document(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let doc: CatalogDocument = serde_json::from_slice(bytes).map_err(|e| ImportError::MalformedEntry {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        if self.version.is_none() {
            self.version = doc.version;
        }
        for (i, value) in doc.shows.into_iter().enumerate() {
            self.shows.push(RawEntry {
                name: format!("{}#shows[{}]", name, i),
                payload: Payload::Value(value),
            });
        }
        for (i, value) in doc.recordings.into_iter().enumerate() {
            self.recordings.push(RawEntry {
                name: format!("{}#recordings[{}]", name, i),
                payload: Payload::Value(value),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Directory,
    Zip,
    GzipJson,
    Json,
}

impl BundleKind {
    pub fn detect(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FileSystemError::PathNotFound { path: path.to_path_buf() }.into());
        }
        if path.is_dir() {
            return Ok(BundleKind::Directory);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if name.ends_with(".zip") {
            Ok(BundleKind::Zip)
        } else if name.ends_with(".json.gz") || name.ends_with(".gz") {
            Ok(BundleKind::GzipJson)
        } else if name.ends_with(".json") {
            Ok(BundleKind::Json)
        } else {
            Err(ImportError::UnsupportedSource { path: path.to_path_buf() }.into())
        }
    }
}

fn read_bundle(path: &Path) -> Result<RawBundle> {
    let mut bundle = RawBundle::default();

    match BundleKind::detect(path)? {
        BundleKind::Directory => read_directory(path, &mut bundle)?,
        BundleKind::Zip => read_zip(path, &mut bundle)?,
        BundleKind::GzipJson => {
            let mut bytes = Vec::new();
            GzDecoder::new(File::open(path)?).read_to_end(&mut bytes)?;
            bundle.absorb_document(&path.display().to_string(), &bytes)?;
        }
        BundleKind::Json => {
            let bytes = fs::read(path)?;
            bundle.absorb_document(&path.display().to_string(), &bytes)?;
        }
    }

    Ok(bundle)
}

fn glob_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!("{}/{}", dir.display(), pattern);
    let walker = globwalk::glob(&full).map_err(|e| ImportError::Walk(e.to_string()))?;
    let mut paths = walker
        .map(|entry| entry.map(|e| e.path().to_path_buf()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ImportError::Walk(e.to_string()))?;
    paths.sort();
    Ok(paths)
}

fn read_directory(dir: &Path, bundle: &mut RawBundle) -> Result<()> {
    for (pattern, is_show) in [("shows/*.json", true), ("recordings/*.json", false)] {
        for path in glob_files(dir, pattern)? {
            let entry = RawEntry {
                name: path.display().to_string(),
                payload: Payload::Bytes(fs::read(&path)?),
            };
            if is_show {
                bundle.shows.push(entry);
            } else {
                bundle.recordings.push(entry);
            }
        }
    }

    let single = dir.join("catalog.json");
    if single.is_file() {
        bundle.absorb_document(&single.display().to_string(), &fs::read(&single)?)?;
    }
    Ok(())
}

fn read_zip(path: &Path, bundle: &mut RawBundle) -> Result<()> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;

    for i in 0..archive.len() {
        let (name, content) = {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            if !name.to_ascii_lowercase().ends_with(".json") {
                continue;
            }
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            (name, content)
        };

        let folder = Path::new(&name)
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|f| f.to_str())
            .unwrap_or_default()
            .to_string();

        match folder.as_str() {
            "shows" => bundle.shows.push(RawEntry { name, payload: Payload::Bytes(content) }),
            "recordings" => bundle.recordings.push(RawEntry { name, payload: Payload::Bytes(content) }),
            _ => bundle.absorb_document(&name, &content)?,
        }
    }
    Ok(())
}

/// Parse entries on the rayon pool; failures are logged and counted.
fn decode_all<T: DeserializeOwned + Send>(entries: Vec<RawEntry>) -> (Vec<T>, usize) {
    let results: Vec<std::result::Result<T, (String, String)>> =
        entries.into_par_iter().map(RawEntry::decode).collect();

    let mut items = Vec::with_capacity(results.len());
    let mut failed = 0;
    for result in results {
        match result {
            Ok(item) => items.push(item),
            Err((name, reason)) => {
                warn!("Skipping malformed entry {}: {}", name, reason);
                failed += 1;
            }
        }
    }
    (items, failed)
}

// ----- planning -----

#[derive(Debug, Default)]
struct ImportPlan {
    venues: Vec<Venue>,
    shows: Vec<Show>,
    recordings: Vec<Recording>,
    tracks: Vec<(String, Vec<Track>)>,
}

fn merge_venue(venues: &mut BTreeMap<String, Venue>, venue: Venue) {
    match venues.get_mut(&venue.venue_id) {
        Some(existing) => {
            existing.city = existing.city.take().or(venue.city);
            existing.state = existing.state.take().or(venue.state);
            existing.country = existing.country.take().or(venue.country);
        }
        None => {
            venues.insert(venue.venue_id.clone(), venue);
        }
    }
}

fn show_from_doc(doc: ShowDoc) -> Option<(Venue, Show)> {
    let date = doc.date.as_deref().and_then(normalize_date)?;
    let venue_name = doc.venue.clone().unwrap_or_else(|| "Unknown Venue".to_string());
    let slug = venue_slug(doc.venue.as_deref().unwrap_or_default());

    let location = if doc.city.is_some() || doc.country.is_some() {
        Location { city: doc.city, state: doc.state, country: doc.country }
    } else {
        doc.location.as_deref().map(parse_location).unwrap_or_default()
    };

    let venue = Venue {
        venue_id: slug.clone(),
        name: venue_name.clone(),
        city: location.city,
        state: location.state,
        country: location.country,
        show_count: 0,
    };
    let show = Show {
        show_id: doc.show_id.unwrap_or_else(|| format!("{}-{}", date, slug)),
        year: year_of(&date).unwrap_or_default(),
        date,
        venue_id: slug,
        venue_name,
        location: doc.location,
        recording_count: 0,
        best_recording_id: doc.best_recording,
        rating: doc.rating,
        rating_confidence: doc.rating_confidence,
        review_count: 0,
    };
    Some((venue, show))
}

fn recording_from_doc(doc: RecordingDoc) -> (Recording, Vec<Track>) {
    let raw_source = doc.source_type.clone().unwrap_or_default();
    let source_type = raw_source.parse::<SourceType>().unwrap_or_else(|_| {
        SourceType::detect(&doc.identifier, doc.title.as_deref().unwrap_or_default(), &raw_source)
    });
    let tracks: Vec<Track> = doc
        .tracks
        .into_iter()
        .map(|t| Track {
            recording_id: doc.identifier.clone(),
            filename: t.filename,
            track_number: t.track_number,
            title: t.title,
            duration_seconds: t.duration,
            format: t.format,
            size_bytes: t.size,
        })
        .collect();

    let recording = Recording {
        date: doc.date.as_deref().and_then(normalize_date).or(doc.date),
        identifier: doc.identifier,
        show_id: doc.show_id,
        title: doc.title,
        venue: doc.venue,
        location: doc.location,
        source_type,
        taper: doc.taper,
        lineage: doc.lineage,
        avg_rating: doc.avg_rating,
        weighted_rating: None,
        num_reviews: doc.num_reviews.unwrap_or(0) as i64,
        tracks_fetched: false,
    };
    (recording, tracks)
}

fn build_plan(show_docs: Vec<ShowDoc>, recording_docs: Vec<RecordingDoc>, skipped: &mut usize) -> ImportPlan {
    let mut venues: BTreeMap<String, Venue> = BTreeMap::new();
    let mut shows: BTreeMap<String, Show> = BTreeMap::new();

    for doc in show_docs {
        let raw_date = doc.date.clone().unwrap_or_default();
        match show_from_doc(doc) {
            Some((venue, show)) => {
                merge_venue(&mut venues, venue);
                shows.insert(show.show_id.clone(), show);
            }
            None => {
                warn!("Skipping show with unusable date '{}'", raw_date);
                *skipped += 1;
            }
        }
    }

    let mut recordings: HashMap<String, Recording> = HashMap::new();
    let mut tracks: Vec<(String, Vec<Track>)> = Vec::new();
    let mut orphans: Vec<Recording> = Vec::new();

    for doc in recording_docs {
        let (mut recording, recording_tracks) = recording_from_doc(doc);
        if !recording_tracks.is_empty() {
            tracks.push((recording.identifier.clone(), recording_tracks));
        }

        let derived = recording
            .date
            .as_deref()
            .and_then(normalize_date)
            .map(|d| format!("{}-{}", d, venue_slug(recording.venue.as_deref().unwrap_or_default())));

        let known = recording
            .show_id
            .clone()
            .filter(|id| shows.contains_key(id))
            .or_else(|| derived.filter(|id| shows.contains_key(id)));

        match known {
            Some(show_id) => {
                recording.show_id = Some(show_id);
                recordings.insert(recording.identifier.clone(), recording);
            }
            None => orphans.push(recording),
        }
    }

    // Recordings without a bundled show get shows built from their own metadata
    if !orphans.is_empty() {
        debug!("Grouping {} recordings without a bundled show", orphans.len());
        let grouped = group_into_shows(orphans);
        *skipped += grouped.skipped;
        for venue in grouped.venues {
            merge_venue(&mut venues, venue);
        }
        for show in grouped.shows {
            shows.entry(show.show_id.clone()).or_insert(show);
        }
        for recording in grouped.recordings {
            recordings.insert(recording.identifier.clone(), recording);
        }
    }

    tracks.retain(|(identifier, _)| recordings.contains_key(identifier));

    let mut recordings: Vec<Recording> = recordings.into_values().collect();
    recordings.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    ImportPlan {
        venues: venues.into_values().collect(),
        shows: shows.into_values().collect(),
        recordings,
        tracks,
    }
}

// ----- import -----

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportStats {
    pub venues: usize,
    pub shows: usize,
    pub recordings: usize,
    pub tracks: usize,
    pub skipped: usize,
    pub pruned: usize,
    pub already_imported: bool,
}

pub struct CatalogImporter {
    progress: ProgressTracker,
    batch_size: usize,
}

impl CatalogImporter {
    pub fn new(progress: ProgressTracker) -> Self {
        Self {
            progress,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn import(&self, db: &mut Database, source: &Path, force: bool) -> Result<ImportStats> {
        if !force && db.sync_metadata()?.is_synced() {
            info!("Catalog already present; use --force to import again");
            return Ok(ImportStats {
                already_imported: true,
                ..Default::default()
            });
        }

        let result = self.run(db, source, force);
        if let Err(e) = &result {
            self.progress.fail(e.to_string());
        }
        result
    }

    fn run(&self, db: &mut Database, source: &Path, force: bool) -> Result<ImportStats> {
        info!("Importing catalog from {}", source.display());
        self.progress
            .start_phase(SyncPhase::Reading, 0, format!("Reading {}", source.display()));

        let bundle = read_bundle(source)?;
        if bundle.is_empty() {
            return Err(ImportError::EmptyBundle { path: source.to_path_buf() }.into());
        }
        let version = bundle.version.clone();

        let mut stats = ImportStats::default();
        let (show_docs, bad_shows) = decode_all::<ShowDoc>(bundle.shows);
        let (recording_docs, bad_recordings) = decode_all::<RecordingDoc>(bundle.recordings);
        stats.skipped += bad_shows + bad_recordings;

        let plan = build_plan(show_docs, recording_docs, &mut stats.skipped);

        let (written, skipped) = self.write_phase(db, SyncPhase::Venues, &plan.venues, |tx, v| tx.upsert_venue(v), |v| v.venue_id.clone())?;
        stats.venues = written;
        stats.skipped += skipped;

        let (written, skipped) = self.write_phase(db, SyncPhase::Shows, &plan.shows, |tx, s| tx.upsert_show(s), |s| s.show_id.clone())?;
        stats.shows = written;
        stats.skipped += skipped;

        let (written, skipped) = self.write_phase(
            db,
            SyncPhase::Recordings,
            &plan.recordings,
            |tx, r| tx.upsert_recording(r),
            |r| r.identifier.clone(),
        )?;
        stats.recordings = written;
        stats.skipped += skipped;

        let (_, skipped) = self.write_phase(
            db,
            SyncPhase::Tracks,
            &plan.tracks,
            |tx, (identifier, tracks)| tx.replace_tracks(identifier, tracks).map(|_| ()),
            |(identifier, _)| identifier.clone(),
        )?;
        stats.tracks = plan.tracks.iter().map(|(_, t)| t.len()).sum();
        stats.skipped += skipped;

        self.progress.start_phase(SyncPhase::Finalizing, 1, "Updating counts");
        let keep: HashSet<String> = plan.recordings.iter().map(|r| r.identifier.clone()).collect();
        stats.pruned = db.write_batch(|tx| {
            let pruned = if force { tx.prune_catalog(&keep)? } else { 0 };
            tx.refresh_counts()?;
            tx.record_sync("import", version.as_deref())?;
            Ok(pruned)
        })?;

        info!(
            "Imported {} venues, {} shows, {} recordings, {} tracks ({} skipped)",
            stats.venues, stats.shows, stats.recordings, stats.tracks, stats.skipped
        );
        self.progress.finish(format!(
            "{} shows, {} recordings",
            stats.shows, stats.recordings
        ));
        Ok(stats)
    }

    fn write_phase<T, W, N>(&self, db: &mut Database, phase: SyncPhase, items: &[T], write: W, name: N) -> Result<(usize, usize)>
    where
        W: Fn(&CatalogTx<'_>, &T) -> Result<()>,
        N: Fn(&T) -> String,
    {
        self.progress
            .start_phase(phase, items.len(), format!("{} ({})", phase, items.len()));

        let mut written = 0;
        let mut skipped = 0;

        for chunk in items.chunks(self.batch_size) {
            let (w, s) = db.write_batch(|tx| {
                let mut w = 0;
                let mut s = 0;
                for item in chunk {
                    match write(tx, item) {
                        Ok(()) => w += 1,
                        Err(e) => {
                            warn!("{}: skipping {}: {}", phase, name(item), e);
                            s += 1;
                        }
                    }
                }
                Ok((w, s))
            })?;
            written += w;
            skipped += s;
            self.progress.advance(chunk.len());
        }

        Ok((written, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeadArchiveError;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    fn bundle_json() -> Value {
        json!({
            "version": "2024.1",
            "shows": [
                {"date": "1977-05-08", "venue": "Barton Hall, Cornell University", "location": "Ithaca, NY"},
                {"date": "not a date", "venue": "Nowhere"}
            ],
            "recordings": [
                {
                    "identifier": "gd77-05-08.sbd.hicks.4982.sbeok.shnf",
                    "date": "1977-05-08",
                    "venue": "Barton Hall, Cornell Univ.",
                    "source": "SBD",
                    "avg_rating": "4.8",
                    "num_reviews": 150,
                    "tracks": [
                        {"name": "gd77-05-08d1t01.mp3", "track": "1", "title": "New Minglewood Blues", "length": "5:32", "format": "VBR MP3"},
                        {"name": "gd77-05-08d2t02.mp3", "track": "2", "title": "Scarlet Begonias", "format": "VBR MP3"}
                    ]
                },
                {
                    "identifier": "gd77-05-09.aud.orphan",
                    "date": "5/9/77",
                    "venue": "Buffalo Memorial Auditorium",
                    "coverage": "Buffalo, NY"
                },
                {"title": "missing identifier"}
            ]
        })
    }

    fn import(source: &Path, db: &mut Database, force: bool) -> ImportStats {
        CatalogImporter::new(ProgressTracker::new())
            .with_batch_size(2)
            .import(db, source, force)
            .unwrap()
    }

    fn assert_full_import(stats: &ImportStats, db: &Database) {
        assert_eq!(stats.shows, 2);
        assert_eq!(stats.recordings, 2);
        assert_eq!(stats.tracks, 2);
        // One bad show date, one recording without an identifier
        assert_eq!(stats.skipped, 2);

        let show = db.get_show("1977-05-08-barton-hall-cornell-university").unwrap().unwrap();
        assert_eq!(show.recording_count, 1);
        assert_eq!(show.year, 1977);

        let orphan_show = db.get_show("1977-05-09-buffalo-memorial-auditorium").unwrap().unwrap();
        assert_eq!(orphan_show.recording_count, 1);

        let recording = db.get_recording("gd77-05-08.sbd.hicks.4982.sbeok.shnf").unwrap().unwrap();
        assert_eq!(recording.source_type, SourceType::Sbd);
        assert!(recording.tracks_fetched);
        assert_eq!(db.tracks_for_recording(&recording.identifier).unwrap().len(), 2);

        let meta = db.sync_metadata().unwrap();
        assert_eq!(meta.sync_source.as_deref(), Some("import"));
        assert_eq!(meta.catalog_version.as_deref(), Some("2024.1"));
    }

    #[test]
    fn test_import_single_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, serde_json::to_vec(&bundle_json()).unwrap()).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let stats = import(&path, &mut db, false);
        assert_full_import(&stats, &db);
    }

    #[test]
    fn test_import_gzip_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(&serde_json::to_vec(&bundle_json()).unwrap()).unwrap();
        encoder.finish().unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let stats = import(&path, &mut db, false);
        assert_full_import(&stats, &db);
    }

    #[test]
    fn test_import_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = bundle_json();
        fs::create_dir_all(dir.path().join("shows")).unwrap();
        fs::create_dir_all(dir.path().join("recordings")).unwrap();
        for (i, show) in bundle["shows"].as_array().unwrap().iter().enumerate() {
            fs::write(dir.path().join(format!("shows/{}.json", i)), show.to_string()).unwrap();
        }
        for (i, rec) in bundle["recordings"].as_array().unwrap().iter().enumerate() {
            fs::write(dir.path().join(format!("recordings/{}.json", i)), rec.to_string()).unwrap();
        }
        fs::write(dir.path().join("recordings/broken.json"), "{ not json").unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let stats = import(dir.path(), &mut db, false);
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.shows, 2);
        assert_eq!(stats.recordings, 2);
    }

    #[test]
    fn test_import_zip_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.zip");
        let bundle = bundle_json();

        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (i, show) in bundle["shows"].as_array().unwrap().iter().enumerate() {
            writer.start_file(format!("catalog/shows/{}.json", i), options).unwrap();
            writer.write_all(show.to_string().as_bytes()).unwrap();
        }
        for (i, rec) in bundle["recordings"].as_array().unwrap().iter().enumerate() {
            writer.start_file(format!("catalog/recordings/{}.json", i), options).unwrap();
            writer.write_all(rec.to_string().as_bytes()).unwrap();
        }
        writer.finish().unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let stats = import(&path, &mut db, false);
        assert_eq!(stats.shows, 2);
        assert_eq!(stats.recordings, 2);
        assert_eq!(stats.tracks, 2);
    }

    #[test]
    fn test_import_is_skipped_then_forced_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, serde_json::to_vec(&bundle_json()).unwrap()).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        import(&path, &mut db, false);

        let again = import(&path, &mut db, false);
        assert!(again.already_imported);

        let forced = import(&path, &mut db, true);
        assert!(!forced.already_imported);
        assert_eq!(forced.pruned, 0);
        let counts = db.counts().unwrap();
        assert_eq!(counts.shows, 2);
        assert_eq!(counts.recordings, 2);
        assert_eq!(counts.tracks, 2);
    }

    #[test]
    fn test_forced_import_prunes_missing_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, serde_json::to_vec(&bundle_json()).unwrap()).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        import(&path, &mut db, false);

        let mut smaller = bundle_json();
        smaller["recordings"].as_array_mut().unwrap().remove(1);
        fs::write(&path, serde_json::to_vec(&smaller).unwrap()).unwrap();

        let stats = import(&path, &mut db, true);
        assert_eq!(stats.pruned, 1);
        assert!(db.get_show("1977-05-09-buffalo-memorial-auditorium").unwrap().is_none());
        assert_eq!(db.counts().unwrap().venues, 1);
    }

    #[test]
    fn test_unsupported_and_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        fs::write(&path, "a,b").unwrap();
        assert!(matches!(
            BundleKind::detect(&path),
            Err(DeadArchiveError::Import(ImportError::UnsupportedSource { .. }))
        ));
        assert!(matches!(
            BundleKind::detect(&dir.path().join("nope.zip")),
            Err(DeadArchiveError::FileSystem(FileSystemError::PathNotFound { .. }))
        ));

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "{}").unwrap();
        let mut db = Database::open_in_memory().unwrap();
        let result = CatalogImporter::new(ProgressTracker::new()).import(&mut db, &empty, false);
        assert!(matches!(
            result,
            Err(DeadArchiveError::Import(ImportError::EmptyBundle { .. }))
        ));
    }
}
