//! SQLite cache for the show catalog
//!
//! Holds venues, shows, recordings, tracks, offline downloads and sync
//! metadata. Writers go through [`CatalogTx`] so batch loaders can keep
//! foreign-key order (venues, then shows, then recordings, then tracks)
//! inside a single transaction.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::core::data::models::{
    DownloadEntry, DownloadStatus, Recording, Show, SourceType, SyncMetadata, Track, Venue,
};
use crate::error::{DatabaseError, DeadArchiveError, Result};

const CURRENT_DB_VERSION: u32 = 2;

const SHOW_COLUMNS: &str = "show_id, date, year, venue_id, venue_name, location, recording_count, \
     best_recording_id, rating, rating_confidence, review_count";

const RECORDING_COLUMNS: &str = "identifier, show_id, title, date, venue, location, source_type, \
     taper, lineage, avg_rating, num_reviews, tracks_fetched, weighted_rating";

const DOWNLOAD_COLUMNS: &str = "id, recording_id, filename, url, local_path, status, \
     bytes_downloaded, total_bytes, error, created_at, updated_at";

pub mod sync_keys {
    pub const LAST_SYNC_AT: &str = "last_sync_at";
    pub const SYNC_SOURCE: &str = "sync_source";
    pub const TOTAL_SHOWS: &str = "total_shows";
    pub const TOTAL_RECORDINGS: &str = "total_recordings";
    pub const CATALOG_VERSION: &str = "catalog_version";
}

pub struct Database {
    conn: Connection,
}

/// Filters for browsing shows.
#[derive(Debug, Clone, Default)]
pub struct ShowFilter {
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub min_rating: Option<f64>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CatalogCounts {
    pub venues: i64,
    pub shows: i64,
    pub recordings: i64,
    pub tracks: i64,
    pub downloads: i64,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("Opening database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(DatabaseError::Connection)?;
        Self::from_connection(conn)
    }

    /// Extra connection for concurrent lookups; WAL allows many readers.
    pub fn open_read_only(db_path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(DatabaseError::Connection)?;
        conn.pragma_update(None, "query_only", true)?;
        Ok(Database { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;

        let existing_user_version: u32 =
            conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if existing_user_version < CURRENT_DB_VERSION {
            Self::upgrade_database(&mut conn, existing_user_version)?;
        }

        Ok(Database { conn })
    }

    fn upgrade_database(conn: &mut Connection, existing_version: u32) -> Result<()> {
        debug!("Upgrading database from version {} to {}", existing_version, CURRENT_DB_VERSION);

        if existing_version < 1 {
            let tx = conn.transaction()?;

            tx.pragma_update(None, "user_version", 1)?;

            tx.execute_batch(r#"
                CREATE TABLE venues (
                    venue_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    city TEXT,
                    state TEXT,
                    country TEXT,
                    show_count INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE shows (
                    show_id TEXT PRIMARY KEY,
                    date TEXT NOT NULL,
                    year INTEGER NOT NULL,
                    venue_id TEXT NOT NULL REFERENCES venues(venue_id) ON DELETE CASCADE,
                    venue_name TEXT NOT NULL,
                    location TEXT,
                    recording_count INTEGER NOT NULL DEFAULT 0,
                    best_recording_id TEXT,
                    rating REAL,
                    rating_confidence REAL,
                    review_count INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE recordings (
                    identifier TEXT PRIMARY KEY,
                    show_id TEXT REFERENCES shows(show_id) ON DELETE SET NULL,
                    title TEXT,
                    date TEXT,
                    venue TEXT,
                    location TEXT,
                    source_type TEXT NOT NULL DEFAULT 'UNKNOWN',
                    taper TEXT,
                    lineage TEXT,
                    avg_rating REAL,
                    num_reviews INTEGER NOT NULL DEFAULT 0,
                    tracks_fetched BOOLEAN NOT NULL DEFAULT FALSE
                );

                CREATE TABLE tracks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recording_id TEXT NOT NULL REFERENCES recordings(identifier) ON DELETE CASCADE,
                    filename TEXT NOT NULL,
                    track_number INTEGER,
                    title TEXT,
                    title_lower TEXT,
                    duration_seconds REAL,
                    format TEXT,
                    size_bytes INTEGER,
                    UNIQUE(recording_id, filename)
                );

                CREATE TABLE downloads (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recording_id TEXT NOT NULL REFERENCES recordings(identifier) ON DELETE CASCADE,
                    filename TEXT NOT NULL,
                    url TEXT NOT NULL,
                    local_path TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'queued',
                    bytes_downloaded INTEGER NOT NULL DEFAULT 0,
                    total_bytes INTEGER,
                    error TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    UNIQUE(recording_id, filename)
                );

                CREATE TABLE sync_metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );

                CREATE INDEX idx_shows_date ON shows(date);
                CREATE INDEX idx_shows_year ON shows(year);
                CREATE INDEX idx_shows_venue ON shows(venue_id);
                CREATE INDEX idx_recordings_show ON recordings(show_id);
                CREATE INDEX idx_tracks_title_lower ON tracks(title_lower);
                CREATE INDEX idx_downloads_status ON downloads(status);
            "#)?;

            tx.commit()?;
        }

        if existing_version < 2 {
            let tx = conn.transaction()?;
            tx.pragma_update(None, "user_version", 2)?;
            tx.execute_batch("ALTER TABLE recordings ADD COLUMN weighted_rating REAL;")?;
            tx.commit()?;
        }

        info!("Database upgraded successfully");
        Ok(())
    }

    /// Autocommit writer for one-off statements.
    pub fn catalog(&self) -> CatalogTx<'_> {
        CatalogTx { conn: &self.conn }
    }

    /// Run `f` inside one transaction; rolled back if `f` fails.
    pub fn write_batch<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&CatalogTx<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let out = f(&CatalogTx { conn: &*tx })?;
        tx.commit()?;
        Ok(out)
    }

    // ----- shows & venues -----

    pub fn get_show(&self, show_id: &str) -> Result<Option<Show>> {
        let sql = format!("SELECT {} FROM shows WHERE show_id = ?1", SHOW_COLUMNS);
        let show = self.conn.query_row(&sql, params![show_id], show_from_row).optional()?;
        Ok(show)
    }

    pub fn shows_on_date(&self, date: &str) -> Result<Vec<Show>> {
        let sql = format!("SELECT {} FROM shows WHERE date = ?1 ORDER BY venue_name", SHOW_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let shows = stmt
            .query_map(params![date], show_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(shows)
    }

    pub fn list_shows(&self, filter: &ShowFilter) -> Result<Vec<Show>> {
        let sql = format!(
            "SELECT {} FROM shows
             WHERE (?1 IS NULL OR year = ?1)
               AND (?2 IS NULL OR lower(venue_name) LIKE '%' || lower(?2) || '%')
               AND (?3 IS NULL OR rating >= ?3)
             ORDER BY date, venue_name
             LIMIT ?4",
            SHOW_COLUMNS
        );
        let limit = if filter.limit == 0 { -1 } else { filter.limit as i64 };
        let mut stmt = self.conn.prepare(&sql)?;
        let shows = stmt
            .query_map(
                params![filter.year, filter.venue, filter.min_rating, limit],
                show_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(shows)
    }

    /// Shows for the given ids, in date order; unknown ids are ignored.
    pub fn get_shows(&self, show_ids: &[String]) -> Result<Vec<Show>> {
        let mut shows = Vec::with_capacity(show_ids.len());
        let sql = format!("SELECT {} FROM shows WHERE show_id = ?1", SHOW_COLUMNS);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        for id in show_ids {
            if let Some(show) = stmt.query_row(params![id], show_from_row).optional()? {
                shows.push(show);
            }
        }
        shows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.venue_name.cmp(&b.venue_name)));
        Ok(shows)
    }

    pub fn get_venue(&self, venue_id: &str) -> Result<Option<Venue>> {
        let venue = self
            .conn
            .query_row(
                "SELECT venue_id, name, city, state, country, show_count FROM venues WHERE venue_id = ?1",
                params![venue_id],
                venue_from_row,
            )
            .optional()?;
        Ok(venue)
    }

    // ----- recordings & tracks -----

    pub fn get_recording(&self, identifier: &str) -> Result<Option<Recording>> {
        let sql = format!("SELECT {} FROM recordings WHERE identifier = ?1", RECORDING_COLUMNS);
        let recording = self
            .conn
            .query_row(&sql, params![identifier], recording_from_row)
            .optional()?;
        Ok(recording)
    }

    pub fn recordings_for_show(&self, show_id: &str) -> Result<Vec<Recording>> {
        let sql = format!(
            "SELECT {} FROM recordings WHERE show_id = ?1
             ORDER BY num_reviews DESC, avg_rating DESC, identifier",
            RECORDING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let recordings = stmt
            .query_map(params![show_id], recording_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(recordings)
    }

    pub fn recording_exists(&self, identifier: &str) -> Result<bool> {
        self.catalog().recording_exists(identifier)
    }

    pub fn tracks_for_recording(&self, identifier: &str) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT recording_id, filename, track_number, title, duration_seconds, format, size_bytes
             FROM tracks WHERE recording_id = ?1
             ORDER BY track_number IS NULL, track_number, filename",
        )?;
        let tracks = stmt
            .query_map(params![identifier], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    // ----- search lookups (each returns show ids) -----

    /// `prefix` is a full date, a year or a year-month.
    pub fn show_ids_by_date_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT show_id FROM shows WHERE date LIKE ?1 || '%' ESCAPE '\\' ORDER BY date LIMIT ?2",
            prefix,
            limit,
        )
    }

    pub fn show_ids_by_venue(&self, fragment: &str, limit: usize) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT s.show_id FROM shows s JOIN venues v ON v.venue_id = s.venue_id
             WHERE replace(v.venue_id, '-', ' ') LIKE '%' || ?1 || '%' ESCAPE '\\'
                OR lower(v.name) LIKE '%' || ?1 || '%' ESCAPE '\\'
                OR lower(coalesce(v.city, '')) LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY s.date LIMIT ?2",
            fragment,
            limit,
        )
    }

    pub fn show_ids_by_recording(&self, fragment: &str, limit: usize) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT DISTINCT show_id FROM recordings
             WHERE show_id IS NOT NULL AND (
                   lower(identifier) LIKE '%' || ?1 || '%' ESCAPE '\\'
                OR lower(coalesce(taper, '')) LIKE '%' || ?1 || '%' ESCAPE '\\'
                OR lower(source_type) LIKE ?1 ESCAPE '\\')
             LIMIT ?2",
            fragment,
            limit,
        )
    }

    pub fn show_ids_by_track_title(&self, fragment: &str, limit: usize) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT DISTINCT r.show_id FROM tracks t JOIN recordings r ON r.identifier = t.recording_id
             WHERE r.show_id IS NOT NULL AND t.title_lower LIKE '%' || ?1 || '%' ESCAPE '\\'
             LIMIT ?2",
            fragment,
            limit,
        )
    }

    /// `?1` is bound to the escaped, lower-cased needle; every `LIKE` on it
    /// must carry `ESCAPE '\'`.
    fn collect_ids(&self, sql: &str, needle: &str, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let ids = stmt
            .query_map(params![escape_like(&needle.to_lowercase()), limit as i64], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ----- downloads -----

    /// Queue a file. Failed or cancelled rows are re-queued; others untouched.
    /// Returns true when a row was inserted or re-queued.
    pub fn queue_download(
        &self,
        recording_id: &str,
        filename: &str,
        url: &str,
        local_path: &str,
        total_bytes: Option<u64>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            INSERT INTO downloads (recording_id, filename, url, local_path, status, total_bytes)
            VALUES (?1, ?2, ?3, ?4, 'queued', ?5)
            ON CONFLICT(recording_id, filename) DO UPDATE SET
                status = 'queued',
                error = NULL,
                bytes_downloaded = 0,
                updated_at = CURRENT_TIMESTAMP
            WHERE downloads.status IN ('failed', 'cancelled')
            "#,
            params![recording_id, filename, url, local_path, total_bytes.map(|b| b as i64)],
        )?;
        Ok(changed > 0)
    }

    pub fn get_download(&self, id: i64) -> Result<Option<DownloadEntry>> {
        let sql = format!("SELECT {} FROM downloads WHERE id = ?1", DOWNLOAD_COLUMNS);
        let entry = self.conn.query_row(&sql, params![id], download_from_row).optional()?;
        Ok(entry)
    }

    pub fn list_downloads(&self, status: Option<DownloadStatus>) -> Result<Vec<DownloadEntry>> {
        let sql = format!(
            "SELECT {} FROM downloads WHERE (?1 IS NULL OR status = ?1)
             ORDER BY recording_id, filename",
            DOWNLOAD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![status.map(|s| s.as_str())], download_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn downloads_for_recording(&self, recording_id: &str) -> Result<Vec<DownloadEntry>> {
        let sql = format!(
            "SELECT {} FROM downloads WHERE recording_id = ?1 ORDER BY filename",
            DOWNLOAD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![recording_id], download_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Move a download to `next`, rejecting transitions the lifecycle forbids.
    pub fn set_download_status(&self, id: i64, next: DownloadStatus, error: Option<&str>) -> Result<()> {
        let current = self
            .get_download(id)?
            .ok_or_else(|| DeadArchiveError::NotFound(format!("download {}", id)))?;

        if current.status == next {
            return Ok(());
        }
        if !current.status.can_transition_to(next) {
            return Err(DeadArchiveError::Validation(format!(
                "download {} cannot move from {} to {}",
                id, current.status, next
            )));
        }

        self.conn.execute(
            "UPDATE downloads SET status = ?2, error = ?3, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![id, next.as_str(), error],
        )?;
        Ok(())
    }

    pub fn set_download_progress(&self, id: i64, bytes: u64, total: Option<u64>) -> Result<()> {
        self.conn.execute(
            "UPDATE downloads SET bytes_downloaded = ?2, total_bytes = COALESCE(?3, total_bytes),
             updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![id, bytes as i64, total.map(|t| t as i64)],
        )?;
        Ok(())
    }

    /// Failed and cancelled rows go back to the queue.
    pub fn requeue_failed(&self) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE downloads SET status = 'queued', error = NULL, bytes_downloaded = 0,
             updated_at = CURRENT_TIMESTAMP WHERE status IN ('failed', 'cancelled')",
            [],
        )?;
        Ok(changed)
    }

    /// Rows left `downloading` by an interrupted run.
    pub fn reset_stale_downloads(&self) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE downloads SET status = 'queued', bytes_downloaded = 0,
             updated_at = CURRENT_TIMESTAMP WHERE status = 'downloading'",
            [],
        )?;
        Ok(changed)
    }

    pub fn delete_downloads_for_recording(&self, recording_id: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM downloads WHERE recording_id = ?1",
            params![recording_id],
        )?;
        Ok(removed)
    }

    // ----- metadata & stats -----

    pub fn sync_metadata(&self) -> Result<SyncMetadata> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM sync_metadata")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut meta = SyncMetadata::default();
        for (key, value) in rows {
            match key.as_str() {
                sync_keys::LAST_SYNC_AT => meta.last_sync_at = Some(value),
                sync_keys::SYNC_SOURCE => meta.sync_source = Some(value),
                sync_keys::TOTAL_SHOWS => meta.total_shows = value.parse().unwrap_or(0),
                sync_keys::TOTAL_RECORDINGS => meta.total_recordings = value.parse().unwrap_or(0),
                sync_keys::CATALOG_VERSION => meta.catalog_version = Some(value),
                _ => {}
            }
        }
        Ok(meta)
    }

    pub fn counts(&self) -> Result<CatalogCounts> {
        let count = |table: &str| -> Result<i64> {
            let n = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n)
        };

        Ok(CatalogCounts {
            venues: count("venues")?,
            shows: count("shows")?,
            recordings: count("recordings")?,
            tracks: count("tracks")?,
            downloads: count("downloads")?,
        })
    }
}

/// Write operations, usable on the plain connection or inside a transaction.
pub struct CatalogTx<'a> {
    conn: &'a Connection,
}

impl<'a> CatalogTx<'a> {
    pub fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO venues (venue_id, name, city, state, country, show_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(venue_id) DO UPDATE SET
                name = excluded.name,
                city = COALESCE(excluded.city, venues.city),
                state = COALESCE(excluded.state, venues.state),
                country = COALESCE(excluded.country, venues.country)
            "#,
            params![venue.venue_id, venue.name, venue.city, venue.state, venue.country, venue.show_count],
        )?;
        Ok(())
    }

    pub fn upsert_show(&self, show: &Show) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO shows (show_id, date, year, venue_id, venue_name, location, recording_count,
                               best_recording_id, rating, rating_confidence, review_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(show_id) DO UPDATE SET
                date = excluded.date,
                year = excluded.year,
                venue_id = excluded.venue_id,
                venue_name = excluded.venue_name,
                location = COALESCE(excluded.location, shows.location),
                recording_count = excluded.recording_count,
                best_recording_id = COALESCE(excluded.best_recording_id, shows.best_recording_id),
                rating = COALESCE(excluded.rating, shows.rating),
                rating_confidence = COALESCE(excluded.rating_confidence, shows.rating_confidence),
                review_count = MAX(excluded.review_count, shows.review_count)
            "#,
            params![
                show.show_id,
                show.date,
                show.year,
                show.venue_id,
                show.venue_name,
                show.location,
                show.recording_count,
                show.best_recording_id,
                show.rating,
                show.rating_confidence,
                show.review_count,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_recording(&self, recording: &Recording) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO recordings (identifier, show_id, title, date, venue, location, source_type,
                                    taper, lineage, avg_rating, num_reviews, tracks_fetched)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(identifier) DO UPDATE SET
                show_id = COALESCE(excluded.show_id, recordings.show_id),
                title = COALESCE(excluded.title, recordings.title),
                date = COALESCE(excluded.date, recordings.date),
                venue = COALESCE(excluded.venue, recordings.venue),
                location = COALESCE(excluded.location, recordings.location),
                source_type = excluded.source_type,
                taper = COALESCE(excluded.taper, recordings.taper),
                lineage = COALESCE(excluded.lineage, recordings.lineage),
                avg_rating = COALESCE(excluded.avg_rating, recordings.avg_rating),
                num_reviews = MAX(excluded.num_reviews, recordings.num_reviews),
                tracks_fetched = MAX(excluded.tracks_fetched, recordings.tracks_fetched)
            "#,
            params![
                recording.identifier,
                recording.show_id,
                recording.title,
                recording.date,
                recording.venue,
                recording.location,
                recording.source_type.as_str(),
                recording.taper,
                recording.lineage,
                recording.avg_rating,
                recording.num_reviews,
                recording.tracks_fetched,
            ],
        )?;
        Ok(())
    }

    /// Replace a recording's track list and mark it fetched.
    pub fn replace_tracks(&self, recording_id: &str, tracks: &[Track]) -> Result<usize> {
        self.conn.execute("DELETE FROM tracks WHERE recording_id = ?1", params![recording_id])?;

        let mut stmt = self.conn.prepare_cached(
            r#"
            INSERT OR REPLACE INTO tracks
                (recording_id, filename, track_number, title, title_lower, duration_seconds, format, size_bytes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        for track in tracks {
            stmt.execute(params![
                recording_id,
                track.filename,
                track.track_number,
                track.title,
                track.title.as_ref().map(|t| t.to_lowercase()),
                track.duration_seconds,
                track.format,
                track.size_bytes.map(|s| s as i64),
            ])?;
        }

        self.conn.execute(
            "UPDATE recordings SET tracks_fetched = TRUE WHERE identifier = ?1",
            params![recording_id],
        )?;
        Ok(tracks.len())
    }

    pub fn update_show_rating(
        &self,
        show_id: &str,
        rating: f64,
        confidence: f64,
        best_recording_id: Option<&str>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE shows SET rating = ?2, rating_confidence = ?3,
             best_recording_id = COALESCE(?4, best_recording_id) WHERE show_id = ?1",
            params![show_id, rating, confidence, best_recording_id],
        )?;
        Ok(changed > 0)
    }

    pub fn update_recording_rating(&self, identifier: &str, rating: f64, review_count: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE recordings SET weighted_rating = ?2, num_reviews = MAX(num_reviews, ?3) WHERE identifier = ?1",
            params![identifier, rating, review_count],
        )?;
        Ok(changed > 0)
    }

    /// Recompute denormalized counters after a batch load.
    pub fn refresh_counts(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            UPDATE shows SET recording_count =
                (SELECT COUNT(*) FROM recordings r WHERE r.show_id = shows.show_id);
            UPDATE venues SET show_count =
                (SELECT COUNT(*) FROM shows s WHERE s.venue_id = venues.venue_id);
            "#,
        )?;
        Ok(())
    }

    pub fn set_sync_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sync_metadata (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Record a completed sync or import.
    pub fn record_sync(&self, source: &str, version: Option<&str>) -> Result<()> {
        let shows: i64 = self.conn.query_row("SELECT COUNT(*) FROM shows", [], |r| r.get(0))?;
        let recordings: i64 = self.conn.query_row("SELECT COUNT(*) FROM recordings", [], |r| r.get(0))?;

        self.set_sync_value(sync_keys::LAST_SYNC_AT, &chrono::Utc::now().to_rfc3339())?;
        self.set_sync_value(sync_keys::SYNC_SOURCE, source)?;
        self.set_sync_value(sync_keys::TOTAL_SHOWS, &shows.to_string())?;
        self.set_sync_value(sync_keys::TOTAL_RECORDINGS, &recordings.to_string())?;
        if let Some(version) = version {
            self.set_sync_value(sync_keys::CATALOG_VERSION, version)?;
        }
        Ok(())
    }

    /// Delete recordings not in `keep`, then shows and venues left empty.
    /// Downloads of deleted recordings cascade.
    pub fn prune_catalog(&self, keep: &HashSet<String>) -> Result<usize> {
        let existing: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT identifier FROM recordings")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };

        let mut removed = 0;
        let mut delete = self.conn.prepare_cached("DELETE FROM recordings WHERE identifier = ?1")?;
        for identifier in existing.iter().filter(|id| !keep.contains(*id)) {
            removed += delete.execute(params![identifier])?;
        }

        self.conn.execute_batch(
            r#"
            DELETE FROM shows WHERE show_id NOT IN
                (SELECT show_id FROM recordings WHERE show_id IS NOT NULL);
            DELETE FROM venues WHERE venue_id NOT IN (SELECT venue_id FROM shows);
            "#,
        )?;
        Ok(removed)
    }

    pub fn recording_exists(&self, identifier: &str) -> Result<bool> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM recordings WHERE identifier = ?1", params![identifier], |_| Ok(()))
            .optional()?
            .is_some();
        Ok(exists)
    }
}

/// Make `%`, `_` and `\` match literally in a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn show_from_row(row: &Row<'_>) -> rusqlite::Result<Show> {
    Ok(Show {
        show_id: row.get(0)?,
        date: row.get(1)?,
        year: row.get(2)?,
        venue_id: row.get(3)?,
        venue_name: row.get(4)?,
        location: row.get(5)?,
        recording_count: row.get(6)?,
        best_recording_id: row.get(7)?,
        rating: row.get(8)?,
        rating_confidence: row.get(9)?,
        review_count: row.get(10)?,
    })
}

fn venue_from_row(row: &Row<'_>) -> rusqlite::Result<Venue> {
    Ok(Venue {
        venue_id: row.get(0)?,
        name: row.get(1)?,
        city: row.get(2)?,
        state: row.get(3)?,
        country: row.get(4)?,
        show_count: row.get(5)?,
    })
}

fn recording_from_row(row: &Row<'_>) -> rusqlite::Result<Recording> {
    let source: String = row.get(6)?;
    Ok(Recording {
        identifier: row.get(0)?,
        show_id: row.get(1)?,
        title: row.get(2)?,
        date: row.get(3)?,
        venue: row.get(4)?,
        location: row.get(5)?,
        source_type: source.parse().unwrap_or(SourceType::Unknown),
        taper: row.get(7)?,
        lineage: row.get(8)?,
        avg_rating: row.get(9)?,
        num_reviews: row.get(10)?,
        tracks_fetched: row.get(11)?,
        weighted_rating: row.get(12)?,
    })
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    let size: Option<i64> = row.get(6)?;
    Ok(Track {
        recording_id: row.get(0)?,
        filename: row.get(1)?,
        track_number: row.get(2)?,
        title: row.get(3)?,
        duration_seconds: row.get(4)?,
        format: row.get(5)?,
        size_bytes: size.map(|s| s.max(0) as u64),
    })
}

fn download_from_row(row: &Row<'_>) -> rusqlite::Result<DownloadEntry> {
    let status: String = row.get(5)?;
    let status = status.parse::<DownloadStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let bytes: i64 = row.get(6)?;
    let total: Option<i64> = row.get(7)?;

    Ok(DownloadEntry {
        id: row.get(0)?,
        recording_id: row.get(1)?,
        filename: row.get(2)?,
        url: row.get(3)?,
        local_path: row.get(4)?,
        status,
        bytes_downloaded: bytes.max(0) as u64,
        total_bytes: total.map(|t| t.max(0) as u64),
        error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_venue() -> Venue {
        Venue {
            venue_id: "barton-hall-cornell-university".to_string(),
            name: "Barton Hall, Cornell University".to_string(),
            city: Some("Ithaca".to_string()),
            state: Some("NY".to_string()),
            country: Some("USA".to_string()),
            show_count: 0,
        }
    }

    pub(crate) fn sample_show() -> Show {
        Show {
            show_id: "1977-05-08-barton-hall-cornell-university".to_string(),
            date: "1977-05-08".to_string(),
            year: 1977,
            venue_id: "barton-hall-cornell-university".to_string(),
            venue_name: "Barton Hall, Cornell University".to_string(),
            location: Some("Ithaca, NY".to_string()),
            recording_count: 0,
            best_recording_id: None,
            rating: None,
            rating_confidence: None,
            review_count: 0,
        }
    }

    pub(crate) fn sample_recording(identifier: &str) -> Recording {
        let mut recording = Recording::new(identifier);
        recording.show_id = Some(sample_show().show_id);
        recording.date = Some("1977-05-08".to_string());
        recording.venue = Some("Barton Hall, Cornell University".to_string());
        recording.source_type = SourceType::Sbd;
        recording.num_reviews = 12;
        recording.avg_rating = Some(4.8);
        recording
    }

    pub(crate) fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
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
                duration_seconds: Some(671.0),
                format: Some("VBR MP3".to_string()),
                size_bytes: Some(16_000_000),
            }],
        )
        .unwrap();
        tx.refresh_counts().unwrap();
        db
    }

    #[test]
    fn test_schema_and_counts() {
        let db = seeded_db();
        let counts = db.counts().unwrap();
        assert_eq!(counts.venues, 1);
        assert_eq!(counts.shows, 1);
        assert_eq!(counts.recordings, 1);
        assert_eq!(counts.tracks, 1);

        let show = db.get_show("1977-05-08-barton-hall-cornell-university").unwrap().unwrap();
        assert_eq!(show.recording_count, 1);
        let venue = db.get_venue("barton-hall-cornell-university").unwrap().unwrap();
        assert_eq!(venue.show_count, 1);
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let db = Database::open_in_memory().unwrap();
        let result = db.catalog().upsert_show(&sample_show());
        assert!(result.is_err(), "show without venue must be rejected");
    }

    #[test]
    fn test_upsert_keeps_existing_rating() {
        let db = seeded_db();
        let tx = db.catalog();
        tx.update_show_rating("1977-05-08-barton-hall-cornell-university", 4.9, 1.0, None)
            .unwrap();

        // A later sync without ratings must not wipe them.
        tx.upsert_show(&sample_show()).unwrap();
        let show = db.get_show("1977-05-08-barton-hall-cornell-university").unwrap().unwrap();
        assert_eq!(show.rating, Some(4.9));
    }

    #[test]
    fn test_write_batch_rolls_back_on_error() {
        let mut db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.write_batch(|tx| {
            tx.upsert_venue(&sample_venue())?;
            Err(DeadArchiveError::Validation("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.counts().unwrap().venues, 0);
    }

    #[test]
    fn test_search_lookups() {
        let db = seeded_db();
        let show_id = "1977-05-08-barton-hall-cornell-university".to_string();
        assert_eq!(db.show_ids_by_date_prefix("1977-05", 10).unwrap(), vec![show_id.clone()]);
        assert_eq!(db.show_ids_by_venue("cornell", 10).unwrap(), vec![show_id.clone()]);
        assert_eq!(db.show_ids_by_venue("ithaca", 10).unwrap(), vec![show_id.clone()]);
        assert_eq!(db.show_ids_by_recording("hicks", 10).unwrap(), vec![show_id.clone()]);
        assert_eq!(db.show_ids_by_recording("sbd", 10).unwrap(), vec![show_id.clone()]);
        assert_eq!(db.show_ids_by_track_title("Scarlet", 10).unwrap(), vec![show_id]);
        assert!(db.show_ids_by_track_title("dark star", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let db = seeded_db();
        assert!(db.show_ids_by_venue("%", 10).unwrap().is_empty());
        assert!(db.show_ids_by_venue("b_rton", 10).unwrap().is_empty());
        assert!(db.show_ids_by_track_title("_", 10).unwrap().is_empty());
        assert!(db.show_ids_by_recording("%", 10).unwrap().is_empty());
        assert!(db.show_ids_by_date_prefix("19%", 10).unwrap().is_empty());
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
    }

    #[test]
    fn test_upgrade_from_version_one_adds_weighted_rating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE recordings (
                    identifier TEXT PRIMARY KEY, show_id TEXT, title TEXT, date TEXT, venue TEXT,
                    location TEXT, source_type TEXT NOT NULL DEFAULT 'UNKNOWN', taper TEXT,
                    lineage TEXT, avg_rating REAL, num_reviews INTEGER NOT NULL DEFAULT 0,
                    tracks_fetched BOOLEAN NOT NULL DEFAULT FALSE);
                 INSERT INTO recordings (identifier, avg_rating) VALUES ('gd70-02-13.sbd', 4.5);
                 PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let version: u32 = db.conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, CURRENT_DB_VERSION);

        let recording = db.get_recording("gd70-02-13.sbd").unwrap().unwrap();
        assert_eq!(recording.avg_rating, Some(4.5));
        assert_eq!(recording.weighted_rating, None);
    }

    #[test]
    fn test_recording_exists_outside_transaction() {
        let db = seeded_db();
        assert!(db.recording_exists("gd77-05-08.sbd.hicks.4982.sbeok.shnf").unwrap());
        assert!(!db.recording_exists("gd99-01-01.unknown").unwrap());
    }

    #[test]
    fn test_download_lifecycle() {
        let db = seeded_db();
        let rec = "gd77-05-08.sbd.hicks.4982.sbeok.shnf";
        assert!(db.queue_download(rec, "a.mp3", "https://x/a.mp3", "/tmp/a.mp3", Some(10)).unwrap());
        // Already queued: no change
        assert!(!db.queue_download(rec, "a.mp3", "https://x/a.mp3", "/tmp/a.mp3", Some(10)).unwrap());

        let entry = db.downloads_for_recording(rec).unwrap().remove(0);
        assert_eq!(entry.status, DownloadStatus::Queued);

        assert!(db.set_download_status(entry.id, DownloadStatus::Completed, None).is_err());
        db.set_download_status(entry.id, DownloadStatus::Downloading, None).unwrap();
        db.set_download_progress(entry.id, 10, Some(10)).unwrap();
        db.set_download_status(entry.id, DownloadStatus::Failed, Some("boom")).unwrap();

        let failed = db.list_downloads(Some(DownloadStatus::Failed)).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("boom"));

        assert_eq!(db.requeue_failed().unwrap(), 1);
        let entry = db.get_download(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, DownloadStatus::Queued);
        assert_eq!(entry.bytes_downloaded, 0);

        assert_eq!(db.delete_downloads_for_recording(rec).unwrap(), 1);
    }

    #[test]
    fn test_sync_metadata() {
        let db = seeded_db();
        assert!(!db.sync_metadata().unwrap().is_synced());

        db.catalog().record_sync("import", Some("2.0.0")).unwrap();
        let meta = db.sync_metadata().unwrap();
        assert!(meta.is_synced());
        assert_eq!(meta.sync_source.as_deref(), Some("import"));
        assert_eq!(meta.total_shows, 1);
        assert_eq!(meta.total_recordings, 1);
        assert_eq!(meta.catalog_version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_list_shows_filters() {
        let db = seeded_db();
        let filter = ShowFilter { year: Some(1977), ..Default::default() };
        assert_eq!(db.list_shows(&filter).unwrap().len(), 1);

        let filter = ShowFilter { year: Some(1978), ..Default::default() };
        assert!(db.list_shows(&filter).unwrap().is_empty());

        let filter = ShowFilter { venue: Some("BARTON".into()), limit: 5, ..Default::default() };
        assert_eq!(db.list_shows(&filter).unwrap().len(), 1);
    }
}
