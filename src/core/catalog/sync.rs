//! Remote catalog sync
//!
//! Walks the collection year by year through advanced search, groups each
//! year's recordings into shows and writes them in one transaction per year.

use serde::Serialize;
use std::future::Future;
use tracing::{info, warn};

use crate::core::catalog::grouping::group_into_shows;
use crate::core::catalog::progress::{ProgressTracker, SyncPhase};
use crate::core::data::models::Recording;
use crate::core::data::Database;
use crate::core::services::archive::{year_ranges, ArchiveClient, DateRange, SearchDoc};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    pub years: usize,
    pub failed_years: Vec<String>,
    pub venues: usize,
    pub shows: usize,
    pub recordings: usize,
    pub skipped: usize,
    pub already_synced: bool,
}

pub struct CatalogSync {
    client: ArchiveClient,
    progress: ProgressTracker,
    start_year: i32,
    end_year: i32,
}

impl CatalogSync {
    pub fn new(client: ArchiveClient, progress: ProgressTracker, start_year: i32, end_year: i32) -> Self {
        Self {
            client,
            progress,
            start_year,
            end_year,
        }
    }

    pub async fn run(&self, db: &mut Database, force: bool) -> Result<SyncStats> {
        let client = &self.client;
        sync_ranges(
            db,
            &self.progress,
            year_ranges(self.start_year, self.end_year),
            force,
            |range| async move { client.search_date_range(range).await },
        )
        .await
    }
}

/// Sync driver with the fetch step injected.
pub async fn sync_ranges<F, Fut>(
    db: &mut Database,
    progress: &ProgressTracker,
    ranges: Vec<DateRange>,
    force: bool,
    mut fetch: F,
) -> Result<SyncStats>
where
    F: FnMut(DateRange) -> Fut,
    Fut: Future<Output = Result<Vec<SearchDoc>>>,
{
    if !force && db.sync_metadata()?.is_synced() {
        info!("Catalog already synced; use --force to sync again");
        return Ok(SyncStats {
            already_synced: true,
            ..Default::default()
        });
    }

    let mut stats = SyncStats::default();
    progress.start_phase(SyncPhase::Fetching, ranges.len(), "Searching Archive.org");

    for range in ranges {
        progress.set_message(format!("Fetching {}", range));

        let docs = match fetch(range).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Skipping {}: {}", range, e);
                stats.failed_years.push(range.to_string());
                progress.advance(1);
                continue;
            }
        };

        let recordings: Vec<Recording> = docs.into_iter().map(SearchDoc::into_recording).collect();
        let grouped = group_into_shows(recordings);
        stats.skipped += grouped.skipped;

        let written = db.write_batch(|tx| {
            for venue in &grouped.venues {
                tx.upsert_venue(venue)?;
            }
            for show in &grouped.shows {
                tx.upsert_show(show)?;
            }
            for recording in &grouped.recordings {
                tx.upsert_recording(recording)?;
            }
            Ok((grouped.venues.len(), grouped.shows.len(), grouped.recordings.len()))
        });

        match written {
            Ok((venues, shows, recordings)) => {
                info!("{}: {} shows, {} recordings", range, shows, recordings);
                stats.years += 1;
                stats.venues += venues;
                stats.shows += shows;
                stats.recordings += recordings;
            }
            Err(e) => {
                warn!("Failed to store {}: {}", range, e);
                stats.failed_years.push(range.to_string());
            }
        }
        progress.advance(1);
    }

    if stats.years == 0 && !stats.failed_years.is_empty() {
        warn!("No year could be synced; catalog left unmarked");
        progress.fail("every year failed");
        return Ok(stats);
    }

    progress.start_phase(SyncPhase::Finalizing, 1, "Updating counts");
    db.write_batch(|tx| {
        tx.refresh_counts()?;
        tx.record_sync("remote", None)
    })?;

    progress.finish(format!("{} shows, {} recordings", stats.shows, stats.recordings));
    Ok(stats)
}
