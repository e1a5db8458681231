use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::core::catalog::ProgressTracker;
use crate::error::{DeadArchiveError, Result};
use crate::services::SimpleServices;
use crate::utils::progress::{ProgressMessages, ProgressUtils};

#[derive(Args)]
pub struct ImportArgs {
    /// Catalog bundle: a directory, .zip, .json or .json.gz
    #[arg(value_name = "BUNDLE")]
    source: PathBuf,

    /// Import even if the catalog is already populated; recordings missing
    /// from the bundle are removed
    #[arg(long)]
    force: bool,

    /// Rows written per transaction
    #[arg(long, default_value = "500")]
    batch_size: usize,
}

pub async fn execute(args: ImportArgs, services: &SimpleServices) -> Result<()> {
    info!("{}", ProgressMessages::IMPORTING);
    let progress = ProgressTracker::new();
    let view = ProgressUtils::follow(progress.subscribe());

    let importer = services
        .factory()
        .create_importer(progress.clone())
        .with_batch_size(args.batch_size);
    let mut db = services.factory().create_database()?;
    let source = args.source.clone();
    let force = args.force;

    // Parsing and SQLite writes are blocking work
    let result = tokio::task::spawn_blocking(move || importer.import(&mut db, &source, force))
        .await
        .map_err(DeadArchiveError::from)
        .and_then(|r| r);

    drop(progress);
    let _ = view.await;
    let stats = result?;

    if stats.already_imported {
        println!("✅ Catalog already present. Use --force to import again.");
        return Ok(());
    }

    println!("📦 Import Summary");
    println!("════════════════");
    println!("🏟️  Venues: {}", stats.venues);
    println!("🎸 Shows: {}", stats.shows);
    println!("📼 Recordings: {}", stats.recordings);
    println!("🎵 Tracks: {}", stats.tracks);
    if stats.skipped > 0 {
        println!("⚠️  Skipped items: {}", stats.skipped);
    }
    if stats.pruned > 0 {
        println!("🗑️  Removed recordings not in bundle: {}", stats.pruned);
    }
    Ok(())
}
