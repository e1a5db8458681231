use clap::Args;

use crate::core::data::models::DownloadStatus;
use crate::core::services::metadata::lock_db;
use crate::error::Result;
use crate::services::SimpleServices;

#[derive(Args)]
pub struct StatusArgs {
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: StatusArgs, services: &SimpleServices) -> Result<()> {
    let config = services.config();
    let shared = services.database()?;
    let db = lock_db(&shared)?;

    let counts = db.counts()?;
    let meta = db.sync_metadata()?;
    let downloads = db.list_downloads(None)?;
    let by_status = |status: DownloadStatus| downloads.iter().filter(|d| d.status == status).count();

    if args.json {
        let value = serde_json::json!({
            "database": config.database_path,
            "counts": counts,
            "sync": meta,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("📊 Catalog Status");
    println!("════════════════");
    println!("📁 Database: {}", config.database_path.display());
    match &meta.last_sync_at {
        Some(at) => println!(
            "🔄 Last sync: {} (from {})",
            at,
            meta.sync_source.as_deref().unwrap_or("unknown")
        ),
        None => {
            println!("🔄 Last sync: never");
            println!("💡 Run 'deadarchive sync' or 'deadarchive import <bundle>' to build the catalog");
        }
    }
    if let Some(version) = &meta.catalog_version {
        println!("🏷️  Catalog version: {}", version);
    }
    println!("🏟️  Venues: {}", counts.venues);
    println!("🎸 Shows: {}", counts.shows);
    println!("📼 Recordings: {}", counts.recordings);
    println!("🎵 Tracks: {}", counts.tracks);

    println!("\n📥 Downloads: {}", downloads.len());
    for status in [
        DownloadStatus::Queued,
        DownloadStatus::Downloading,
        DownloadStatus::Completed,
        DownloadStatus::Failed,
        DownloadStatus::Cancelled,
    ] {
        let n = by_status(status);
        if n > 0 {
            println!("  {:<12} {}", status.to_string(), n);
        }
    }
    Ok(())
}
