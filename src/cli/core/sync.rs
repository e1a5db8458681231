use clap::Args;
use tracing::info;

use crate::config::validation::ConfigValidator;
use crate::core::catalog::ProgressTracker;
use crate::error::Result;
use crate::services::SimpleServices;
use crate::utils::progress::{ProgressMessages, ProgressUtils};

#[derive(Args)]
pub struct SyncArgs {
    /// Sync again even if the catalog is already populated
    #[arg(long)]
    force: bool,

    /// First year to fetch (defaults to config)
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year to fetch (defaults to config)
    #[arg(long)]
    end_year: Option<i32>,
}

pub async fn execute(args: SyncArgs, services: &SimpleServices) -> Result<()> {
    let config = services.config();
    let start_year = args.start_year.unwrap_or(config.start_year);
    let end_year = args.end_year.unwrap_or(config.end_year);
    ConfigValidator::validate_year_span(start_year, end_year)?;

    info!("{}", ProgressMessages::SYNCING);
    let progress = ProgressTracker::new();
    let view = ProgressUtils::follow(progress.subscribe());

    let sync = services.factory().create_catalog_sync(progress.clone(), start_year, end_year)?;
    let mut db = services.factory().create_database()?;
    let result = sync.run(&mut db, args.force).await;

    drop(sync);
    drop(progress);
    let _ = view.await;
    let stats = result?;

    if stats.already_synced {
        println!("✅ Catalog already synced. Use --force to sync again.");
        return Ok(());
    }

    println!("📊 Sync Summary");
    println!("══════════════");
    println!("📅 Years synced: {}", stats.years);
    println!("🏟️  Venues: {}", stats.venues);
    println!("🎸 Shows: {}", stats.shows);
    println!("📼 Recordings: {}", stats.recordings);
    if stats.skipped > 0 {
        println!("⚠️  Skipped (no usable date): {}", stats.skipped);
    }
    if !stats.failed_years.is_empty() {
        println!("❌ Failed years: {}", stats.failed_years.join(", "));
        println!("💡 Run 'deadarchive sync --force' later to fill them in");
    }
    Ok(())
}
