use clap::{Args, Subcommand};
use tracing::info;

use crate::core::infrastructure::cache::MetadataCache;
use crate::error::Result;
use crate::services::SimpleServices;

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommands,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache statistics
    Stats,

    /// Clear all cached metadata
    Clear,

    /// Remove expired entries
    Cleanup,

    /// Show cache configuration
    Info,
}

pub async fn execute(args: CacheArgs, services: &SimpleServices) -> Result<()> {
    let config = services.config();
    let mut cache = services.factory().create_cache()?;

    match args.command {
        CacheCommands::Stats => {
            let stats = cache.stats();

            println!("📊 Cache Statistics");
            println!("══════════════════");
            println!("🗂️  Total Entries: {}", stats.total_entries);
            println!("📈 Total Requests: {}", stats.total_requests);
            println!("✅ Cache Hits: {}", stats.cache_hits);
            println!("📊 Hit Rate: {:.1}%", stats.hit_rate_percent);

            if stats.last_cleanup > 0 {
                let now = chrono::Utc::now().timestamp().max(0) as u64;
                println!("🧹 Last Cleanup: {} seconds ago", now.saturating_sub(stats.last_cleanup));
            }
            if stats.total_requests > 0 {
                println!("❌ Miss Rate: {:.1}%", 100.0 - stats.hit_rate_percent);
            }
        }

        CacheCommands::Clear => {
            info!("🗑️ Clearing cache...");
            cache.clear().await?;
            cache.save_index().await?;

            println!("✅ Cache cleared successfully!");
            println!("💡 Item metadata will be fetched again on next use");
        }

        CacheCommands::Cleanup => {
            info!("🧹 Cleaning up expired cache entries...");
            let before = cache.stats();
            cache.cleanup_old_entries().await?;
            cache.save_index().await?;
            let after = cache.stats();

            println!("✅ Cache cleanup completed!");
            println!("🗑️ Removed {} expired entries", before.total_entries.saturating_sub(after.total_entries));
            println!("📊 Cache now contains {} entries", after.total_entries);
        }

        CacheCommands::Info => {
            let cache_path = config.cache_dir();

            println!("ℹ️  Cache Configuration");
            println!("═════════════════════");
            println!("📁 Cache Directory: {}", cache_path.display());
            println!("⏰ Max Age: {} hours", config.cache_max_age_hours);
            println!(
                "🔗 Redis: {}",
                if cache.has_redis() { "connected" } else { "not configured" }
            );
            if !cache_path.exists() {
                println!("📝 Status: Not initialized (will be created on first use)");
            }
        }
    }

    Ok(())
}
