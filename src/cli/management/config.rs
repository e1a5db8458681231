use clap::{Args, Subcommand};

use crate::config::env::EnvParser;
use crate::config::Config as AppConfig;
use crate::error::Result;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Check the configuration file and environment overrides
    Validate,
}

pub async fn execute(args: ConfigArgs, config: &AppConfig) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            println!("🔧 Current configuration:");
            println!("  📁 database_path: {}", config.database_path.display());
            println!("  🌐 archive_base_url: {}", config.archive_base_url);
            println!("  🗂️  collection: {}", config.collection);
            println!("  💾 download_dir: {}", config.download_dir.display());
            println!("  📅 years: {}..={}", config.start_year, config.end_year);
            println!("  🔎 search_row_limit: {}", config.search_row_limit);
            println!("  🔁 max_retries: {} (every {} ms)", config.max_retries, config.retry_delay_ms);
            println!("  ⏱️  request_interval_ms: {}", config.request_interval_ms);
            println!("  ⬇️  parallel_downloads: {}", config.parallel_downloads);
            println!("  🎵 preferred_formats: {}", config.preferred_formats.join(", "));
            println!("  🔗 redis_url: {:?}", config.redis_url);
            println!("  ⏰ cache_max_age_hours: {}", config.cache_max_age_hours);

            let env_vars = EnvParser::get_all_vars();
            if !env_vars.is_empty() {
                println!("\n🌍 Environment overrides:");
                for (key, value) in env_vars {
                    println!("  {} = {}", key, value);
                }
            }
        }

        ConfigCommands::Path => {
            let config_path = AppConfig::config_path()?;
            println!("📁 Configuration file: {}", config_path.display());
            if config_path.exists() {
                println!("✅ File exists");
            } else {
                println!("📝 File will be created on first run");
            }
        }

        ConfigCommands::Validate => {
            // Loading already validated; re-run so the result is explicit
            config.validate()?;
            println!("✅ Configuration is valid");
            if !config.download_dir.exists() {
                println!("📝 Download directory will be created on first download");
            }
        }
    }

    Ok(())
}
