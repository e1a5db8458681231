use clap::{Args, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::core::catalog::ratings::{apply_ratings, RatingsFile};
use crate::core::catalog::ProgressTracker;
use crate::core::services::metadata::lock_db;
use crate::error::Result;
use crate::services::SimpleServices;
use crate::utils::progress::{ProgressMessages, ProgressUtils};

#[derive(Args)]
pub struct RatingsArgs {
    #[command(subcommand)]
    command: RatingsCommands,
}

#[derive(Subcommand)]
enum RatingsCommands {
    /// Fetch reviews from Archive.org and write a ratings file
    Generate {
        /// Maximum recordings to rate
        #[arg(short, long, default_value = "1000")]
        max_recordings: usize,

        /// Output file (defaults to ratings.json next to the database)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the ratings into the catalog
        #[arg(long)]
        apply: bool,
    },

    /// Write a ratings file into the catalog
    Apply {
        /// Ratings file (defaults to ratings.json next to the database)
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },
}

fn default_ratings_path(config: &Config) -> PathBuf {
    config
        .database_path
        .parent()
        .unwrap_or(&config.database_path)
        .join("ratings.json")
}

fn apply(file: &RatingsFile, services: &SimpleServices) -> Result<()> {
    let shared = services.database()?;
    let stats = {
        let mut db = lock_db(&shared)?;
        apply_ratings(&mut db, file)?
    };

    println!("✅ Ratings applied");
    println!("🎸 Shows updated: {}", stats.shows_updated);
    println!("📼 Recordings updated: {}", stats.recordings_updated);
    if stats.shows_missing > 0 {
        println!("⚠️  Shows not in catalog: {}", stats.shows_missing);
    }
    Ok(())
}

pub async fn execute(args: RatingsArgs, services: &SimpleServices) -> Result<()> {
    let config = services.config();

    match args.command {
        RatingsCommands::Generate { max_recordings, output, apply: also_apply } => {
            let output = output.unwrap_or_else(|| default_ratings_path(&config));
            info!("{}", ProgressMessages::FETCHING_METADATA);

            let progress = ProgressTracker::new();
            let view = ProgressUtils::follow(progress.subscribe());
            let generator = services
                .factory()
                .create_ratings_generator(services.database()?, progress.clone())?;
            let result = generator.generate(max_recordings).await;
            drop(generator);
            drop(progress);
            let _ = view.await;

            let file = result?;
            file.save(&output)?;

            println!("⭐ Ratings Summary");
            println!("════════════════");
            println!("📼 Recordings rated: {}", file.metadata.total_recordings);
            println!("🎸 Shows rated: {}", file.metadata.total_shows);
            println!("🏆 Top shows: {}", file.top_shows.len());
            for top in file.top_shows.iter().take(10) {
                println!("   {:.2}  {}  {}", top.rating, top.date, top.venue);
            }
            println!("💾 Written to {}", output.display());

            if also_apply {
                apply(&file, services)?;
            }
        }

        RatingsCommands::Apply { input } => {
            let input = input.unwrap_or_else(|| default_ratings_path(&config));
            let file = RatingsFile::load(&input)?;
            info!("Applying ratings from {}", input.display());
            apply(&file, services)?;
        }
    }

    Ok(())
}
