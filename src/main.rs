use clap::{Parser, Subcommand};

mod cli;
mod config;
mod core;
mod error;
mod services;
mod signal_handler;
mod utils;

use cli::*;
use config::Config;
use error::Result;
use services::SimpleServices;

#[derive(Parser)]
#[command(name = "deadarchive")]
#[command(about = "Browse, search, download and rate Grateful Dead recordings from Archive.org")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file path (optional)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the local catalog from Archive.org
    Sync(sync::SyncArgs),

    /// Load the catalog from a bundled export
    Import(import::ImportArgs),

    /// Search shows by date, venue, taper or song
    Search(search::SearchArgs),

    /// List shows
    Shows(browse::ShowsArgs),

    /// Show details of one show, or every show on a date
    Show(browse::ShowArgs),

    /// Queue and download shows or recordings
    Download(download::DownloadArgs),

    /// Manage the download queue
    Downloads(download::DownloadsArgs),

    /// Generate or apply review-based ratings
    Ratings(ratings::RatingsArgs),

    /// Manage the metadata cache
    Cache(cache::CacheArgs),

    /// Show configuration
    Config(cli::config::ConfigArgs),

    /// Catalog and download summary
    Status(status::StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::logging::init_logging(cli.verbose, cli.quiet)?;

    let config = Config::load(cli.config.as_deref())?;
    let services = SimpleServices::new(config);

    match cli.command {
        Commands::Sync(args) => sync::execute(args, &services).await,
        Commands::Import(args) => import::execute(args, &services).await,
        Commands::Search(args) => search::execute(args, &services).await,
        Commands::Shows(args) => browse::list(args, &services).await,
        Commands::Show(args) => browse::show(args, &services).await,
        Commands::Download(args) => download::execute(args, &services).await,
        Commands::Downloads(args) => download::manage(args, &services).await,
        Commands::Ratings(args) => ratings::execute(args, &services).await,
        Commands::Cache(args) => cache::execute(args, &services).await,
        Commands::Config(args) => cli::config::execute(args, &services.config()).await,
        Commands::Status(args) => status::execute(args, &services).await,
    }
}
