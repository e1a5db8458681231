use clap::{Args, Subcommand};
use tracing::{info, warn};

use crate::core::catalog::normalize::normalize_date;
use crate::core::catalog::ProgressTracker;
use crate::core::data::models::DownloadStatus;
use crate::core::downloads::{DownloadManager, RunStats};
use crate::core::services::metadata::lock_db;
use crate::error::{DeadArchiveError, Result};
use crate::services::SimpleServices;
use crate::signal_handler::ShutdownSignal;
use crate::utils::progress::{ProgressMessages, ProgressUtils};

#[derive(Args)]
pub struct DownloadArgs {
    /// Show ids, dates or recording identifiers
    #[arg(value_name = "TARGET", required = true, num_args = 1..)]
    targets: Vec<String>,

    /// Concurrent transfers (defaults to config)
    #[arg(short, long)]
    parallel: Option<usize>,

    /// Only add files to the queue
    #[arg(long)]
    queue_only: bool,
}

#[derive(Args)]
pub struct DownloadsArgs {
    #[command(subcommand)]
    command: DownloadsCommands,
}

#[derive(Subcommand)]
enum DownloadsCommands {
    /// List queued, running and finished downloads
    List {
        /// queued, downloading, completed, failed or cancelled
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Re-queue failed and cancelled files and download them
    Retry {
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Only re-queue
        #[arg(long)]
        queue_only: bool,
    },

    /// Cancel the unfinished files of a recording
    Cancel {
        #[arg(value_name = "IDENTIFIER")]
        identifier: String,
    },

    /// Delete a recording's downloaded files and queue entries
    Remove {
        #[arg(value_name = "IDENTIFIER")]
        identifier: String,
    },
}

fn manager(services: &SimpleServices) -> Result<DownloadManager> {
    services.factory().create_download_manager(services.database()?)
}

async fn enqueue_target(manager: &DownloadManager, services: &SimpleServices, target: &str) -> Result<usize> {
    let (is_show, is_recording, same_day) = {
        let shared = services.database()?;
        let db = lock_db(&shared)?;
        let is_show = db.get_show(target)?.is_some();
        let is_recording = db.recording_exists(target)?;
        let same_day = match normalize_date(target) {
            Some(date) if !is_show && !is_recording => db.shows_on_date(&date)?,
            _ => Vec::new(),
        };
        (is_show, is_recording, same_day)
    };

    if is_show {
        let (identifier, queued) = manager.enqueue_show(target).await?;
        println!("📼 {} → {} ({} files queued)", target, identifier, queued);
        return Ok(queued);
    }

    if !same_day.is_empty() {
        let mut total = 0;
        for show in same_day {
            let (identifier, queued) = manager.enqueue_show(&show.show_id).await?;
            println!("📼 {} → {} ({} files queued)", show.show_id, identifier, queued);
            total += queued;
        }
        return Ok(total);
    }

    if !is_recording {
        info!("{} is not in the catalog; asking Archive.org", target);
    }
    let queued = manager.enqueue_recording(target).await?;
    println!("📼 {} ({} files queued)", target, queued);
    Ok(queued)
}

async fn run_queue(manager: DownloadManager, parallel: usize) -> Result<RunStats> {
    let shutdown = ShutdownSignal::new();
    let listeners = shutdown.listen();
    println!("💡 {}", shutdown.status_text());

    let progress = ProgressTracker::new();
    let view = ProgressUtils::follow(progress.subscribe());
    let manager = manager.with_progress(progress.clone());
    drop(progress);

    let result = manager.run(parallel, &shutdown).await;
    drop(manager);
    let _ = view.await;
    for handle in listeners {
        handle.abort();
    }

    let stats = result?;
    println!("📊 Download Summary");
    println!("══════════════════");
    println!("✅ Completed: {}", stats.completed);
    println!("❌ Failed: {}", stats.failed);
    if stats.cancelled > 0 {
        println!("🛑 Cancelled: {}", stats.cancelled);
    }
    println!("💾 Downloaded: {:.1} MB", stats.bytes as f64 / 1_048_576.0);
    if stats.failed > 0 {
        println!("💡 Use 'deadarchive downloads retry' to try failed files again");
    }
    Ok(stats)
}

pub async fn execute(args: DownloadArgs, services: &SimpleServices) -> Result<()> {
    let manager = manager(services)?;
    let mut queued = 0;

    let spinner = ProgressUtils::create_spinner(ProgressMessages::FETCHING_METADATA);
    for target in &args.targets {
        spinner.set_message(format!("Queueing {}", target));
        match enqueue_target(&manager, services, target).await {
            Ok(n) => queued += n,
            Err(e) => warn!("Could not queue {}: {}", target, e),
        }
    }
    spinner.finish_and_clear();

    println!("📥 {} new files queued", queued);
    if args.queue_only {
        return Ok(());
    }

    let parallel = args.parallel.unwrap_or(services.config().parallel_downloads);
    run_queue(manager, parallel).await?;
    Ok(())
}

pub async fn manage(args: DownloadsArgs, services: &SimpleServices) -> Result<()> {
    let manager = manager(services)?;

    match args.command {
        DownloadsCommands::List { status } => {
            let status = status
                .map(|s| s.parse::<DownloadStatus>())
                .transpose()
                .map_err(|e| DeadArchiveError::Validation(e.to_string()))?;
            let entries = manager.list(status)?;

            if entries.is_empty() {
                println!("📭 No downloads");
                return Ok(());
            }
            println!("📥 {} downloads", entries.len());
            println!("══════════════");
            for entry in &entries {
                let progress = match entry.total_bytes {
                    Some(total) if total > 0 => {
                        format!("{:>5.1}%", entry.bytes_downloaded as f64 / total as f64 * 100.0)
                    }
                    _ => format!("{:>6}", entry.bytes_downloaded),
                };
                println!("{:<12} {} {}/{}", entry.status.to_string(), progress, entry.recording_id, entry.filename);
                if let Some(error) = &entry.error {
                    println!("             ⚠️  {}", error);
                }
            }
        }

        DownloadsCommands::Retry { parallel, queue_only } => {
            let requeued = manager.retry_failed()?;
            println!("🔁 {} files re-queued", requeued);
            if !queue_only && requeued > 0 {
                let parallel = parallel.unwrap_or(services.config().parallel_downloads);
                run_queue(manager, parallel).await?;
            }
        }

        DownloadsCommands::Cancel { identifier } => {
            let cancelled = manager.cancel(&identifier)?;
            println!("🛑 Cancelled {} files from {}", cancelled, identifier);
        }

        DownloadsCommands::Remove { identifier } => {
            let removed = manager.remove(&identifier).await?;
            println!("🗑️  Removed {} files for {}", removed, identifier);
        }
    }

    Ok(())
}
