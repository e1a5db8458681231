use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::catalog::progress::{SyncPhase, SyncProgress};

/// Progress bar construction shared by CLI commands.
pub struct ProgressUtils;

impl ProgressUtils {
    fn style(template: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }

    /// Spinner for work with no known size (network calls, reading bundles)
    pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.into());
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb
    }

    /// Bar for one catalog phase
    pub fn create_phase_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(Self::style(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ));
        pb
    }

    /// Render tracker snapshots until the job reaches a terminal phase or
    /// the tracker is dropped.
    pub fn follow(mut rx: watch::Receiver<SyncProgress>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let pb = Self::create_phase_bar(0);
            let mut phase = SyncPhase::Idle;
            let mut last: Option<SyncProgress> = None;

            loop {
                let snapshot = rx.borrow_and_update().clone();

                if snapshot.phase != phase {
                    if let Some(prev) = last.as_ref().filter(|p| p.processed > 0) {
                        debug!("{}: {} items at {:.1}/s", prev.phase, prev.processed, prev.items_per_second());
                    }
                    phase = snapshot.phase;
                    pb.reset();
                }
                pb.set_length(snapshot.total as u64);
                pb.set_position(snapshot.processed as u64);
                pb.set_message(if snapshot.message.is_empty() {
                    phase.label().to_string()
                } else {
                    snapshot.message.clone()
                });

                last = Some(snapshot.clone());

                if phase.is_terminal() {
                    pb.finish_with_message(ProgressMessages::for_terminal(&snapshot));
                    break;
                }
                if rx.changed().await.is_err() {
                    pb.finish_and_clear();
                    break;
                }
            }
        })
    }
}

/// Common progress bar messages
pub struct ProgressMessages;

impl ProgressMessages {
    pub const SYNCING: &'static str = "Syncing catalog from Archive.org...";
    pub const IMPORTING: &'static str = "Importing catalog bundle...";
    pub const FETCHING_METADATA: &'static str = "Fetching item metadata...";
    pub const COMPLETED: &'static str = "✅ Completed";
    pub const FAILED: &'static str = "❌ Failed";

    pub fn for_terminal(progress: &SyncProgress) -> String {
        match progress.phase {
            SyncPhase::Failed => format!("{} {}", Self::FAILED, progress.message),
            _ => format!("{} {}", Self::COMPLETED, progress.message),
        }
    }
}
