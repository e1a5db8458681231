//! Progress reporting for long catalog jobs.
//!
//! Jobs publish snapshots through a `watch` channel; the CLI subscribes and
//! renders them. Cloning a tracker shares the same channel.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Idle,
    Reading,
    Fetching,
    Venues,
    Shows,
    Recordings,
    Tracks,
    Ratings,
    Finalizing,
    Done,
    Failed,
}

impl SyncPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::Reading => "Reading catalog",
            SyncPhase::Fetching => "Fetching from Archive.org",
            SyncPhase::Venues => "Importing venues",
            SyncPhase::Shows => "Importing shows",
            SyncPhase::Recordings => "Importing recordings",
            SyncPhase::Tracks => "Importing tracks",
            SyncPhase::Ratings => "Computing ratings",
            SyncPhase::Finalizing => "Finalizing",
            SyncPhase::Done => "Done",
            SyncPhase::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Failed)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub processed: usize,
    pub total: usize,
    pub message: String,
    pub phase_started: Instant,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            processed: 0,
            total: 0,
            message: String::new(),
            phase_started: Instant::now(),
        }
    }
}

impl SyncProgress {
    /// 0.0 to 100.0 within the current phase
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }

    pub fn items_per_second(&self) -> f64 {
        let elapsed = self.phase_started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.processed as f64 / elapsed
        } else {
            0.0
        }
    }
}

#[derive(Clone)]
pub struct ProgressTracker {
    sender: Arc<watch::Sender<SyncProgress>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SyncProgress::default());
        Self { sender: Arc::new(sender) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> SyncProgress {
        self.sender.borrow().clone()
    }

    /// Enter a new phase with a known item count.
    pub fn start_phase(&self, phase: SyncPhase, total: usize, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|p| {
            p.phase = phase;
            p.processed = 0;
            p.total = total;
            p.message = message;
            p.phase_started = Instant::now();
        });
    }

    pub fn advance(&self, by: usize) {
        self.sender.send_modify(|p| p.processed += by);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|p| p.message = message);
    }

    pub fn finish(&self, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|p| {
            p.phase = SyncPhase::Done;
            p.processed = p.total;
            p.message = message;
        });
    }

    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|p| {
            p.phase = SyncPhase::Failed;
            p.message = message;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_updates_are_observed() {
        let tracker = ProgressTracker::new();
        let mut rx = tracker.subscribe();

        tracker.start_phase(SyncPhase::Shows, 10, "shows");
        tracker.advance(4);
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.phase, SyncPhase::Shows);
        assert_eq!(snapshot.processed, 4);
        assert!((snapshot.percentage() - 40.0).abs() < f64::EPSILON);

        tracker.finish("done");
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, SyncPhase::Done);
        assert_eq!(snapshot.processed, 10);
        assert!(snapshot.phase.is_terminal());
    }

    #[test]
    fn test_clones_share_state() {
        let tracker = ProgressTracker::new();
        let clone = tracker.clone();
        clone.start_phase(SyncPhase::Reading, 0, "reading");
        clone.fail("boom");
        assert_eq!(tracker.snapshot().phase, SyncPhase::Failed);
        assert_eq!(tracker.snapshot().message, "boom");
        assert_eq!(tracker.snapshot().percentage(), 0.0);
    }
}
