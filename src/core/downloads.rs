//! Download queue
//!
//! Rows in the `downloads` table are the queue. `run` drains queued rows
//! with bounded concurrency, streaming each file to `<name>.part` and
//! renaming it once complete.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::catalog::progress::{ProgressTracker, SyncPhase};
use crate::core::data::models::{DownloadEntry, DownloadStatus, Track};
use crate::core::services::metadata::{lock_db, MetadataService, SharedDatabase};
use crate::error::{DeadArchiveError, FileSystemError, Result};
use crate::signal_handler::ShutdownSignal;

/// Persist progress (and notice cancellation) every this many bytes.
const PROGRESS_STEP: u64 = 1024 * 1024;

/// Reduce an API-supplied name to a single safe path component.
///
/// Leading directories are stripped; `..`, empty names and control
/// characters are rejected.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let unsafe_name = || FileSystemError::UnsafeFileName { name: name.to_string() };

    let components: Vec<&str> = name.split(['/', '\\']).collect();
    if components.iter().any(|c| *c == "..") {
        return Err(unsafe_name().into());
    }

    let last = components.last().map(|c| c.trim()).unwrap_or_default();
    if last.is_empty() || last == "." || last.chars().any(|c| c.is_control() || c == ':') {
        return Err(unsafe_name().into());
    }
    Ok(last.to_string())
}

/// Turn an API-supplied path such as `disc1/t01.mp3` into a relative path
/// that stays inside the recording folder. Each component must pass
/// [`sanitize_filename`]; empty and `.` components are dropped.
pub fn sanitize_relative_path(name: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    let components: Vec<&str> = name.split(['/', '\\']).collect();
    let last = components.len().saturating_sub(1);

    for (i, component) in components.iter().enumerate() {
        let trimmed = component.trim();
        if i < last && (trimmed.is_empty() || trimmed == ".") {
            continue;
        }
        path.push(sanitize_filename(trimmed).map_err(|_| FileSystemError::UnsafeFileName {
            name: name.to_string(),
        })?);
    }
    Ok(path)
}

/// Tracks in the first preferred format the recording offers. With no
/// preferred match, the most common format wins.
pub fn select_tracks<'a>(tracks: &'a [Track], preferred_formats: &[String]) -> Vec<&'a Track> {
    let format_of = |t: &Track| t.format.as_deref().unwrap_or_default().to_ascii_lowercase();

    for preferred in preferred_formats {
        let wanted = preferred.to_ascii_lowercase();
        let chosen: Vec<&Track> = tracks.iter().filter(|t| format_of(t) == wanted).collect();
        if !chosen.is_empty() {
            return chosen;
        }
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for track in tracks {
        let format = format_of(track);
        match counts.iter_mut().find(|(f, _)| *f == format) {
            Some((_, n)) => *n += 1,
            None => counts.push((format, 1)),
        }
    }
    let Some((fallback, _)) = counts.into_iter().max_by_key(|(_, n)| *n) else {
        return Vec::new();
    };
    tracks.iter().filter(|t| format_of(t) == fallback).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes: u64,
}

enum Outcome {
    Completed(u64),
    Failed,
    Cancelled,
    NotStarted,
}

#[derive(Clone)]
pub struct DownloadManager {
    metadata: MetadataService,
    db: SharedDatabase,
    download_dir: PathBuf,
    preferred_formats: Vec<String>,
    progress: ProgressTracker,
}

impl DownloadManager {
    pub fn new(
        metadata: MetadataService,
        db: SharedDatabase,
        download_dir: PathBuf,
        preferred_formats: Vec<String>,
    ) -> Self {
        Self {
            metadata,
            db,
            download_dir,
            preferred_formats,
            progress: ProgressTracker::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Queue the audio files of one recording. Returns how many rows were
    /// added or re-queued; completed files are left alone.
    pub async fn enqueue_recording(&self, identifier: &str) -> Result<usize> {
        let known = lock_db(&self.db)?.recording_exists(identifier)?;
        if !known {
            let item = self
                .metadata
                .get_item(identifier, false)
                .await?
                .ok_or_else(|| DeadArchiveError::NotFound(format!("recording {}", identifier)))?;
            let db = lock_db(&self.db)?;
            let tx = db.catalog();
            tx.upsert_recording(&item.recording)?;
            tx.replace_tracks(identifier, &item.tracks)?;
        }

        let tracks = self.metadata.tracks(identifier).await?;
        let selected = select_tracks(&tracks, &self.preferred_formats);
        if selected.is_empty() {
            warn!("{} has no audio files to download", identifier);
            return Ok(0);
        }

        let folder = sanitize_filename(identifier)?;
        let db = lock_db(&self.db)?;
        let mut queued = 0;
        for track in selected {
            let relative = match sanitize_relative_path(&track.filename) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping {}: {}", track.filename, e);
                    continue;
                }
            };
            let local_path = self.download_dir.join(&folder).join(&relative);
            let url = self.metadata.client().download_url(identifier, &track.filename);
            if db.queue_download(
                identifier,
                &track.filename,
                &url,
                &local_path.to_string_lossy(),
                track.size_bytes,
            )? {
                queued += 1;
            }
        }

        info!("Queued {} files from {}", queued, identifier);
        Ok(queued)
    }

    /// Queue the best recording of a show, or its first one.
    pub async fn enqueue_show(&self, show_id: &str) -> Result<(String, usize)> {
        let identifier = {
            let db = lock_db(&self.db)?;
            let show = db
                .get_show(show_id)?
                .ok_or_else(|| DeadArchiveError::NotFound(format!("show {}", show_id)))?;
            match show.best_recording_id {
                Some(best) => best,
                None => db
                    .recordings_for_show(show_id)?
                    .into_iter()
                    .next()
                    .map(|r| r.identifier)
                    .ok_or_else(|| DeadArchiveError::NotFound(format!("recordings for show {}", show_id)))?,
            }
        };

        let queued = self.enqueue_recording(&identifier).await?;
        Ok((identifier, queued))
    }

    /// Drain the queue with at most `parallel` transfers in flight.
    pub async fn run(&self, parallel: usize, shutdown: &ShutdownSignal) -> Result<RunStats> {
        let queued = {
            let db = lock_db(&self.db)?;
            let stale = db.reset_stale_downloads()?;
            if stale > 0 {
                info!("Re-queued {} interrupted downloads", stale);
            }
            db.list_downloads(Some(DownloadStatus::Queued))?
        };

        self.progress
            .start_phase(SyncPhase::Fetching, queued.len(), format!("Downloading {} files", queued.len()));
        let stats = Mutex::new(RunStats::default());

        stream::iter(queued)
            .for_each_concurrent(parallel.max(1), |entry| {
                let stats = &stats;
                async move {
                    let outcome = self.process(&entry, shutdown).await;
                    if let Ok(mut s) = stats.lock() {
                        match outcome {
                            Outcome::Completed(bytes) => {
                                s.completed += 1;
                                s.bytes += bytes;
                            }
                            Outcome::Failed => s.failed += 1,
                            Outcome::Cancelled => s.cancelled += 1,
                            Outcome::NotStarted => {}
                        }
                    }
                    self.progress.advance(1);
                }
            })
            .await;

        let stats = stats
            .into_inner()
            .map_err(|_| DeadArchiveError::Internal(anyhow::anyhow!("download stats lock poisoned")))?;

        if shutdown.is_requested() {
            self.progress.fail("stopped by user");
        } else {
            self.progress.finish(format!("{} completed, {} failed", stats.completed, stats.failed));
        }
        Ok(stats)
    }

    async fn process(&self, entry: &DownloadEntry, shutdown: &ShutdownSignal) -> Outcome {
        if shutdown.is_requested() {
            return Outcome::NotStarted;
        }

        let started = lock_db(&self.db).and_then(|db| db.set_download_status(entry.id, DownloadStatus::Downloading, None));
        if let Err(e) = started {
            debug!("Not starting {}: {}", entry.filename, e);
            return Outcome::NotStarted;
        }

        let part = part_path(Path::new(&entry.local_path));
        match self.transfer(entry, &part, shutdown).await {
            Ok(bytes) => self.complete(entry, bytes).await,
            Err(DeadArchiveError::Cancelled) => {
                let _ = fs::remove_file(&part).await;
                Outcome::Cancelled
            }
            Err(e) => {
                warn!("Download of {} failed: {}", entry.filename, e);
                let _ = fs::remove_file(&part).await;
                let message = e.to_string();
                if let Err(e) = lock_db(&self.db)
                    .and_then(|db| db.set_download_status(entry.id, DownloadStatus::Failed, Some(&message)))
                {
                    warn!("Could not mark {} failed: {}", entry.filename, e);
                }
                Outcome::Failed
            }
        }
    }

    /// Mark a renamed file completed. A row cancelled while the last bytes
    /// arrived wins: its file is deleted and the outcome is `Cancelled`.
    async fn complete(&self, entry: &DownloadEntry, bytes: u64) -> Outcome {
        let done = lock_db(&self.db).and_then(|db| {
            let status = db.get_download(entry.id)?.map(|d| d.status);
            if status == Some(DownloadStatus::Cancelled) {
                return Ok(false);
            }
            db.set_download_progress(entry.id, bytes, None)?;
            db.set_download_status(entry.id, DownloadStatus::Completed, None)?;
            Ok(true)
        });

        match done {
            Ok(true) => {
                info!("Downloaded {} ({} bytes)", entry.local_path, bytes);
                Outcome::Completed(bytes)
            }
            Ok(false) => {
                info!("{} was cancelled", entry.filename);
                if let Err(e) = fs::remove_file(&entry.local_path).await {
                    warn!("Could not delete cancelled file {}: {}", entry.local_path, e);
                }
                Outcome::Cancelled
            }
            Err(e) => {
                warn!("Could not mark {} completed: {}", entry.filename, e);
                Outcome::Failed
            }
        }
    }

    async fn transfer(&self, entry: &DownloadEntry, part: &Path, shutdown: &ShutdownSignal) -> Result<u64> {
        let target = Path::new(&entry.local_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut response = self.metadata.client().open_download(&entry.url).await?;
        let total = response.content_length().or(entry.total_bytes);
        let mut file = fs::File::create(part).await?;
        let mut written = 0u64;
        let mut reported = 0u64;

        while let Some(chunk) = response.chunk().await? {
            // Interrupted rows stay `downloading`; the next run re-queues them
            if shutdown.is_requested() {
                return Err(DeadArchiveError::Cancelled);
            }
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if written - reported >= PROGRESS_STEP {
                reported = written;
                let status = {
                    let db = lock_db(&self.db)?;
                    db.set_download_progress(entry.id, written, total)?;
                    db.get_download(entry.id)?.map(|d| d.status)
                };
                if status == Some(DownloadStatus::Cancelled) {
                    info!("{} was cancelled", entry.filename);
                    return Err(DeadArchiveError::Cancelled);
                }
            }
        }

        file.flush().await?;
        drop(file);
        fs::rename(part, target).await?;
        Ok(written)
    }

    /// Cancel every unfinished file of a recording.
    pub fn cancel(&self, identifier: &str) -> Result<usize> {
        let db = lock_db(&self.db)?;
        let mut cancelled = 0;
        for entry in db.downloads_for_recording(identifier)? {
            if matches!(entry.status, DownloadStatus::Completed | DownloadStatus::Cancelled) {
                continue;
            }
            db.set_download_status(entry.id, DownloadStatus::Cancelled, None)?;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    pub fn retry_failed(&self) -> Result<usize> {
        lock_db(&self.db)?.requeue_failed()
    }

    /// Delete a recording's downloaded files and its queue rows.
    pub async fn remove(&self, identifier: &str) -> Result<usize> {
        let entries = lock_db(&self.db)?.downloads_for_recording(identifier)?;
        let mut removed_files = 0;

        for entry in &entries {
            let path = PathBuf::from(&entry.local_path);
            for candidate in [part_path(&path), path] {
                match fs::remove_file(&candidate).await {
                    Ok(()) => removed_files += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(FileSystemError::Io(e).into()),
                }
            }
        }

        let folder = self.download_dir.join(sanitize_filename(identifier)?);
        // Disc subfolders go first; non-empty ones are left alone
        for entry in &entries {
            let mut dir = Path::new(&entry.local_path).parent();
            while let Some(current) = dir.filter(|d| d.starts_with(&folder) && *d != folder.as_path()) {
                if fs::remove_dir(current).await.is_err() {
                    break;
                }
                dir = current.parent();
            }
        }
        if let Ok(mut dir) = fs::read_dir(&folder).await {
            if dir.next_entry().await?.is_none() {
                fs::remove_dir(&folder).await?;
            }
        }

        let rows = lock_db(&self.db)?.delete_downloads_for_recording(identifier)?;
        info!("Removed {} files and {} queue entries for {}", removed_files, rows, identifier);
        Ok(removed_files)
    }

    pub fn list(&self, status: Option<DownloadStatus>) -> Result<Vec<DownloadEntry>> {
        lock_db(&self.db)?.list_downloads(status)
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::data::database::tests::seeded_db;
    use crate::core::infrastructure::cache::{FileCache, MetadataCache};
    use crate::core::services::archive::ArchiveClient;
    use tokio::sync::Mutex as AsyncMutex;

    const HICKS: &str = "gd77-05-08.sbd.hicks.4982.sbeok.shnf";
    const SHOW: &str = "1977-05-08-barton-hall-cornell-university";

    fn track(filename: &str, format: &str) -> Track {
        Track {
            recording_id: HICKS.to_string(),
            filename: filename.to_string(),
            track_number: None,
            title: None,
            duration_seconds: None,
            format: Some(format.to_string()),
            size_bytes: None,
        }
    }

    fn offline_manager(dir: &Path) -> DownloadManager {
        manager_for(dir, "http://127.0.0.1:9")
    }

    fn manager_for(dir: &Path, base_url: &str) -> DownloadManager {
        let mut config = Config::default();
        config.archive_base_url = base_url.to_string();
        config.max_retries = 1;
        config.retry_delay_ms = 1;
        config.request_interval_ms = 0;

        let client = ArchiveClient::new(&config).unwrap();
        let cache: Box<dyn MetadataCache> = Box::new(FileCache::new(dir.join("cache"), 24).unwrap());
        let db: SharedDatabase = Arc::new(Mutex::new(seeded_db()));
        let metadata = MetadataService::new(client, Arc::new(AsyncMutex::new(cache)), db.clone());
        DownloadManager::new(metadata, db, dir.join("music"), config.preferred_formats)
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("gd77-05-08d1t01.mp3").unwrap(), "gd77-05-08d1t01.mp3");
        assert_eq!(sanitize_filename("disc1/gd77-05-08d1t01.mp3").unwrap(), "gd77-05-08d1t01.mp3");
        assert_eq!(sanitize_filename("C:\\music\\t01.flac").unwrap(), "t01.flac");
        assert_eq!(sanitize_filename("t01:flac").unwrap_err().to_string(), "Unsafe file name: t01:flac");
        assert!(sanitize_filename("../../etc/passwd").is_err());
        assert!(sanitize_filename("disc1/").is_err());
        assert!(sanitize_filename("").is_err());
    }

    #[test]
    fn test_sanitize_relative_path_keeps_folders() {
        assert_eq!(sanitize_relative_path("disc1/t01.mp3").unwrap(), PathBuf::from("disc1").join("t01.mp3"));
        assert_eq!(sanitize_relative_path("./disc2//t01.mp3").unwrap(), PathBuf::from("disc2").join("t01.mp3"));
        assert_eq!(sanitize_relative_path("t01.mp3").unwrap(), PathBuf::from("t01.mp3"));
        assert!(sanitize_relative_path("disc1/../../t01.mp3").is_err());
        assert!(sanitize_relative_path("C:\\music\\t01.flac").is_err());
        assert!(sanitize_relative_path("disc1/").is_err());
    }

    #[test]
    fn test_select_tracks_prefers_formats_in_order() {
        let tracks = vec![
            track("t01.flac", "Flac"),
            track("t01.mp3", "VBR MP3"),
            track("t02.flac", "Flac"),
            track("t02.mp3", "VBR MP3"),
        ];
        let prefs = vec!["Ogg Vorbis".to_string(), "vbr mp3".to_string()];
        let chosen: Vec<&str> = select_tracks(&tracks, &prefs).iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(chosen, vec!["t01.mp3", "t02.mp3"]);

        // No preferred format present: the dominant one is used
        let tracks = vec![track("a.shn", "Shorten"), track("b.shn", "Shorten"), track("c.wav", "WAVE")];
        assert_eq!(select_tracks(&tracks, &prefs).len(), 2);
        assert!(select_tracks(&[], &prefs).is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_show_uses_local_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(dir.path());

        let (identifier, queued) = manager.enqueue_show(SHOW).await.unwrap();
        assert_eq!(identifier, HICKS);
        assert_eq!(queued, 1);

        let entries = manager.list(Some(DownloadStatus::Queued)).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].url.ends_with("/download/gd77-05-08.sbd.hicks.4982.sbeok.shnf/gd77-05-08d2t02.mp3"));
        assert!(entries[0].local_path.ends_with("gd77-05-08d2t02.mp3"));

        // Queuing again changes nothing
        assert_eq!(manager.enqueue_recording(HICKS).await.unwrap(), 0);
        assert!(matches!(
            manager.enqueue_show("1999-01-01-nowhere").await,
            Err(DeadArchiveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_same_name_in_different_folders_gets_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(dir.path());
        lock_db(&manager.db)
            .unwrap()
            .catalog()
            .replace_tracks(HICKS, &[track("disc1/t01.mp3", "VBR MP3"), track("disc2/t01.mp3", "VBR MP3")])
            .unwrap();

        assert_eq!(manager.enqueue_recording(HICKS).await.unwrap(), 2);
        let entries = manager.list(None).unwrap();
        let paths: Vec<PathBuf> = entries.iter().map(|e| PathBuf::from(&e.local_path)).collect();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);

        let folder = dir.path().join("music").join(HICKS);
        assert!(paths.contains(&folder.join("disc1").join("t01.mp3")));
        assert!(paths.contains(&folder.join("disc2").join("t01.mp3")));

        for path in &paths {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"audio").unwrap();
        }
        assert_eq!(manager.remove(HICKS).await.unwrap(), 2);
        assert!(!folder.exists());
    }

    #[tokio::test]
    async fn test_cancel_retry_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(dir.path());
        manager.enqueue_recording(HICKS).await.unwrap();

        assert_eq!(manager.cancel(HICKS).unwrap(), 1);
        assert_eq!(manager.cancel(HICKS).unwrap(), 0);
        assert_eq!(manager.list(Some(DownloadStatus::Cancelled)).unwrap().len(), 1);

        assert_eq!(manager.retry_failed().unwrap(), 1);
        assert_eq!(manager.list(Some(DownloadStatus::Queued)).unwrap().len(), 1);

        let entry = &manager.list(None).unwrap()[0];
        let path = PathBuf::from(&entry.local_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"audio").unwrap();

        assert_eq!(manager.remove(HICKS).await.unwrap(), 1);
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
        assert!(manager.list(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_marks_unreachable_files_failed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(dir.path());
        manager.enqueue_recording(HICKS).await.unwrap();

        let stats = manager.run(2, &ShutdownSignal::new()).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);

        let failed = manager.list(Some(DownloadStatus::Failed)).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.is_some());
    }

    /// Answer every request on a local port with `body`.
    async fn serve_file(body: Vec<u8>) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_run_streams_to_part_file_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<u8> = (0..(PROGRESS_STEP as usize * 3 / 2)).map(|i| (i % 251) as u8).collect();
        let manager = manager_for(dir.path(), &serve_file(body.clone()).await);
        manager.enqueue_recording(HICKS).await.unwrap();

        let stats = manager.run(2, &ShutdownSignal::new()).await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.bytes, body.len() as u64);

        let entry = manager.list(None).unwrap().remove(0);
        assert_eq!(entry.status, DownloadStatus::Completed);
        assert_eq!(entry.bytes_downloaded, body.len() as u64);
        assert!(entry.error.is_none());

        let path = PathBuf::from(&entry.local_path);
        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert!(!part_path(&path).exists());
    }

    #[tokio::test]
    async fn test_cancel_during_last_chunk_discards_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(dir.path());
        manager.enqueue_recording(HICKS).await.unwrap();

        let entry = manager.list(None).unwrap().remove(0);
        let path = PathBuf::from(&entry.local_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"audio").unwrap();

        // Cancelled after the last progress check, before completion
        assert_eq!(manager.cancel(HICKS).unwrap(), 1);
        assert!(matches!(manager.complete(&entry, 5).await, Outcome::Cancelled));
        assert!(!path.exists());
        assert_eq!(manager.list(Some(DownloadStatus::Cancelled)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_after_shutdown_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(dir.path());
        manager.enqueue_recording(HICKS).await.unwrap();

        let shutdown = ShutdownSignal::new();
        shutdown.request();
        let stats = manager.run(2, &shutdown).await.unwrap();
        assert_eq!(stats, RunStats::default());
        assert_eq!(manager.list(Some(DownloadStatus::Queued)).unwrap().len(), 1);
    }
}
