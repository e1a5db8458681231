//! Archive.org client: advanced search, item metadata and download URLs.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::catalog::normalize::normalize_date;
use crate::core::data::models::{Recording, SourceType, Track};
use crate::core::services::flexible::{
    first_string, flexible_f64, flexible_u32, flexible_u64, joined_string,
};
use crate::error::{DeadArchiveError, NetworkError, Result};

/// Fields requested from advanced search.
pub const SEARCH_FIELDS: &[&str] = &[
    "identifier",
    "title",
    "date",
    "venue",
    "coverage",
    "source",
    "taper",
    "lineage",
    "avg_rating",
    "num_reviews",
];

const AUDIO_FORMAT_HINTS: &[&str] = &["mp3", "ogg", "flac", "shorten", "wave", "aiff", "lossless"];
const NON_AUDIO_HINTS: &[&str] = &["fingerprint", "checksum", "spectrogram", "png", "jpeg"];

// ----- wire types -----

#[derive(Debug, Clone, Deserialize)]
pub struct SearchDoc {
    pub identifier: String,
    #[serde(default, deserialize_with = "first_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub coverage: Option<String>,
    #[serde(default, deserialize_with = "joined_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub taper: Option<String>,
    #[serde(default, deserialize_with = "joined_string")]
    pub lineage: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub avg_rating: Option<f64>,
    #[serde(default, deserialize_with = "flexible_u32")]
    pub num_reviews: Option<u32>,
}

impl SearchDoc {
    pub fn into_recording(self) -> Recording {
        let source_type = SourceType::detect(
            &self.identifier,
            self.title.as_deref().unwrap_or_default(),
            self.source.as_deref().unwrap_or_default(),
        );
        let date = self
            .date
            .as_deref()
            .and_then(normalize_date)
            .or(self.date);

        Recording {
            identifier: self.identifier,
            show_id: None,
            title: self.title,
            date,
            venue: self.venue,
            location: self.coverage,
            source_type,
            taper: self.taper,
            lineage: self.lineage,
            avg_rating: self.avg_rating,
            weighted_rating: None,
            num_reviews: self.num_reviews.unwrap_or(0) as i64,
            tracks_fetched: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(rename = "numFound", default)]
    num_found: usize,
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub num_found: usize,
    pub docs: Vec<SearchDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemFields {
    #[serde(default, deserialize_with = "first_string")]
    pub identifier: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub coverage: Option<String>,
    #[serde(default, deserialize_with = "joined_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub taper: Option<String>,
    #[serde(default, deserialize_with = "joined_string")]
    pub lineage: Option<String>,
    #[serde(default, deserialize_with = "joined_string")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ItemFile {
    pub name: String,
    #[serde(default, deserialize_with = "first_string")]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "flexible_u32")]
    pub track: Option<u32>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub length: Option<f64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub size: Option<u64>,
}

impl ItemFile {
    pub fn is_audio(&self) -> bool {
        let format = match &self.format {
            Some(f) => f.to_ascii_lowercase(),
            None => return false,
        };
        AUDIO_FORMAT_HINTS.iter().any(|hint| format.contains(hint))
            && !NON_AUDIO_HINTS.iter().any(|hint| format.contains(hint))
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Review {
    #[serde(default, deserialize_with = "flexible_f64")]
    pub stars: Option<f64>,
    #[serde(default, rename = "reviewtitle", deserialize_with = "first_string")]
    pub title: Option<String>,
    #[serde(default, rename = "reviewbody", deserialize_with = "first_string")]
    pub body: Option<String>,
    #[serde(default, rename = "reviewdate", deserialize_with = "first_string")]
    pub date: Option<String>,
}

/// Response of `/metadata/{identifier}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemMetadata {
    #[serde(default)]
    pub metadata: ItemFields,
    #[serde(default)]
    pub files: Vec<ItemFile>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl ItemMetadata {
    /// Archive.org answers unknown identifiers with `{}` and status 200.
    pub fn is_empty(&self) -> bool {
        self.metadata.identifier.is_none() && self.files.is_empty()
    }

    pub fn to_recording(&self, identifier: &str) -> Recording {
        let fields = &self.metadata;
        let source_type = SourceType::detect(
            identifier,
            fields.title.as_deref().unwrap_or_default(),
            &format!(
                "{} {}",
                fields.source.as_deref().unwrap_or_default(),
                fields.description.as_deref().unwrap_or_default()
            ),
        );

        let stars: Vec<f64> = self.reviews.iter().filter_map(|r| r.stars).filter(|s| *s > 0.0).collect();
        let avg_rating = if stars.is_empty() {
            None
        } else {
            Some(stars.iter().sum::<f64>() / stars.len() as f64)
        };

        Recording {
            identifier: identifier.to_string(),
            show_id: None,
            title: fields.title.clone(),
            date: fields.date.as_deref().and_then(normalize_date).or_else(|| fields.date.clone()),
            venue: fields.venue.clone(),
            location: fields.coverage.clone(),
            source_type,
            taper: fields.taper.clone(),
            lineage: fields.lineage.clone(),
            avg_rating,
            weighted_rating: None,
            num_reviews: stars.len() as i64,
            tracks_fetched: true,
        }
    }

    /// Audio files as tracks, numbered by their `track` field or file order.
    pub fn tracks(&self, identifier: &str) -> Vec<Track> {
        let mut audio: Vec<&ItemFile> = self.files.iter().filter(|f| f.is_audio()).collect();
        audio.sort_by(|a, b| a.name.cmp(&b.name));

        audio
            .into_iter()
            .map(|file| Track {
                recording_id: identifier.to_string(),
                filename: file.name.clone(),
                track_number: file.track,
                title: file.title.clone(),
                duration_seconds: file.length,
                format: file.format.clone(),
                size_bytes: file.size,
            })
            .collect()
    }
}

// ----- date ranges -----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Halve the range; `None` for a single day.
    pub fn split(&self) -> Option<(DateRange, DateRange)> {
        if self.days() <= 1 {
            return None;
        }
        let mid = self.start + ChronoDuration::days(self.days() / 2 - 1);
        Some((
            DateRange::new(self.start, mid),
            DateRange::new(mid + ChronoDuration::days(1), self.end),
        ))
    }

    pub fn query_clause(&self) -> String {
        format!(
            "date:[{}T00:00:00Z TO {}T23:59:59Z]",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start.year() == self.end.year() && self.days() >= 365 {
            write!(f, "{}", self.start.year())
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// One range per calendar year, inclusive.
pub fn year_ranges(start_year: i32, end_year: i32) -> Vec<DateRange> {
    (start_year..=end_year).filter_map(DateRange::year).collect()
}

/// Fetch every doc in `range`, bisecting while a chunk reports more hits
/// than `row_limit`. A single day is fetched as-is even when oversized.
pub async fn collect_chunked<F, Fut>(range: DateRange, row_limit: usize, mut fetch: F) -> Result<Vec<SearchDoc>>
where
    F: FnMut(DateRange) -> Fut,
    Fut: Future<Output = Result<SearchPage>>,
{
    let mut pending = vec![range];
    let mut docs = Vec::new();

    while let Some(chunk) = pending.pop() {
        let page = fetch(chunk).await?;

        if page.num_found > row_limit {
            match chunk.split() {
                Some((first, second)) => {
                    debug!("{} has {} hits, splitting", chunk, page.num_found);
                    pending.push(second);
                    pending.push(first);
                    continue;
                }
                None => warn!(
                    "{} alone has {} hits; only {} will be fetched",
                    chunk, page.num_found, row_limit
                ),
            }
        }

        docs.extend(page.docs);
    }

    Ok(docs)
}

// ----- client -----

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// Attempts are spaced by a fixed delay.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!("{} failed (attempt {}/{}): {}", what, attempt, self.max_attempts, e);
                    sleep(self.delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(NetworkError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    }
                    .into())
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Clone)]
pub struct ArchiveClient {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    row_limit: usize,
    retry: RetryPolicy,
    request_interval: Duration,
    rate_limiter: Arc<Mutex<Option<Instant>>>,
}

impl ArchiveClient {
    pub fn new(config: &Config) -> Result<Self> {
        let version = env!("CARGO_PKG_VERSION");
        let user_agent = format!("deadarchive/{} (+https://github.com/deadarchive/deadarchive)", version);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .user_agent(user_agent)
            .build()
            .map_err(NetworkError::Http)?;

        Ok(Self {
            client,
            base_url: config.archive_base_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            row_limit: config.search_row_limit,
            retry: RetryPolicy {
                max_attempts: config.max_retries.max(1),
                delay: Duration::from_millis(config.retry_delay_ms),
            },
            request_interval: Duration::from_millis(config.request_interval_ms),
            rate_limiter: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Keep at least `request_interval` between requests across clones.
    async fn enforce_rate_limit(&self) {
        let mut last_request = self.rate_limiter.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.request_interval {
                let wait = self.request_interval - elapsed;
                debug!(sleep_ms = wait.as_millis() as u64, "Rate limiting Archive.org request");
                sleep(wait).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    /// One GET; 404 maps to `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        self.enforce_rate_limit().await;

        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NetworkError::RateLimit.into());
        }
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = response.text().await?;
        let parsed = serde_json::from_str(&body).map_err(|e| NetworkError::InvalidResponse {
            reason: format!("{}: {}", url, e),
        })?;
        Ok(Some(parsed))
    }

    /// Raw advanced-search call for an arbitrary query.
    pub async fn search(&self, query: &str, rows: usize) -> Result<SearchPage> {
        let url = format!("{}/advancedsearch.php", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("rows", rows.to_string()),
            ("page", "1".to_string()),
            ("output", "json".to_string()),
            ("sort[]", "date asc".to_string()),
        ];
        params.extend(SEARCH_FIELDS.iter().map(|f| ("fl[]", f.to_string())));

        let envelope: Option<SearchEnvelope> = self
            .retry
            .run("advanced search", || self.get_json(&url, &params))
            .await?;

        let body = envelope.ok_or_else(|| NetworkError::InvalidResponse {
            reason: "advanced search endpoint returned 404".to_string(),
        })?;

        Ok(SearchPage {
            num_found: body.response.num_found,
            docs: body.response.docs,
        })
    }

    pub fn collection_query(&self, range: &DateRange) -> String {
        format!(
            "collection:{} AND mediatype:etree AND {}",
            self.collection,
            range.query_clause()
        )
    }

    /// All recordings dated within `range`, chunked under the row limit.
    pub async fn search_date_range(&self, range: DateRange) -> Result<Vec<SearchDoc>> {
        let row_limit = self.row_limit;
        let docs = collect_chunked(range, row_limit, |chunk| async move {
            self.search(&self.collection_query(&chunk), row_limit).await
        })
        .await?;
        info!("Fetched {} recordings for {}", docs.len(), range);
        Ok(docs)
    }

    /// Identifiers of the whole collection, oldest first, up to `limit`.
    pub async fn collection_identifiers(&self, limit: usize) -> Result<Vec<String>> {
        let query = format!("collection:{} AND mediatype:etree", self.collection);
        let page = self.search(&query, limit.min(self.row_limit)).await?;
        Ok(page.docs.into_iter().map(|d| d.identifier).collect())
    }

    /// Full item metadata. `None` when the item does not exist.
    pub async fn fetch_metadata(&self, identifier: &str) -> Result<Option<ItemMetadata>> {
        let url = format!("{}/metadata/{}", self.base_url, encode_segment(identifier));
        let item: Option<ItemMetadata> = self
            .retry
            .run("metadata fetch", || self.get_json(&url, &[]))
            .await?;

        Ok(item.filter(|m| !m.is_empty()))
    }

    pub fn download_url(&self, identifier: &str, filename: &str) -> String {
        download_url(&self.base_url, identifier, filename)
    }

    /// Start a streaming GET for a file download.
    pub async fn open_download(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .retry
            .run("download request", || async {
                self.enforce_rate_limit().await;
                let response = self.client.get(url).send().await?;
                let status = response.status();
                if status.is_success() {
                    Ok(response)
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    Err(NetworkError::RateLimit.into())
                } else {
                    Err(DeadArchiveError::Network(NetworkError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    }))
                }
            })
            .await?;
        Ok(response)
    }
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

pub fn download_url(base_url: &str, identifier: &str, filename: &str) -> String {
    // Filenames may contain subdirectories; keep the slashes.
    let path = filename
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/download/{}/{}", base_url.trim_end_matches('/'), encode_segment(identifier), path)
}
