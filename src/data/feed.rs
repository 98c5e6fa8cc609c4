//! Upstream feed readers.
//!
//! A `Fetcher` performs exactly one read and normalizes it. Retrying is the
//! engine's job, never the fetcher's.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::Client;
use reqwest::header::CACHE_CONTROL;
use tracing::debug;

use crate::data::normalize::normalize;
use crate::domain::{Balance, FeedConfig, FeedKind};
use crate::error::{AppError, FetchError};

/// One read against an upstream feed.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<Balance, FetchError>;
}

/// Build the fetcher described by a feed config.
pub fn build_fetcher(config: &FeedConfig) -> Result<Box<dyn Fetcher>, AppError> {
    match &config.kind {
        FeedKind::Http { url } => Ok(Box::new(HttpFeed::new(url, config.column, config.timeout)?)),
        FeedKind::Simulated => Ok(Box::new(SimulatedFeed::new(Duration::from_millis(300)))),
    }
}

/// Published-sheet CSV export over HTTP.
pub struct HttpFeed {
    client: Client,
    url: String,
    column: Option<usize>,
}

impl HttpFeed {
    pub fn new(url: &str, column: Option<usize>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
            column,
        })
    }

    async fn read_body(&self) -> Result<String, FetchError> {
        let token = cache_bust_token();
        let resp = self
            .client
            .get(&self.url)
            .query(&[("_", token.as_str())])
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| FetchError::Network(describe_reqwest_error(&e)))?;

        if !resp.status().is_success() {
            return Err(FetchError::Network(format!("HTTP {}", resp.status())));
        }

        resp.text()
            .await
            .map_err(|e| FetchError::Network(describe_reqwest_error(&e)))
    }
}

#[async_trait]
impl Fetcher for HttpFeed {
    async fn fetch(&self) -> Result<Balance, FetchError> {
        let body = self.read_body().await?;
        let raw = extract_reading(&body, self.column)?;
        debug!(url = %self.url, raw = %raw, "feed read");
        normalize(&raw)
    }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "read timed out".to_string()
    } else {
        e.to_string()
    }
}

/// Per-request query value defeating intermediate caches.
///
/// Millisecond timestamps alone collide for near-simultaneous requests, so a
/// random suffix is appended.
pub fn cache_bust_token() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen_range(0..u32::MAX);
    format!("{millis}-{nonce:08x}")
}

/// Pick the raw reading out of a response body.
///
/// Without a column the whole body is the reading (single-cell export).
/// With a column, the body is parsed as CSV and the field is taken from the
/// first record.
pub fn extract_reading(body: &str, column: Option<usize>) -> Result<String, FetchError> {
    let Some(column) = column else {
        return Ok(body.to_string());
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let record = match reader.records().next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => return Err(FetchError::Parse(format!("malformed CSV: {e}"))),
        None => return Err(FetchError::EmptyData),
    };

    record
        .get(column)
        .map(str::to_string)
        .ok_or(FetchError::EmptyData)
}

/// Readings a real sheet produced at various times, including a broken formula.
const SIMULATED_READINGS: &[&str] = &[
    "Rp 613.000",
    "Rp 1.300.000",
    "Rp 750.000",
    "Rp 200.000",
    "Rp 950.000",
    "1.300.000",
    "#REF!",
];

/// Random readings with a small latency; convergence rarely happens quickly,
/// which makes it useful for watching the engine retry.
pub struct SimulatedFeed {
    latency: Duration,
}

impl SimulatedFeed {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Fetcher for SimulatedFeed {
    async fn fetch(&self) -> Result<Balance, FetchError> {
        let (jitter, raw) = {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0..=self.latency.as_millis() as u64);
            let raw = SIMULATED_READINGS.choose(&mut rng).copied().unwrap_or("");
            (jitter, raw)
        };
        tokio::time::sleep(self.latency + Duration::from_millis(jitter)).await;
        normalize(raw)
    }
}
