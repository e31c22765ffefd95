//! Web search with retry and URL deduplication
//!
//! This module provides:
//! - A provider abstraction over web search backends
//! - Bounded retry with exponential backoff for transient failures
//! - Result deduplication by normalized URL
//! - Result capping and contiguous ranking

mod duckduckgo;
mod searxng;

pub use duckduckgo::{parse_results as parse_duckduckgo_results, DuckDuckGoProvider};
pub use searxng::SearxngProvider;

use crate::config::{SearchConfig, SearchProviderKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// A ranked search hit, unique by normalized URL within one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// 1-based position after deduplication
    pub rank: usize,
}

/// A result as reported by a provider, before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Trait for web search backends
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a single search request. `limit` is a hint; providers may return more.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawHit>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Search client that wraps a provider with retry, dedupe and capping
pub struct SearchClient {
    provider: Box<dyn SearchProvider>,
    attempts: u32,
    backoff: Duration,
}

impl SearchClient {
    /// Create a client around an existing provider
    pub fn new(provider: Box<dyn SearchProvider>, attempts: u32, backoff: Duration) -> Self {
        Self {
            provider,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Create a client for the configured provider
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let provider = create_provider(config)?;
        Ok(Self::new(
            provider,
            config.attempts,
            Duration::from_millis(config.backoff_ms),
        ))
    }

    /// Search and return at most `max_results` results with unique normalized URLs
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let hits = self.search_with_retry(query, max_results).await?;
        let raw_count = hits.len();
        let results = dedupe_hits(hits, max_results);

        info!(
            "{} returned {} hits, {} after dedupe",
            self.provider.name(),
            raw_count,
            results.len()
        );
        Ok(results)
    }

    async fn search_with_retry(&self, query: &str, limit: usize) -> Result<Vec<RawHit>> {
        let mut last_err: Option<Error> = None;

        for attempt in 1..=self.attempts {
            match self.provider.search(query, limit).await {
                Ok(hits) => return Ok(hits),
                Err(e) if !is_transient(&e) => {
                    warn!("Search via {} failed permanently: {}", self.provider.name(), e);
                    return Err(Error::SearchUnavailable(format!(
                        "{}: {}",
                        self.provider.name(),
                        e
                    )));
                }
                Err(e) => {
                    warn!(
                        "Search attempt {}/{} via {} failed: {}",
                        attempt,
                        self.attempts,
                        self.provider.name(),
                        e
                    );
                    last_err = Some(e);
                }
            }

            if attempt < self.attempts {
                let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                debug!("Retrying search in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(Error::SearchUnavailable(match last_err {
            Some(e) => format!("{} after {} attempts: {}", self.provider.name(), self.attempts, e),
            None => format!("{} returned nothing", self.provider.name()),
        }))
    }
}

/// Whether a provider error may clear up on retry
fn is_transient(err: &Error) -> bool {
    match err {
        Error::SearchUnavailable(_) => true,
        Error::Http(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.status().is_some_and(|s| s.is_server_error())
        }
        _ => false,
    }
}

/// Error for a non-success provider response. Server errors and rate
/// limiting are transient; other statuses are not.
fn status_error(provider: &str, status: StatusCode) -> Error {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::SearchUnavailable(format!("{} returned HTTP {}", provider, status))
    } else {
        Error::Other(format!("{} rejected the request: HTTP {}", provider, status))
    }
}

/// Create a provider based on configuration
pub fn create_provider(config: &SearchConfig) -> Result<Box<dyn SearchProvider>> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create search HTTP client: {}", e)))?;

    let endpoint = config.resolved_endpoint();
    match config.provider {
        SearchProviderKind::DuckDuckGo => Ok(Box::new(DuckDuckGoProvider::new(client, &endpoint)?)),
        SearchProviderKind::Searxng => Ok(Box::new(SearxngProvider::new(client, &endpoint)?)),
    }
}

/// Drop hits with unusable or duplicate URLs, cap, and assign ranks
pub fn dedupe_hits(hits: Vec<RawHit>, max_results: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for hit in hits {
        if results.len() >= max_results {
            break;
        }
        let Some(normalized) = normalize_url(&hit.url) else {
            debug!("Skipping unusable result URL: {}", hit.url);
            continue;
        };
        if !seen.insert(normalized) {
            continue;
        }
        results.push(SearchResult {
            url: hit.url,
            title: hit.title.trim().to_string(),
            snippet: hit.snippet.trim().to_string(),
            rank: results.len() + 1,
        });
    }

    results
}

/// Query parameters that never identify a distinct resource
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "ref", "ref_src", "mc_cid", "mc_eid", "_ga", "_hsenc", "_hsmi",
];

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Normalize a URL for deduplication
///
/// Keeps scheme, host and path (trailing slash trimmed). The fragment is always
/// removed. Tracking parameters are removed; remaining query parameters are
/// kept in sorted order since they usually select a distinct resource.
/// Returns `None` for unparseable or non-HTTP(S) URLs.
pub fn normalize_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();

    let mut normalized = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        normalized.push_str(&format!(":{}", port));
    }

    let path = parsed.path().trim_end_matches('/');
    normalized.push_str(if path.is_empty() { "/" } else { path });

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !params.is_empty() {
        params.sort();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        normalized.push('?');
        normalized.push_str(&query);
    }

    Some(normalized)
}
