//! Page fetching with static/rendered escalation
//!
//! This module provides:
//! - Static HTTP fetching with timeouts and bounded retry
//! - SPA detection and headless-browser escalation
//! - Per-host rate limiting
//! - Bounded-concurrency batch fetching under a deadline

mod detection;
mod rate_limit;
mod renderer;

pub use detection::*;
pub use rate_limit::*;
pub use renderer::*;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// How a page was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageContentType {
    /// Plain HTTP response body
    Static,
    /// DOM captured after script execution
    Rendered,
}

/// Body format of a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Html,
    PlainText,
}

impl MediaType {
    /// Map a Content-Type header to a supported media type.
    /// A missing header is treated as HTML.
    pub fn from_content_type(header: Option<&str>) -> Option<Self> {
        let Some(header) = header else {
            return Some(MediaType::Html);
        };
        let mime = header
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Some(MediaType::Html),
            "text/plain" => Some(MediaType::PlainText),
            _ => None,
        }
    }
}

/// Outcome of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    Timeout,
    Error(String),
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Ok => write!(f, "ok"),
            FetchStatus::Timeout => write!(f, "timeout"),
            FetchStatus::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// A fetched page. The raw content is non-empty exactly when the status is `Ok`.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    raw_content: String,
    pub content_type: PageContentType,
    pub media_type: MediaType,
    pub title: Option<String>,
    pub status: FetchStatus,
    /// HTTP status of the final response, if one was received
    pub http_status: Option<u16>,
    pub elapsed: Duration,
}

impl FetchedPage {
    /// A successful fetch. An empty body is recorded as an error instead.
    pub fn ok(
        url: &str,
        raw_content: String,
        content_type: PageContentType,
        media_type: MediaType,
        elapsed: Duration,
    ) -> Self {
        if raw_content.trim().is_empty() {
            return Self::failed(
                url,
                FetchStatus::Error("empty response body".to_string()),
                None,
                elapsed,
            );
        }
        Self {
            url: url.to_string(),
            raw_content,
            content_type,
            media_type,
            title: None,
            status: FetchStatus::Ok,
            http_status: None,
            elapsed,
        }
    }

    /// A failed fetch with no content
    pub fn failed(
        url: &str,
        status: FetchStatus,
        http_status: Option<u16>,
        elapsed: Duration,
    ) -> Self {
        let status = match status {
            FetchStatus::Ok => FetchStatus::Error("no content".to_string()),
            other => other,
        };
        Self {
            url: url.to_string(),
            raw_content: String::new(),
            content_type: PageContentType::Static,
            media_type: MediaType::Html,
            title: None,
            status,
            http_status,
            elapsed,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        if title.is_some() {
            self.title = title;
        }
        self
    }

    pub fn with_http_status(mut self, http_status: u16) -> Self {
        self.http_status = Some(http_status);
        self
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }

    /// Timeouts, connection failures, 5xx and 429 may succeed on retry
    pub fn is_transient_failure(&self) -> bool {
        match &self.status {
            FetchStatus::Ok => false,
            FetchStatus::Timeout => true,
            FetchStatus::Error(_) => match self.http_status {
                None => true,
                Some(code) => code == 429 || code >= 500,
            },
        }
    }

    /// The failure as an error value, if the fetch failed
    pub fn error(&self) -> Option<Error> {
        match &self.status {
            FetchStatus::Ok => None,
            status => Some(Error::FetchFailed {
                url: self.url.clone(),
                reason: status.to_string(),
            }),
        }
    }
}

/// A single-attempt page fetch strategy
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, giving up after `timeout`. Failures are reported in the page status.
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchedPage;

    /// Fetcher name for logging
    fn name(&self) -> &str;

    /// Release any resources held by the fetcher
    async fn close(&self) {}
}

/// Plain HTTP fetcher
pub struct StaticFetcher {
    client: Client,
}

impl StaticFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn get(
        &self,
        url: &str,
        start: Instant,
    ) -> std::result::Result<FetchedPage, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Ok(FetchedPage::failed(
                url,
                FetchStatus::Error(format!("HTTP {}", status)),
                Some(status.as_u16()),
                start.elapsed(),
            ));
        }

        let header = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let Some(media_type) = MediaType::from_content_type(header.as_deref()) else {
            return Ok(FetchedPage::failed(
                url,
                FetchStatus::Error(format!(
                    "unsupported content type {}",
                    header.unwrap_or_default()
                )),
                Some(status.as_u16()),
                start.elapsed(),
            ));
        };

        let body = response.text().await?;
        let title = match media_type {
            MediaType::Html => crate::extract::page_title(&body),
            MediaType::PlainText => None,
        };

        Ok(FetchedPage::ok(
            url,
            body,
            PageContentType::Static,
            media_type,
            start.elapsed(),
        )
        .with_title(title)
        .with_http_status(status.as_u16()))
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchedPage {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.get(url, start)).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) if e.is_timeout() => {
                FetchedPage::failed(url, FetchStatus::Timeout, None, start.elapsed())
            }
            Ok(Err(e)) => FetchedPage::failed(
                url,
                FetchStatus::Error(e.to_string()),
                e.status().map(|s| s.as_u16()),
                start.elapsed(),
            ),
            Err(_) => FetchedPage::failed(url, FetchStatus::Timeout, None, start.elapsed()),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Per-batch fetch limits
#[derive(Debug, Clone, Copy)]
pub struct FetchPlan {
    /// Maximum simultaneous fetches
    pub concurrency: usize,
    /// Timeout for each static attempt
    pub timeout: Duration,
    /// Pages not finished by this instant are abandoned
    pub deadline: Instant,
}

/// Fetcher combining static fetches, retry, rate limiting and rendering escalation
pub struct ContentFetcher {
    static_fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageFetcher>>,
    limiter: HostRateLimiter,
    attempts: u32,
    backoff: Duration,
    render_threshold_chars: usize,
    render_timeout: Duration,
}

impl ContentFetcher {
    /// Create a fetcher from configuration
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let static_fetcher: Arc<dyn PageFetcher> =
            Arc::new(StaticFetcher::new(&config.user_agent)?);

        let renderer: Option<Arc<dyn PageFetcher>> =
            if config.js_rendering && is_js_rendering_available() {
                Some(Arc::new(RenderedFetcher::new(RendererConfig {
                    render_wait_ms: config.js_render_wait_ms,
                    sandbox: !config.js_no_sandbox,
                })))
            } else {
                None
            };

        Ok(Self {
            static_fetcher,
            renderer,
            limiter: HostRateLimiter::new(config.rate_limit_per_host),
            attempts: config.attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            render_threshold_chars: config.render_threshold_chars,
            render_timeout: Duration::from_millis(config.js_page_load_timeout_ms),
        })
    }

    /// Replace the rendering fetcher (or disable rendering with `None`)
    pub fn with_renderer(mut self, renderer: Option<Arc<dyn PageFetcher>>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Whether rendered escalation is possible
    pub fn can_render(&self) -> bool {
        self.renderer.is_some()
    }

    /// Shut down the renderer, if one was started
    pub async fn close(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.close().await;
        }
    }

    /// Fetch one URL, retrying transient failures and escalating to the
    /// renderer when the static HTML looks empty
    pub async fn fetch(&self, url: &str, timeout: Duration) -> FetchedPage {
        let start = Instant::now();

        let host = match check_fetchable(url) {
            Ok(host) => host,
            Err(reason) => {
                debug!("Not fetching {}: {}", url, reason);
                return FetchedPage::failed(url, FetchStatus::Error(reason), None, start.elapsed());
            }
        };

        let mut attempt = 1;
        let page = loop {
            self.limiter.wait(&host).await;
            let page = self.static_fetcher.fetch(url, timeout).await;

            if page.is_ok() || !page.is_transient_failure() || attempt >= self.attempts {
                break page;
            }

            debug!(
                "Fetch attempt {}/{} for {} failed ({}), retrying",
                attempt, self.attempts, url, page.status
            );
            tokio::time::sleep(self.backoff * attempt).await;
            attempt += 1;
        };

        if !page.is_ok() || page.media_type != MediaType::Html {
            return page;
        }

        let Some(renderer) = &self.renderer else {
            return page;
        };

        if !needs_rendering(page.raw_content(), self.render_threshold_chars) {
            return page;
        }

        info!("Static HTML looks empty, rendering {}", url);
        let rendered = renderer.fetch(url, self.render_timeout).await;
        if rendered.is_ok() {
            let title = rendered.title.clone().or_else(|| page.title.clone());
            rendered.with_title(title)
        } else {
            warn!(
                "Rendering failed for {} ({}), using static content",
                url, rendered.status
            );
            page
        }
    }

    /// Fetch all URLs with bounded concurrency.
    ///
    /// Returns one page per input URL, in input order. Fetches still running
    /// at the deadline are abandoned and reported as timeouts.
    pub async fn fetch_all(&self, urls: &[String], plan: &FetchPlan) -> Vec<FetchedPage> {
        let start = Instant::now();
        let mut pending = stream::iter(urls.iter().enumerate())
            .map(|(i, url)| async move { (i, self.fetch(url, plan.timeout).await) })
            .buffer_unordered(plan.concurrency.max(1));

        let mut slots: Vec<Option<FetchedPage>> = vec![None; urls.len()];
        loop {
            match tokio::time::timeout_at(plan.deadline, pending.next()).await {
                Ok(Some((i, page))) => {
                    debug!("Fetched {} ({}) in {:?}", page.url, page.status, page.elapsed);
                    slots[i] = Some(page);
                }
                Ok(None) => break,
                Err(_) => {
                    let done = slots.iter().filter(|s| s.is_some()).count();
                    warn!(
                        "Fetch deadline reached with {}/{} pages complete",
                        done,
                        urls.len()
                    );
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| {
                    FetchedPage::failed(url, FetchStatus::Timeout, None, start.elapsed())
                })
            })
            .collect()
    }
}

/// Top-level MIME types that never carry extractable text
const NON_TEXT_TYPES: &[&str] = &["image", "audio", "video", "font"];

/// `application/*` subtypes that are binary or archive formats
const NON_TEXT_APPLICATION_SUBTYPES: &[&str] = &[
    "zip",
    "gzip",
    "x-gzip",
    "x-tar",
    "x-bzip2",
    "x-7z-compressed",
    "x-rar-compressed",
    "vnd.rar",
    "octet-stream",
    "x-msdownload",
    "pdf",
    "wasm",
];

/// Check that a URL is worth fetching, returning its host
fn check_fetchable(url: &str) -> std::result::Result<String, String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid URL: {}", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {}", parsed.scheme()));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| "URL has no host".to_string())?
        .to_string();

    if let Some(mime) = mime_guess::from_path(parsed.path()).first() {
        let top = mime.type_().as_str();
        let sub = mime.subtype().as_str();
        if NON_TEXT_TYPES.contains(&top)
            || (top == "application" && NON_TEXT_APPLICATION_SUBTYPES.contains(&sub))
        {
            return Err(format!("non-text resource ({})", mime));
        }
    }

    Ok(host)
}
