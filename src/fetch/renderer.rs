//! Headless browser fetching for script-rendered pages
//!
//! Uses Chrome DevTools Protocol via chromiumoxide to load pages whose
//! content only appears after JavaScript runs.

use super::{FetchStatus, FetchedPage, PageFetcher};
use async_trait::async_trait;
use std::time::Duration;

/// Configuration for the headless browser
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Time to wait after navigation for dynamic content (milliseconds)
    pub render_wait_ms: u64,
    /// Enable sandbox (disable for Docker/CI environments)
    pub sandbox: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            render_wait_ms: 2000,
            sandbox: true,
        }
    }
}

#[cfg(feature = "js-rendering")]
mod browser_impl {
    use super::*;
    use crate::fetch::{MediaType, PageContentType};
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio::time::{timeout, Instant};
    use tracing::{debug, info, warn};

    /// Page fetcher backed by a lazily launched headless Chrome
    pub struct RenderedFetcher {
        config: RendererConfig,
        browser: Arc<Mutex<Option<Browser>>>,
        handler_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    }

    impl RenderedFetcher {
        pub fn new(config: RendererConfig) -> Self {
            Self {
                config,
                browser: Arc::new(Mutex::new(None)),
                handler_handle: Arc::new(Mutex::new(None)),
            }
        }

        async fn ensure_browser(&self) -> std::result::Result<(), String> {
            let mut browser_guard = self.browser.lock().await;
            if browser_guard.is_some() {
                return Ok(());
            }

            info!("Launching headless Chrome browser...");

            let mut builder = BrowserConfig::builder();
            if !self.config.sandbox {
                builder = builder.no_sandbox();
            }
            builder = builder
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--disable-extensions");

            let browser_config = builder
                .build()
                .map_err(|e| format!("Failed to build browser config: {}", e))?;

            let (browser, mut handler) = Browser::launch(browser_config)
                .await
                .map_err(|e| format!("Failed to launch browser: {}", e))?;

            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            *browser_guard = Some(browser);
            *self.handler_handle.lock().await = Some(handle);
            Ok(())
        }

        async fn render(
            &self,
            url: &str,
            load_timeout: Duration,
        ) -> std::result::Result<(String, Option<String>), String> {
            self.ensure_browser().await?;

            let browser_guard = self.browser.lock().await;
            let browser = browser_guard
                .as_ref()
                .ok_or_else(|| "Browser not initialized".to_string())?;

            let page = browser
                .new_page(url)
                .await
                .map_err(|e| format!("Failed to open page: {}", e))?;

            timeout(load_timeout, page.wait_for_navigation())
                .await
                .map_err(|_| "timeout".to_string())?
                .map_err(|e| format!("Navigation failed: {}", e))?;

            if self.config.render_wait_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.render_wait_ms)).await;
            }

            let html = page
                .content()
                .await
                .map_err(|e| format!("Failed to read content: {}", e))?;

            let title = page
                .evaluate("document.title")
                .await
                .ok()
                .and_then(|v| v.into_value::<String>().ok())
                .filter(|t| !t.trim().is_empty());

            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }

            Ok((html, title))
        }
    }

    #[async_trait]
    impl PageFetcher for RenderedFetcher {
        async fn fetch(&self, url: &str, timeout: Duration) -> FetchedPage {
            let start = Instant::now();
            debug!("Rendering {}", url);

            match self.render(url, timeout).await {
                Ok((html, title)) => {
                    debug!("Rendered {} in {:?}", url, start.elapsed());
                    FetchedPage::ok(
                        url,
                        html,
                        PageContentType::Rendered,
                        MediaType::Html,
                        start.elapsed(),
                    )
                    .with_title(title)
                }
                Err(reason) if reason == "timeout" => {
                    FetchedPage::failed(url, FetchStatus::Timeout, None, start.elapsed())
                }
                Err(reason) => {
                    FetchedPage::failed(url, FetchStatus::Error(reason), None, start.elapsed())
                }
            }
        }

        fn name(&self) -> &str {
            "rendered"
        }

        async fn close(&self) {
            let mut browser_guard = self.browser.lock().await;
            if let Some(mut browser) = browser_guard.take() {
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser: {}", e);
                }
            }
            if let Some(handle) = self.handler_handle.lock().await.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(feature = "js-rendering")]
pub use browser_impl::RenderedFetcher;

/// Stand-in used when the `js-rendering` feature is disabled
#[cfg(not(feature = "js-rendering"))]
pub struct RenderedFetcher {
    _config: RendererConfig,
}

#[cfg(not(feature = "js-rendering"))]
impl RenderedFetcher {
    pub fn new(config: RendererConfig) -> Self {
        Self { _config: config }
    }
}

#[cfg(not(feature = "js-rendering"))]
#[async_trait]
impl PageFetcher for RenderedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> FetchedPage {
        FetchedPage::failed(
            url,
            FetchStatus::Error(
                "JavaScript rendering not available; build with --features js-rendering"
                    .to_string(),
            ),
            None,
            Duration::ZERO,
        )
    }

    fn name(&self) -> &str {
        "rendered (disabled)"
    }
}

/// Whether this build can render pages with a headless browser
pub fn is_js_rendering_available() -> bool {
    cfg!(feature = "js-rendering")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_config_default() {
        let config = RendererConfig::default();
        assert!(config.sandbox);
        assert_eq!(config.render_wait_ms, 2000);
    }

    #[cfg(not(feature = "js-rendering"))]
    #[tokio::test]
    async fn test_disabled_renderer_reports_failure() {
        let fetcher = RenderedFetcher::new(RendererConfig::default());
        let page = fetcher
            .fetch("https://example.com/app", Duration::from_secs(1))
            .await;
        assert!(!page.is_ok());
        assert!(page.raw_content().is_empty());
        assert!(!is_js_rendering_available());
    }
}
