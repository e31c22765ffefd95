//! SearXNG JSON search provider

use super::{status_error, RawHit, SearchProvider};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Queries a SearXNG instance with `format=json` enabled
pub struct SearxngProvider {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

impl SearxngProvider {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            base_url: Url::parse(&format!("{}/", trimmed))?,
        })
    }
}

#[async_trait]
impl SearchProvider for SearxngProvider {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<RawHit>> {
        let url = self.base_url.join("search")?;
        debug!("SearXNG search at {}: {}", url, query);

        let response = self
            .client
            .get(url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("SearXNG", status));
        }

        let body: SearxngResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .map(|r| RawHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "searxng"
    }
}
