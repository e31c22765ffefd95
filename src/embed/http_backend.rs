//! HTTP embedding backend (Ollama `/api/embed` or OpenAI-compatible `/v1/embeddings`)

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingData> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Vectors { vectors } => vectors,
            EmbeddingResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// Embedder that calls a remote embedding service
pub struct HttpEmbedder {
    client: Client,
    url: Url,
    model_id: String,
    dimension: usize,
    retries: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: embed_url(&config.endpoint)?,
            model_id: config.model.clone(),
            dimension: config.dimension,
            retries: config.retries,
        })
    }

    async fn send_with_retry(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        let body = EmbedRequest {
            model: &self.model_id,
            input: texts.to_vec(),
        };

        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            match self.client.post(self.url.clone()).json(&body).send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json::<EmbeddingResponse>().await?),
                    Err(e) => last_err = Some(Error::Embedding(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Embedding(e.to_string())),
            }

            if attempt < self.retries {
                warn!(
                    "Embedding request to {} failed (attempt {}), retrying",
                    self.url,
                    attempt + 1
                );
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("Embedding backend request failed".to_string())))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts via {}", texts.len(), self.url);
        let response = self.send_with_retry(&texts).await?;
        Ok(response.into_embeddings())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// Resolve the embedding endpoint from a base URL.
///
/// Full endpoint URLs are used as-is; an OpenAI-style `/v1` base gets
/// `/embeddings`, anything else is treated as an Ollama server.
pub fn embed_url(base: &str) -> Result<Url> {
    let trimmed = base.trim_end_matches('/');
    let url = Url::parse(trimmed)?;
    let path = url.path();

    let full = if path.ends_with("/embed") || path.ends_with("/embeddings") {
        trimmed.to_string()
    } else if path.ends_with("/v1") {
        format!("{}/embeddings", trimmed)
    } else {
        format!("{}/api/embed", trimmed)
    };

    Url::parse(&full).map_err(|e| Error::Config(format!("Invalid embedding endpoint: {}", e)))
}
