//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - Local FastEmbed backend (feature `local-embed`)
//! - HTTP embedding backend (Ollama or OpenAI-compatible)
//! - A run-scoped generator that batches and validates vectors

#[cfg(feature = "local-embed")]
mod fastembed_impl;
mod http_backend;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;
pub use http_backend::*;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Output dimension of well-known embedding models
pub fn known_model_dimension(model: &str) -> Option<usize> {
    match model {
        "sentence-transformers/all-MiniLM-L6-v2"
        | "all-MiniLM-L6-v2"
        | "all-minilm"
        | "sentence-transformers/all-MiniLM-L12-v2"
        | "BAAI/bge-small-en-v1.5" => Some(384),
        "BAAI/bge-base-en-v1.5" | "nomic-ai/nomic-embed-text-v1.5" | "nomic-embed-text" => {
            Some(768)
        }
        "BAAI/bge-large-en-v1.5" | "mxbai-embed-large" => Some(1024),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend {
        #[cfg(feature = "local-embed")]
        EmbeddingBackend::Local => Ok(Arc::new(FastEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embed"))]
        EmbeddingBackend::Local => Err(Error::Config(
            "Local embeddings need the 'local-embed' feature; set embedding.backend = \"http\""
                .to_string(),
        )),
        EmbeddingBackend::Http => Ok(Arc::new(HttpEmbedder::new(config)?)),
    }
}

/// Embeds passages and queries for one pipeline run with a single model.
///
/// Every vector is checked against the declared dimension, so a run can
/// never mix vectors from different embedding spaces.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingGenerator {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Create a generator for the configured backend
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let embedder = create_embedder(config)?;
        if embedder.dimension() != config.dimension {
            return Err(Error::EmbeddingDimensionMismatch {
                expected: config.dimension,
                actual: embedder.dimension(),
            });
        }
        Ok(Self::new(embedder, config.batch_size))
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Reject a per-request model that differs from the loaded one
    pub fn ensure_model(&self, requested: Option<&str>) -> Result<()> {
        match requested {
            Some(model) if model != self.model_id() => Err(Error::Config(format!(
                "Requested embedding model '{}' but '{}' is loaded; passages and queries must share one model",
                model,
                self.model_id()
            ))),
            _ => Ok(()),
        }
    }

    /// Embed texts in order, one vector per input
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.embedder.embed(chunk.to_vec()).await?;
            if embeddings.len() != chunk.len() {
                return Err(Error::Embedding(format!(
                    "Model '{}' returned {} vectors for {} inputs",
                    self.model_id(),
                    embeddings.len(),
                    chunk.len()
                )));
            }
            self.validate_dimensions(&embeddings)?;
            all_embeddings.extend(embeddings);
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model_id());
        Ok(all_embeddings)
    }

    /// Embed a single query
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("No vector returned for query".to_string()))
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        let expected = self.dimension();
        match embeddings.iter().find(|v| v.len() != expected) {
            Some(mismatch) => Err(Error::EmbeddingDimensionMismatch {
                expected,
                actual: mismatch.len(),
            }),
            None => Ok(()),
        }
    }
}
