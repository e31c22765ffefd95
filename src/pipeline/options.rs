//! Per-request options

use crate::config::Config;
use std::time::Duration;

/// Overrides for a single `answer` call. Unset fields fall back to the
/// pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    /// Search results to fetch
    pub max_results: Option<usize>,
    /// Timeout for each page fetch attempt
    pub fetch_timeout: Option<Duration>,
    /// Simultaneous page fetches
    pub fetch_concurrency: Option<usize>,
    /// Passages retrieved from the index
    pub top_k: Option<usize>,
    /// Passage characters allowed in the prompt
    pub max_context_chars: Option<usize>,
    /// Must match the loaded embedding model when set
    pub embedding_model_id: Option<String>,
    /// Generation model for this call
    pub generation_model_id: Option<String>,
    /// Passages indexed for this call
    pub max_passages: Option<usize>,
    /// End-to-end deadline
    pub deadline: Option<Duration>,
    /// Minimum similarity for a retrieved passage to reach the prompt
    pub min_score: Option<f32>,
}

impl AnswerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = Some(concurrency);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_max_context_chars(mut self, max_chars: usize) -> Self {
        self.max_context_chars = Some(max_chars);
        self
    }

    pub fn with_embedding_model_id(mut self, model: impl Into<String>) -> Self {
        self.embedding_model_id = Some(model.into());
        self
    }

    pub fn with_generation_model_id(mut self, model: impl Into<String>) -> Self {
        self.generation_model_id = Some(model.into());
        self
    }

    pub fn with_max_passages(mut self, max_passages: usize) -> Self {
        self.max_passages = Some(max_passages);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Fill unset fields from `config`
    pub fn resolve(&self, config: &Config) -> RunSettings {
        RunSettings {
            max_results: self.max_results.unwrap_or(config.search.max_results),
            fetch_timeout: self
                .fetch_timeout
                .unwrap_or_else(|| Duration::from_secs(config.fetch.timeout_secs)),
            fetch_concurrency: self
                .fetch_concurrency
                .unwrap_or(config.fetch.concurrency)
                .max(1),
            top_k: self.top_k.unwrap_or(config.pipeline.top_k),
            max_context_chars: self
                .max_context_chars
                .unwrap_or(config.pipeline.max_context_chars),
            embedding_model_id: self.embedding_model_id.clone(),
            generation_model_id: self.generation_model_id.clone(),
            max_passages: self.max_passages.unwrap_or(config.pipeline.max_passages),
            deadline: self
                .deadline
                .unwrap_or_else(|| Duration::from_secs(config.pipeline.deadline_secs)),
            gather_share: config.pipeline.gather_share,
            min_score: self.min_score.or(config.pipeline.min_score),
        }
    }
}

/// Fully resolved budgets for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub max_results: usize,
    pub fetch_timeout: Duration,
    pub fetch_concurrency: usize,
    pub top_k: usize,
    pub max_context_chars: usize,
    pub embedding_model_id: Option<String>,
    pub generation_model_id: Option<String>,
    pub max_passages: usize,
    pub deadline: Duration,
    /// Share of `deadline` for searching and fetching
    pub gather_share: f64,
    pub min_score: Option<f32>,
}

impl RunSettings {
    /// Time searching and fetching may take, leaving the rest of the
    /// deadline to the later stages
    pub fn gather_budget(&self) -> Duration {
        self.deadline.mul_f64(self.gather_share.clamp(0.0, 1.0))
    }
}
