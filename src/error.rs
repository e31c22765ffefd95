//! Custom error types for webrag

use crate::pipeline::RunState;
use thiserror::Error;

/// Main error type for webrag operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Search provider unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("No extractable text: {0}")]
    ExtractionEmpty(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("Generation model unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Deadline exceeded while {0}")]
    DeadlineExceeded(RunState),

    #[error("Index was built with embedding model '{found}', expected '{expected}'")]
    StaleIndex { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same request later could succeed.
    ///
    /// Timeouts and unreachable services are retryable; configuration
    /// mismatches are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::SearchUnavailable(_)
            | Error::FetchFailed { .. }
            | Error::Embedding(_)
            | Error::GenerationUnavailable(_)
            | Error::DeadlineExceeded(_)
            | Error::Http(_)
            | Error::Io(_) => true,
            Error::Config(_)
            | Error::InvalidQuery(_)
            | Error::ExtractionEmpty(_)
            | Error::EmbeddingDimensionMismatch { .. }
            | Error::StaleIndex { .. }
            | Error::UrlParse(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::Other(_) => false,
        }
    }

    /// Whether this error aborts a run when raised during `stage`.
    pub fn is_fatal_in(&self, stage: RunState) -> bool {
        match self {
            Error::SearchUnavailable(_) | Error::FetchFailed { .. } | Error::ExtractionEmpty(_) => {
                false
            }
            _ => !stage.is_degradable(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for webrag
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::GenerationUnavailable("timeout".to_string()).is_retryable());
        assert!(Error::DeadlineExceeded(RunState::Synthesizing).is_retryable());
        assert!(!Error::EmbeddingDimensionMismatch {
            expected: 384,
            actual: 768
        }
        .is_retryable());
        assert!(!Error::Config("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_fatality_depends_on_stage() {
        let deadline = Error::DeadlineExceeded(RunState::Fetching);
        assert!(!deadline.is_fatal_in(RunState::Fetching));
        assert!(deadline.is_fatal_in(RunState::Synthesizing));

        let search = Error::SearchUnavailable("dns".to_string());
        assert!(!search.is_fatal_in(RunState::Searching));

        let mismatch = Error::EmbeddingDimensionMismatch {
            expected: 3,
            actual: 4,
        };
        assert!(mismatch.is_fatal_in(RunState::Embedding));
    }
}
