//! webrag - answer questions from live web sources
//!
//! This crate provides:
//! - Web search with result deduplication (DuckDuckGo, SearXNG)
//! - Page fetching with headless-browser escalation for script-rendered pages
//! - Boilerplate-free text extraction and passage segmentation
//! - Embedding, an in-memory vector index and cited answer generation
//! - A pipeline tying the stages together under per-run budgets

pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod pipeline;
pub mod search;
pub mod synth;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{AnswerOptions, Pipeline, RunReport};
pub use synth::Answer;
