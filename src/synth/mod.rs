//! Answer synthesis
//!
//! Selects retrieved passages within the context budget, builds a numbered
//! prompt and asks the generation model for a cited answer.

mod generate;
mod prompt;

pub use generate::*;
pub use prompt::*;

use crate::error::{Error, Result};
use crate::index::ScoredEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One passage that was placed in the prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Number the model uses to cite this source, starting at 1
    pub marker: usize,
    pub source_url: String,
    pub position_index: usize,
    pub score: f32,
}

/// Final answer for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Source URLs whose passages were in the prompt, in marker order
    pub cited_sources: Vec<String>,
    pub citations: Vec<Citation>,
    /// False when the answer was generated without any web passage
    pub grounded: bool,
}

/// Greedy prefix of `retrieved` whose passage text fits in `max_chars`.
///
/// Stops at the first passage that would overflow; nothing is truncated.
pub fn select_context(retrieved: &[ScoredEntry], max_chars: usize) -> Vec<ScoredEntry> {
    let mut used = 0usize;
    let mut selected = Vec::new();

    for entry in retrieved {
        let len = entry.passage.text.chars().count();
        if used + len > max_chars {
            break;
        }
        used += len;
        selected.push(entry.clone());
    }

    debug!(
        "Selected {}/{} passages ({} of {} chars)",
        selected.len(),
        retrieved.len(),
        used,
        max_chars
    );
    selected
}

/// Produces answers with a generation model
#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn Generator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Default generation model
    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub async fn synthesize(
        &self,
        query: &str,
        retrieved: &[ScoredEntry],
        max_context_chars: usize,
        model: Option<&str>,
    ) -> Result<Answer> {
        let selected = select_context(retrieved, max_context_chars);
        let sources = group_sources(&selected);
        let prompt = build_prompt(query, &sources);

        let citations: Vec<Citation> = sources
            .iter()
            .flat_map(|source| {
                source.passages.iter().map(move |entry| Citation {
                    marker: source.marker,
                    source_url: source.url.to_string(),
                    position_index: entry.passage.position_index,
                    score: entry.score,
                })
            })
            .collect();
        let cited_sources: Vec<String> = sources.iter().map(|s| s.url.to_string()).collect();

        info!(
            "Generating answer from {} passages across {} sources",
            selected.len(),
            cited_sources.len()
        );

        let text = self.generator.generate(&prompt, model).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::GenerationUnavailable(
                "model returned an empty completion".to_string(),
            ));
        }

        Ok(Answer {
            text: text.to_string(),
            grounded: !cited_sources.is_empty(),
            cited_sources,
            citations,
        })
    }
}
