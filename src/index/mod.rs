//! In-memory vector index
//!
//! Exhaustive cosine-similarity search over the passages of one run.
//! Results are deterministic: ties are broken by insertion order.

mod snapshot;

pub use snapshot::*;

use crate::error::{Error, Result};
use crate::extract::Passage;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Sequential identifier assigned at insertion, starting from 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub usize);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A passage with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedPassage {
    pub passage: Passage,
    pub vector: Vec<f32>,
}

/// A stored entry
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: EntryId,
    pub passage: Passage,
    pub vector: Vec<f32>,
    norm: f32,
}

/// A query hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub id: EntryId,
    pub passage: Passage,
    pub score: f32,
}

/// Vector index owned by a single pipeline run
#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index that only accepts vectors of `dimension`
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimension: Some(dimension),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension fixed by construction or by the first insert
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Add entries in order. The whole batch is rejected if any vector has
    /// the wrong dimension.
    pub fn insert(&mut self, batch: Vec<EmbeddedPassage>) -> Result<Vec<EntryId>> {
        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };

        let dimension = self.dimension.unwrap_or(first.vector.len());
        if let Some(bad) = batch.iter().find(|e| e.vector.len() != dimension) {
            return Err(Error::EmbeddingDimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }
        self.dimension = Some(dimension);

        self.entries.reserve(batch.len());
        let mut ids = Vec::with_capacity(batch.len());
        for embedded in batch {
            let id = EntryId(self.entries.len());
            let norm = l2_norm(&embedded.vector);
            self.entries.push(IndexEntry {
                id,
                passage: embedded.passage,
                vector: embedded.vector,
                norm,
            });
            ids.push(id);
        }

        debug!("Indexed {} entries (total {})", ids.len(), self.entries.len());
        Ok(ids)
    }

    /// Up to `k` entries by descending cosine similarity, ties by ascending id
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(dimension) = self.dimension {
            if vector.len() != dimension {
                return Err(Error::EmbeddingDimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let query_norm = l2_norm(vector);
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine(vector, query_norm, &entry.vector, entry.norm), entry))
            .collect();

        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score.total_cmp(a_score).then_with(|| a.id.cmp(&b.id))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| ScoredEntry {
                id: entry.id,
                passage: entry.passage.clone(),
                score,
            })
            .collect())
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with precomputed norms; zero-norm vectors score 0
fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / (a_norm * b_norm);
    if score.is_nan() {
        0.0
    } else {
        score
    }
}
