//! JSON snapshot format for a vector index
//!
//! Library-only: neither the CLI nor `Pipeline` writes or reads snapshots.
//! Callers that build a `VectorIndex` themselves can persist it with
//! `IndexSnapshot::capture` and `save`, and restore it with `load` and
//! `into_index`.

use super::{EmbeddedPassage, VectorIndex};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Serialized index contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub embedding_model_id: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<EmbeddedPassage>,
}

impl IndexSnapshot {
    /// Capture the current contents of an index
    pub fn capture(index: &VectorIndex, embedding_model_id: &str) -> Self {
        Self {
            embedding_model_id: embedding_model_id.to_string(),
            dimension: index.dimension().unwrap_or(0),
            created_at: Utc::now(),
            entries: index
                .entries()
                .iter()
                .map(|e| EmbeddedPassage {
                    passage: e.passage.clone(),
                    vector: e.vector.clone(),
                })
                .collect(),
        }
    }

    /// Write the snapshot as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        info!("Saved index snapshot ({} entries) to {:?}", self.entries.len(), path);
        Ok(())
    }

    /// Read a snapshot, rejecting one built with a different embedding model
    pub fn load(path: &Path, expected_model_id: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&content)?;

        if snapshot.embedding_model_id != expected_model_id {
            return Err(Error::StaleIndex {
                expected: expected_model_id.to_string(),
                found: snapshot.embedding_model_id,
            });
        }
        Ok(snapshot)
    }

    /// Rebuild an index; entry ids follow snapshot order
    pub fn into_index(self) -> Result<VectorIndex> {
        let mut index = if self.dimension > 0 {
            VectorIndex::with_dimension(self.dimension)
        } else {
            VectorIndex::new()
        };
        index.insert(self.entries)?;
        Ok(index)
    }
}
