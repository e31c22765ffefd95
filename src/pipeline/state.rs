//! Run states and the forward-only transition tracker

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Stage of a pipeline run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Received,
    Searching,
    Fetching,
    Extracting,
    Embedding,
    Indexing,
    Retrieving,
    Synthesizing,
    Completed,
    Failed,
}

impl RunState {
    /// Failures in this stage reduce the number of sources instead of
    /// aborting the run
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            RunState::Searching | RunState::Fetching | RunState::Extracting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Received => "received",
            RunState::Searching => "searching",
            RunState::Fetching => "fetching",
            RunState::Extracting => "extracting",
            RunState::Embedding => "embedding",
            RunState::Indexing => "indexing",
            RunState::Retrieving => "retrieving",
            RunState::Synthesizing => "synthesizing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state of one run. Moves are strictly forward; any
/// non-terminal state may move to `Failed`.
#[derive(Debug)]
pub struct StateTracker {
    current: RunState,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            current: RunState::Received,
        }
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if self.current.is_terminal() || next <= self.current {
            return Err(Error::Other(format!(
                "invalid run transition {} -> {}",
                self.current, next
            )));
        }
        debug!("Run state {} -> {}", self.current, next);
        self.current = next;
        Ok(())
    }

    /// Move to `Failed`, returning the stage that failed
    pub fn fail(&mut self) -> RunState {
        let failed_at = self.current;
        if !self.current.is_terminal() {
            self.current = RunState::Failed;
        }
        failed_at
    }
}
