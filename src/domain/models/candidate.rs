//! Candidate solutions collected during search and the final selection
//! outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::instance::ComponentInstance;

/// A fully concrete configuration reached during phase 1, together with the
/// score the search-time evaluator assigned to it and the wall-clock cost of
/// computing that score. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub instance: ComponentInstance,
    /// In-search score; lower is better.
    pub score: f64,
    /// Wall-clock time spent evaluating the candidate during search.
    pub evaluation_time_ms: u64,
    pub found_at: DateTime<Utc>,
}

impl CandidateRecord {
    pub fn new(instance: ComponentInstance, score: f64, evaluation_time_ms: u64) -> Self {
        Self { instance, score, evaluation_time_ms, found_at: Utc::now() }
    }
}

/// The configuration the engine finally commits to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedSolution {
    pub instance: ComponentInstance,
    /// Score backing the selection: the phase-2 re-evaluation when one
    /// succeeded, otherwise the phase-1 in-search score.
    pub score: f64,
    /// In-search score from phase 1, kept for comparison.
    pub search_score: f64,
    /// Whether the score stems from a successful phase-2 re-evaluation.
    pub revalidated: bool,
}

/// Lifecycle of the two-phase engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Created,
    Searching,
    Selecting,
    Done,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Searching => write!(f, "searching"),
            Self::Selecting => write!(f, "selecting"),
            Self::Done => write!(f, "done"),
        }
    }
}
