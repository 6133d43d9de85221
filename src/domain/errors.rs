//! Error taxonomy of the configuration search engine.
//!
//! Configuration problems fail fast before any search starts. Evaluation
//! failures are recovered locally and never abort a run. Exhaustion and
//! timeout are explicit, reportable outcomes; cancellation is a clean
//! terminal state rather than an error.

use thiserror::Error;

/// Errors surfaced by the engine to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Component repository error: {0}")]
    InvalidRepository(String),

    #[error("No component provides the requested interface '{0}'")]
    UnresolvableInterface(String),

    #[error("Search space exhausted without reaching a goal configuration")]
    NoSolutionFound,

    #[error("Deadline exceeded with no usable candidate ({elapsed_ms}ms elapsed of {budget_ms}ms budget)")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },

    #[error("Engine was cancelled")]
    Cancelled,

    #[error("Engine is in state '{0}' and cannot be (re)started")]
    NotRestartable(String),

    #[error("Internal engine failure: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of a single node or candidate evaluation. These are contained:
/// the surrounding search treats them as "no opinion" or excludes the
/// candidate, except for `Cancelled`, which always propagates.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Objective failed: {0}")]
    Objective(String),

    #[error("Evaluation timed out after {0}ms")]
    TimedOut(u64),

    #[error("Evaluation was cancelled")]
    Cancelled,
}

impl EvaluationError {
    /// Whether the error must propagate instead of degrading to a worst
    /// score. Only external cancellation is hard.
    pub fn is_hard(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<anyhow::Error> for EvaluationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Objective(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cancellation_is_hard() {
        assert!(EvaluationError::Cancelled.is_hard());
        assert!(!EvaluationError::TimedOut(100).is_hard());
        assert!(!EvaluationError::Objective("boom".into()).is_hard());
    }
}
