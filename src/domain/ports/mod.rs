//! Collaborator interfaces the engine depends on but does not implement.

use async_trait::async_trait;

use crate::domain::errors::EvaluationError;
use crate::domain::models::ComponentInstance;

/// External objective function: score a fully concrete configuration.
///
/// Used both as the search-time benchmark (phase 1, typically cheap) and the
/// selection-time benchmark (phase 2, typically rigorous). Lower scores are
/// better. Implementations should be cancellation-safe: the engine may drop
/// the future when a deadline fires.
#[async_trait]
pub trait ObjectiveEvaluator: Send + Sync {
    async fn evaluate(&self, instance: &ComponentInstance) -> Result<f64, EvaluationError>;
}

/// Adapter turning a plain closure into an [`ObjectiveEvaluator`]. Handy for
/// analytic objectives and tests.
pub struct FnObjective<F>
where
    F: Fn(&ComponentInstance) -> Result<f64, EvaluationError> + Send + Sync,
{
    f: F,
}

impl<F> FnObjective<F>
where
    F: Fn(&ComponentInstance) -> Result<f64, EvaluationError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ObjectiveEvaluator for FnObjective<F>
where
    F: Fn(&ComponentInstance) -> Result<f64, EvaluationError> + Send + Sync,
{
    async fn evaluate(&self, instance: &ComponentInstance) -> Result<f64, EvaluationError> {
        (self.f)(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_objective_delegates_to_closure() {
        let objective = FnObjective::new(|_| Ok(42.0));
        let instance = ComponentInstance::new("anything");
        let score = objective.evaluate(&instance).await.unwrap();
        assert!((score - 42.0).abs() < f64::EPSILON);
    }
}
