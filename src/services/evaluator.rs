//! Composable node evaluators.
//!
//! An evaluator assigns a desirability to a partial search node; lower is
//! better. `Ok` with no score means "no opinion, treat as worst" and never
//! aborts the search. External cancellation always surfaces as
//! `EvaluationError::Cancelled`; a self-imposed deadline instead routes to
//! the configured fallback. Keeping those two apart is what lets the search
//! shut down promptly while individual slow evaluations degrade gracefully.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::{EngineError, EngineResult, EvaluationError};
use crate::services::expansion::SearchNode;

/// Outcome of one node evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Evaluation {
    /// Desirability; `None` is "no opinion" and ranks worst.
    pub score: Option<f64>,
    /// Optional dispersion annotation (e.g. rollout score spread). Exposed
    /// for observers; the search driver does not require it.
    pub uncertainty: Option<f64>,
}

impl Evaluation {
    pub fn scored(score: f64) -> Self {
        Self { score: Some(score), uncertainty: None }
    }

    pub fn no_opinion() -> Self {
        Self::default()
    }
}

/// Common contract of every evaluator in the stack.
#[async_trait]
pub trait NodeEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        node: &Arc<SearchNode>,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, EvaluationError>;
}

/// Wraps an evaluator with a per-node time budget, clipped against an
/// optional global deadline. On self-timeout the fallback answers (default:
/// no opinion); an externally cancelled token always propagates as a hard
/// interruption and never resolves via the fallback.
pub struct TimeAwareEvaluator {
    inner: Arc<dyn NodeEvaluator>,
    budget: Duration,
    fallback: Option<Arc<dyn NodeEvaluator>>,
    global_deadline: Option<Instant>,
}

impl TimeAwareEvaluator {
    pub fn new(inner: Arc<dyn NodeEvaluator>, budget: Duration) -> Self {
        Self { inner, budget, fallback: None, global_deadline: None }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn NodeEvaluator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_global_deadline(mut self, deadline: Instant) -> Self {
        self.global_deadline = Some(deadline);
        self
    }

    fn effective_budget(&self) -> Duration {
        match self.global_deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.budget.min(remaining)
            }
            None => self.budget,
        }
    }
}

#[async_trait]
impl NodeEvaluator for TimeAwareEvaluator {
    async fn evaluate(
        &self,
        node: &Arc<SearchNode>,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, EvaluationError> {
        let budget = self.effective_budget();
        tokio::select! {
            result = self.inner.evaluate(node, cancel) => result,
            () = cancel.cancelled() => Err(EvaluationError::Cancelled),
            () = tokio::time::sleep(budget) => {
                debug!(budget_ms = budget.as_millis() as u64, "node evaluation hit its budget, using fallback");
                match &self.fallback {
                    Some(fallback) => fallback.evaluate(node, cancel).await,
                    None => Ok(Evaluation::no_opinion()),
                }
            }
        }
    }
}

/// Primary/secondary composition: the secondary only answers when the
/// primary has no opinion. Lets a cheap heuristic short-circuit an expensive
/// randomized one.
pub struct AlternativeEvaluator {
    primary: Arc<dyn NodeEvaluator>,
    secondary: Arc<dyn NodeEvaluator>,
}

impl AlternativeEvaluator {
    pub fn new(primary: Arc<dyn NodeEvaluator>, secondary: Arc<dyn NodeEvaluator>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl NodeEvaluator for AlternativeEvaluator {
    async fn evaluate(
        &self,
        node: &Arc<SearchNode>,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, EvaluationError> {
        let first = self.primary.evaluate(node, cancel).await?;
        if first.score.is_some() {
            return Ok(first);
        }
        self.secondary.evaluate(node, cancel).await
    }
}

/// Weighted sum of sub-evaluators. A single no-opinion sub-score
/// short-circuits the whole combination to no opinion: one disqualifying
/// judgment disqualifies the node.
pub struct LinearCombinationEvaluator {
    weighted: Vec<(f64, Arc<dyn NodeEvaluator>)>,
}

impl LinearCombinationEvaluator {
    /// Fails fast on non-finite weights or an empty combination.
    pub fn new(weighted: Vec<(f64, Arc<dyn NodeEvaluator>)>) -> EngineResult<Self> {
        if weighted.is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "linear combination requires at least one evaluator".into(),
            ));
        }
        for (weight, _) in &weighted {
            if !weight.is_finite() {
                return Err(EngineError::InvalidConfiguration(format!(
                    "linear combination weight must be finite, got {weight}"
                )));
            }
        }
        Ok(Self { weighted })
    }
}

#[async_trait]
impl NodeEvaluator for LinearCombinationEvaluator {
    async fn evaluate(
        &self,
        node: &Arc<SearchNode>,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, EvaluationError> {
        let mut total = 0.0;
        for (weight, evaluator) in &self.weighted {
            let part = evaluator.evaluate(node, cancel).await?;
            match part.score {
                Some(score) => total += weight * score,
                None => return Ok(Evaluation::no_opinion()),
            }
        }
        Ok(Evaluation::scored(total))
    }
}

/// Evaluator built from a plain closure; used for cheap heuristics and in
/// tests.
pub struct FnEvaluator<F>
where
    F: Fn(&Arc<SearchNode>) -> Result<Evaluation, EvaluationError> + Send + Sync,
{
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&Arc<SearchNode>) -> Result<Evaluation, EvaluationError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> NodeEvaluator for FnEvaluator<F>
where
    F: Fn(&Arc<SearchNode>) -> Result<Evaluation, EvaluationError> + Send + Sync,
{
    async fn evaluate(
        &self,
        node: &Arc<SearchNode>,
        _cancel: &CancellationToken,
    ) -> Result<Evaluation, EvaluationError> {
        (self.f)(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::expansion::ConfigurationState;
    use crate::domain::models::ComponentInstance;
    use std::collections::VecDeque;

    fn dummy_node() -> Arc<SearchNode> {
        SearchNode::root(ConfigurationState {
            root: ComponentInstance::new("c"),
            agenda: VecDeque::new(),
        })
    }

    /// Evaluator that sleeps before answering, to exercise budgets.
    struct SlowEvaluator {
        delay: Duration,
        score: f64,
    }

    #[async_trait]
    impl NodeEvaluator for SlowEvaluator {
        async fn evaluate(
            &self,
            _node: &Arc<SearchNode>,
            cancel: &CancellationToken,
        ) -> Result<Evaluation, EvaluationError> {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => Ok(Evaluation::scored(self.score)),
                () = cancel.cancelled() => Err(EvaluationError::Cancelled),
            }
        }
    }

    #[tokio::test]
    async fn time_aware_passes_through_fast_results() {
        let inner = Arc::new(SlowEvaluator { delay: Duration::from_millis(5), score: 1.5 });
        let evaluator = TimeAwareEvaluator::new(inner, Duration::from_secs(5));
        let result = evaluator.evaluate(&dummy_node(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.score, Some(1.5));
    }

    #[tokio::test]
    async fn time_aware_falls_back_on_self_timeout() {
        let inner = Arc::new(SlowEvaluator { delay: Duration::from_secs(60), score: 1.0 });
        let fallback = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(9.0))));
        let evaluator =
            TimeAwareEvaluator::new(inner, Duration::from_millis(20)).with_fallback(fallback);
        let result = evaluator.evaluate(&dummy_node(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.score, Some(9.0));
    }

    #[tokio::test]
    async fn time_aware_default_fallback_is_no_opinion() {
        let inner = Arc::new(SlowEvaluator { delay: Duration::from_secs(60), score: 1.0 });
        let evaluator = TimeAwareEvaluator::new(inner, Duration::from_millis(20));
        let result = evaluator.evaluate(&dummy_node(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.score, None);
    }

    #[tokio::test]
    async fn external_cancellation_propagates_not_falls_back() {
        let inner = Arc::new(SlowEvaluator { delay: Duration::from_secs(60), score: 1.0 });
        let fallback = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(9.0))));
        let evaluator =
            TimeAwareEvaluator::new(inner, Duration::from_secs(60)).with_fallback(fallback);
        let token = CancellationToken::new();
        let cancel_after = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_after.cancel();
        });
        let result = evaluator.evaluate(&dummy_node(), &token).await;
        assert!(matches!(result, Err(EvaluationError::Cancelled)));
    }

    #[tokio::test]
    async fn alternative_prefers_primary_opinion() {
        let primary = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(1.0))));
        let secondary = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(2.0))));
        let evaluator = AlternativeEvaluator::new(primary, secondary);
        let result = evaluator.evaluate(&dummy_node(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.score, Some(1.0));
    }

    #[tokio::test]
    async fn alternative_consults_secondary_when_primary_abstains() {
        let primary = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::no_opinion())));
        let secondary = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(2.0))));
        let evaluator = AlternativeEvaluator::new(primary, secondary);
        let result = evaluator.evaluate(&dummy_node(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.score, Some(2.0));
    }

    #[tokio::test]
    async fn linear_combination_sums_weighted_scores() {
        let a: Arc<dyn NodeEvaluator> = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(2.0))));
        let b: Arc<dyn NodeEvaluator> = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(3.0))));
        let evaluator = LinearCombinationEvaluator::new(vec![(0.5, a), (2.0, b)]).unwrap();
        let result = evaluator.evaluate(&dummy_node(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.score, Some(7.0));
    }

    #[tokio::test]
    async fn linear_combination_short_circuits_on_no_opinion() {
        let a: Arc<dyn NodeEvaluator> = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(2.0))));
        let b: Arc<dyn NodeEvaluator> = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::no_opinion())));
        let evaluator = LinearCombinationEvaluator::new(vec![(1.0, a), (1.0, b)]).unwrap();
        let result = evaluator.evaluate(&dummy_node(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.score, None);
    }

    #[test]
    fn linear_combination_rejects_bad_weights() {
        let a: Arc<dyn NodeEvaluator> = Arc::new(FnEvaluator::new(|_| Ok(Evaluation::scored(2.0))));
        assert!(LinearCombinationEvaluator::new(vec![(f64::NAN, a)]).is_err());
        assert!(LinearCombinationEvaluator::new(vec![]).is_err());
    }
}
