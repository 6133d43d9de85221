//! Monte-Carlo rollout evaluator.
//!
//! Estimates the quality of a partial configuration by completing it to
//! full configurations with uniformly random legal choices and scoring the
//! completions with the external objective. The best score observed under a
//! node is its desirability and is propagated to all ancestors through a
//! monotone best-known memo.
//!
//! All caches are owned by the evaluator instance and injected nowhere else,
//! so concurrent searches never cross-contaminate. The completion engine is
//! shared across calls for seed continuity and serialized behind a mutex;
//! independent nodes may still be evaluated from different tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::domain::errors::EvaluationError;
use crate::domain::ports::ObjectiveEvaluator;
use crate::services::evaluator::{Evaluation, NodeEvaluator};
use crate::services::expansion::{ConfigurationState, DomainGenerator, SearchNode};

/// Decides whether the step from `parent` to `child` can affect any
/// downstream score. Must be conservative: return `true` whenever in doubt,
/// since a wrong `false` silently reuses a stale parent score.
pub type AffectsScorePredicate = Arc<dyn Fn(&SearchNode, &SearchNode) -> bool + Send + Sync>;

/// Seeded random-descent engine reused across evaluations.
struct CompletionEngine {
    rng: StdRng,
}

impl CompletionEngine {
    fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Complete `state` to a goal by uniformly random choices. Returns
    /// `None` on a dead end or when the deadline passes mid-descent.
    fn complete(
        &mut self,
        generator: &DomainGenerator,
        state: &ConfigurationState,
        deadline: Instant,
    ) -> Option<ConfigurationState> {
        let mut current = state.clone();
        while !current.is_goal() {
            if Instant::now() >= deadline {
                return None;
            }
            let successors = generator.expand(&current);
            if successors.is_empty() {
                return None;
            }
            let pick = self.rng.gen_range(0..successors.len());
            current = successors.into_iter().nth(pick).expect("index within bounds");
        }
        Some(current)
    }
}

/// The Monte-Carlo rollout node evaluator.
pub struct RandomCompletionEvaluator {
    objective: Arc<dyn ObjectiveEvaluator>,
    generator: DomainGenerator,
    /// Successful evaluations required per node.
    samples: usize,
    per_sample_timeout: Duration,
    affects_score: AffectsScorePredicate,
    engine: Mutex<CompletionEngine>,
    /// Canonical configuration key -> objective score. Identical completions
    /// are evaluated at most once.
    completion_scores: RwLock<HashMap<String, f64>>,
    /// Canonical node key -> cached evaluation of that node.
    node_values: RwLock<HashMap<String, Evaluation>>,
    /// Canonical node key -> best rollout score observed under the node.
    best_known: RwLock<HashMap<String, f64>>,
}

impl RandomCompletionEvaluator {
    pub fn new(
        objective: Arc<dyn ObjectiveEvaluator>,
        generator: DomainGenerator,
        samples: usize,
        per_sample_timeout: Duration,
        seed: u64,
    ) -> Self {
        Self {
            objective,
            generator,
            samples: samples.max(1),
            per_sample_timeout,
            affects_score: Arc::new(|_, _| true),
            engine: Mutex::new(CompletionEngine::new(seed)),
            completion_scores: RwLock::new(HashMap::new()),
            node_values: RwLock::new(HashMap::new()),
            best_known: RwLock::new(HashMap::new()),
        }
    }

    /// Inject a domain-specific independence predicate. The default assumes
    /// every step may affect the score.
    pub fn with_affects_score_predicate(mut self, predicate: AffectsScorePredicate) -> Self {
        self.affects_score = predicate;
        self
    }

    /// Best score known to be reachable under the node, if any rollout
    /// through it has been scored.
    pub async fn best_known_score(&self, node: &SearchNode) -> Option<f64> {
        self.best_known.read().await.get(&node.canonical_key()).copied()
    }

    /// Score one completed configuration, going through the cache. `Ok(None)`
    /// means the attempt failed softly (objective error or timeout).
    async fn score_completion(
        &self,
        completion: &ConfigurationState,
        cancel: &CancellationToken,
    ) -> Result<Option<f64>, EvaluationError> {
        let key = completion.root.canonical_key();
        if let Some(cached) = self.completion_scores.read().await.get(&key) {
            trace!(%key, "completion score served from cache");
            return Ok(Some(*cached));
        }
        let outcome = tokio::select! {
            result = self.objective.evaluate(&completion.root) => result,
            () = cancel.cancelled() => return Err(EvaluationError::Cancelled),
            () = tokio::time::sleep(self.per_sample_timeout) => {
                debug!("rollout evaluation timed out after {}ms", self.per_sample_timeout.as_millis());
                return Ok(None);
            }
        };
        match outcome {
            Ok(score) => {
                self.completion_scores.write().await.insert(key, score);
                Ok(Some(score))
            }
            Err(EvaluationError::Cancelled) => Err(EvaluationError::Cancelled),
            Err(err) => {
                debug!(error = %err, "rollout evaluation failed, continuing with remaining samples");
                Ok(None)
            }
        }
    }

    /// Walk the ancestry and record `score` wherever it improves the best
    /// known value, stopping at the first ancestor that already holds an
    /// equal or better one.
    async fn propagate_best_score(&self, node: &Arc<SearchNode>, score: f64) {
        let mut table = self.best_known.write().await;
        for ancestor in node.ancestry() {
            let key = ancestor.canonical_key();
            match table.get(&key) {
                Some(existing) if *existing <= score => break,
                _ => {
                    table.insert(key, score);
                }
            }
        }
    }
}

#[async_trait]
impl NodeEvaluator for RandomCompletionEvaluator {
    async fn evaluate(
        &self,
        node: &Arc<SearchNode>,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, EvaluationError> {
        let node_key = node.canonical_key();
        if let Some(cached) = self.node_values.read().await.get(&node_key) {
            return Ok(*cached);
        }

        // A goal node is its own only completion.
        if node.is_goal() {
            let score = self.score_completion(&node.state, cancel).await?;
            let evaluation = match score {
                Some(s) => {
                    self.propagate_best_score(node, s).await;
                    Evaluation::scored(s)
                }
                None => Evaluation::no_opinion(),
            };
            self.node_values.write().await.insert(node_key, evaluation);
            return Ok(evaluation);
        }

        // Reuse the parent's opinion when the last step provably cannot
        // change any downstream score.
        if let Some(parent) = &node.parent {
            if !(self.affects_score)(parent, node) {
                if let Some(parent_value) =
                    self.node_values.read().await.get(&parent.canonical_key()).copied()
                {
                    debug!("reusing parent score: step does not affect downstream scores");
                    self.node_values.write().await.insert(node_key, parent_value);
                    return Ok(parent_value);
                }
            }
        }

        let max_attempts = self.samples * 2;
        let mut scores: Vec<f64> = Vec::with_capacity(self.samples);
        let mut attempts = 0;
        while scores.len() < self.samples && attempts < max_attempts {
            if cancel.is_cancelled() {
                return Err(EvaluationError::Cancelled);
            }
            attempts += 1;

            // Serialize access to the shared completion engine; the guard is
            // dropped before the objective is awaited.
            let completion = {
                let deadline = Instant::now() + self.per_sample_timeout;
                let mut engine = self.engine.lock().expect("completion engine lock poisoned");
                engine.complete(&self.generator, &node.state, deadline)
            };
            let Some(completion) = completion else {
                trace!(attempt = attempts, "random completion hit a dead end or ran out of time");
                continue;
            };

            if let Some(score) = self.score_completion(&completion, cancel).await? {
                scores.push(score);
            }
        }

        if scores.is_empty() {
            warn!(
                attempts,
                "no rollout of node succeeded, reporting no opinion"
            );
            let evaluation = Evaluation::no_opinion();
            self.node_values.write().await.insert(node_key, evaluation);
            return Ok(evaluation);
        }

        let best = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let uncertainty = dispersion(&scores);
        self.propagate_best_score(node, best).await;

        let evaluation = Evaluation { score: Some(best), uncertainty };
        self.node_values.write().await.insert(node_key, evaluation);
        debug!(
            best,
            samples = scores.len(),
            attempts,
            "node evaluated via random completions"
        );
        Ok(evaluation)
    }
}

/// Sample standard deviation of the rollout scores; `None` below two
/// samples.
fn dispersion(scores: &[f64]) -> Option<f64> {
    if scores.len() < 2 {
        return None;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}
