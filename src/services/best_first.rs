//! Generic best-first search driver.
//!
//! Orders open nodes by evaluator score (ties broken by insertion order),
//! expands the best one, and emits a candidate record for every goal node it
//! reaches: an anytime search that keeps going until the space is exhausted
//! or it is cancelled. The driver knows nothing about the planning domain
//! beyond the expansion function and nothing about how scores are computed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::domain::errors::{EngineResult, EvaluationError};
use crate::domain::models::CandidateRecord;
use crate::services::evaluator::NodeEvaluator;
use crate::services::expansion::{DomainGenerator, SearchNode};

/// Entry of the open list. Lower scores pop first; equal scores pop in
/// insertion order, which keeps runs deterministic for fixed seeds.
struct OpenEntry {
    score: f64,
    sequence: u64,
    evaluation_time_ms: u64,
    node: Arc<SearchNode>,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest score.
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Summary of one search run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub expanded_nodes: usize,
    pub emitted_candidates: usize,
    /// True when the open list ran dry (the space is exhausted).
    pub exhausted: bool,
    /// True when the run stopped because of cancellation.
    pub cancelled: bool,
}

/// Best-first search over the refinement space.
pub struct BestFirstSearch {
    generator: DomainGenerator,
    evaluator: Arc<dyn NodeEvaluator>,
}

impl BestFirstSearch {
    pub fn new(generator: DomainGenerator, evaluator: Arc<dyn NodeEvaluator>) -> Self {
        Self { generator, evaluator }
    }

    /// Run until the space is exhausted or `cancel` fires, streaming every
    /// goal configuration through `candidates` as it is reached.
    pub async fn run(
        &self,
        candidates: mpsc::Sender<CandidateRecord>,
        cancel: CancellationToken,
    ) -> EngineResult<SearchStats> {
        let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();
        let mut closed: HashSet<String> = HashSet::new();
        let mut stats = SearchStats::default();
        let mut sequence: u64 = 0;

        let root = SearchNode::root(self.generator.initial_state()?);
        closed.insert(root.canonical_key());
        open.push(OpenEntry { score: 0.0, sequence, evaluation_time_ms: 0, node: root });

        while let Some(entry) = open.pop() {
            if cancel.is_cancelled() {
                debug!("search cancelled with {} open nodes left", open.len());
                stats.cancelled = true;
                return Ok(stats);
            }

            if entry.node.is_goal() {
                // A goal nobody managed to score is not a usable candidate.
                if !entry.score.is_finite() {
                    debug!("goal reached without a successful evaluation, not emitting it");
                    continue;
                }
                stats.emitted_candidates += 1;
                trace!(score = entry.score, "goal configuration reached");
                let record = CandidateRecord::new(
                    entry.node.state.root.clone(),
                    entry.score,
                    entry.evaluation_time_ms,
                );
                // A closed receiver means the controller is gone; stop
                // quietly instead of erroring.
                if candidates.send(record).await.is_err() {
                    stats.cancelled = true;
                    return Ok(stats);
                }
                continue;
            }

            stats.expanded_nodes += 1;
            for child_state in self.generator.expand(&entry.node.state) {
                let key = child_state.canonical_key();
                if !closed.insert(key) {
                    continue;
                }
                let child = entry.node.child(child_state);

                let started = Instant::now();
                let evaluation = match self.evaluator.evaluate(&child, &cancel).await {
                    Ok(evaluation) => evaluation,
                    Err(err) if err.is_hard() => {
                        stats.cancelled = true;
                        return Ok(stats);
                    }
                    Err(err) => {
                        // Contained failure: score the child worst and move on.
                        debug!(error = %err, "child evaluation failed, ranking it last");
                        crate::services::evaluator::Evaluation::no_opinion()
                    }
                };
                let evaluation_time_ms = started.elapsed().as_millis() as u64;

                sequence += 1;
                open.push(OpenEntry {
                    score: evaluation.score.unwrap_or(f64::INFINITY),
                    sequence,
                    evaluation_time_ms,
                    node: child,
                });
            }
        }

        stats.exhausted = true;
        info!(
            expanded = stats.expanded_nodes,
            candidates = stats.emitted_candidates,
            "search space exhausted"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        Component, ComponentRepository, Parameter, ParameterDefault, ParameterDomain,
        ParameterRefinementConfig,
    };
    use crate::services::evaluator::{Evaluation, FnEvaluator};
    use std::collections::HashMap;

    fn small_repository() -> Arc<ComponentRepository> {
        let a = Component {
            name: "A".into(),
            provided_interfaces: vec!["base".into()],
            required_interfaces: vec![],
            parameters: vec![Parameter {
                name: "x".into(),
                default: ParameterDefault::Number(0.0),
                domain: ParameterDomain::Numeric { min: 0.0, max: 4.0, integer: false },
            }],
        };
        let mut configs = HashMap::new();
        configs.insert(
            ("A".to_string(), "x".to_string()),
            ParameterRefinementConfig::linear(1.0, 2),
        );
        Arc::new(ComponentRepository::new(vec![a], configs))
    }

    fn depth_evaluator() -> Arc<dyn NodeEvaluator> {
        Arc::new(FnEvaluator::new(|node: &Arc<SearchNode>| {
            Ok(Evaluation::scored(node.depth as f64))
        }))
    }

    #[tokio::test]
    async fn exhaustive_search_emits_every_goal_once() {
        let generator = DomainGenerator::new(small_repository(), "base");
        let search = BestFirstSearch::new(generator, depth_evaluator());
        let (tx, mut rx) = mpsc::channel(64);
        let stats = search.run(tx, CancellationToken::new()).await.unwrap();
        assert!(stats.exhausted);
        assert!(!stats.cancelled);
        assert!(stats.emitted_candidates > 0);

        let mut seen = HashSet::new();
        while let Some(record) = rx.recv().await {
            // Every reported goal has a concrete parameter value.
            let value = record.instance.parameter_values.get("x").unwrap();
            assert!(matches!(value, crate::domain::models::ParameterValue::Number(_)));
            assert!(seen.insert(record.instance.canonical_key()), "goal emitted twice");
        }
        assert_eq!(seen.len(), stats.emitted_candidates);
    }

    #[tokio::test]
    async fn pre_cancelled_search_stops_immediately() {
        let generator = DomainGenerator::new(small_repository(), "base");
        let search = BestFirstSearch::new(generator, depth_evaluator());
        let token = CancellationToken::new();
        token.cancel();
        let (tx, _rx) = mpsc::channel(64);
        let stats = search.run(tx, token).await.unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.emitted_candidates, 0);
    }

    #[tokio::test]
    async fn failing_evaluator_exhausts_without_emitting_candidates() {
        let generator = DomainGenerator::new(small_repository(), "base");
        let evaluator: Arc<dyn NodeEvaluator> = Arc::new(FnEvaluator::new(|_| {
            Err(EvaluationError::Objective("scoring broken".into()))
        }));
        let search = BestFirstSearch::new(generator, evaluator);
        let (tx, mut rx) = mpsc::channel(64);
        let stats = search.run(tx, CancellationToken::new()).await.unwrap();
        // The search keeps enumerating, but goals nobody scored never
        // become candidates.
        assert!(stats.exhausted);
        assert!(!stats.cancelled);
        assert_eq!(stats.emitted_candidates, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn abstaining_evaluator_emits_no_candidates_either() {
        let generator = DomainGenerator::new(small_repository(), "base");
        let evaluator: Arc<dyn NodeEvaluator> =
            Arc::new(FnEvaluator::new(|_| Ok(Evaluation::no_opinion())));
        let search = BestFirstSearch::new(generator, evaluator);
        let (tx, mut rx) = mpsc::channel(64);
        let stats = search.run(tx, CancellationToken::new()).await.unwrap();
        assert!(stats.exhausted);
        assert_eq!(stats.emitted_candidates, 0);
        assert!(rx.recv().await.is_none());
    }
}
