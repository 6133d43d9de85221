//! Two-phase search-then-select controller.
//!
//! Phase 1 runs the best-first search under a hard deadline while a 1s
//! watchdog projects the cost of the selection phase and cancels the search
//! early when continuing would starve it. Phase 2 re-evaluates a shortlist
//! of candidates concurrently against the (typically more rigorous)
//! selection objective and commits to the best surviving score.
//!
//! The cost model is the original linear one: an in-search evaluation time
//! scaled by empirical blow-up factors. It lives behind the `estimate_*`
//! methods so a different estimator can replace it without touching the
//! protocol.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::errors::{EngineError, EngineResult, EvaluationError};
use crate::domain::models::{
    CandidateRecord, ComponentRepository, EngineConfig, EngineState, SelectedSolution,
};
use crate::domain::ports::ObjectiveEvaluator;
use crate::services::best_first::{BestFirstSearch, SearchStats};
use crate::services::evaluator::TimeAwareEvaluator;
use crate::services::event_bus::{EnginePayload, EventBus};
use crate::services::expansion::DomainGenerator;
use crate::services::random_completion::RandomCompletionEvaluator;
use crate::services::refinement::is_refinement_complete;

/// Relative margin from the best in-search score within which candidates
/// are still considered for the selection phase.
const MAX_MARGIN_FROM_BEST: f64 = 0.03;
/// Safety margin added to the projected remaining cost in the watchdog.
const WATCHDOG_SAFETY_MARGIN_MS: u64 = 5_000;
/// Below this much remaining time phase 1 is cancelled unconditionally.
const MIN_PHASE1_HEADROOM_MS: u64 = 2_000;
/// With no candidate and less than this left, the run is a hard timeout.
const MIN_USABLE_TAIL_MS: u64 = 10_000;
/// Reserved at the very end of the budget for returning the result.
const DELIVERY_RESERVE_MS: u64 = 2_000;
/// Floor for any per-candidate re-evaluation timeout.
const MIN_CANDIDATE_TIMEOUT_MS: u64 = 1_000;

/// Result of one phase-2 worker.
struct SelectionRun {
    candidate_index: usize,
    selection_score: Option<f64>,
}

/// The two-phase configuration search engine.
pub struct TwoPhaseEngine {
    run_id: Uuid,
    repository: Arc<ComponentRepository>,
    requested_interface: String,
    config: EngineConfig,
    search_objective: Arc<dyn ObjectiveEvaluator>,
    selection_objective: Arc<dyn ObjectiveEvaluator>,
    event_bus: Arc<EventBus>,
    state: Arc<RwLock<EngineState>>,
    cancel: CancellationToken,
}

impl TwoPhaseEngine {
    /// Fails fast on invalid configuration; nothing runs yet.
    pub fn new(
        repository: Arc<ComponentRepository>,
        requested_interface: impl Into<String>,
        config: EngineConfig,
        search_objective: Arc<dyn ObjectiveEvaluator>,
        selection_objective: Arc<dyn ObjectiveEvaluator>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfiguration)?;
        if repository.is_empty() {
            return Err(EngineError::InvalidRepository("component repository is empty".into()));
        }
        Ok(Self {
            run_id: Uuid::new_v4(),
            repository,
            requested_interface: requested_interface.into(),
            config,
            search_objective,
            selection_objective,
            event_bus: Arc::new(EventBus::default()),
            state: Arc::new(RwLock::new(EngineState::Created)),
            cancel: CancellationToken::new(),
        })
    }

    /// Identifier of this engine run, present in every log line it emits.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Subscribe to engine events (candidate-found, phase-switch, ...).
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Request cancellation. Idempotent; propagates to the live search and
    /// all in-flight phase-2 workers and leaves the engine terminal.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Run both phases to completion. Consumable once: a finished or
    /// cancelled engine cannot be restarted.
    pub async fn run(&self) -> EngineResult<SelectedSolution> {
        {
            let mut state = self.state.write().await;
            if *state != EngineState::Created {
                return Err(EngineError::NotRestartable(state.to_string()));
            }
            *state = EngineState::Searching;
        }
        self.event_bus.publish(EnginePayload::PhaseSwitch {
            from: EngineState::Created,
            to: EngineState::Searching,
        });

        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.timeout_secs);

        let span = info_span!("engine_run", run_id = %self.run_id, interface = %self.requested_interface);
        let result = self.run_inner(started, deadline).instrument(span).await;
        *self.state.write().await = EngineState::Done;
        if self.cancel.is_cancelled() && result.is_ok() {
            // A cancel that raced the final selection still wins.
            return Err(EngineError::Cancelled);
        }
        result
    }

    async fn run_inner(
        &self,
        started: Instant,
        deadline: Instant,
    ) -> EngineResult<SelectedSolution> {
        let (candidates, search_stats) = self.run_phase1(deadline).await?;
        info!(
            candidates = candidates.len(),
            expanded = search_stats.expanded_nodes,
            "phase 1 finished"
        );
        self.event_bus.publish(EnginePayload::SearchFinished {
            candidates: candidates.len(),
            exhausted: search_stats.exhausted,
        });

        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        if candidates.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if search_stats.exhausted {
                return Err(EngineError::NoSolutionFound);
            }
            if (remaining.as_millis() as u64) < MIN_USABLE_TAIL_MS {
                return Err(EngineError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    budget_ms: self.config.timeout_secs * 1000,
                });
            }
            return Err(EngineError::NoSolutionFound);
        }

        {
            let mut state = self.state.write().await;
            *state = EngineState::Selecting;
        }
        self.event_bus.publish(EnginePayload::PhaseSwitch {
            from: EngineState::Searching,
            to: EngineState::Selecting,
        });

        let solution = self.run_phase2(&candidates, deadline).await?;
        self.event_bus.publish(EnginePayload::CandidateSelected {
            canonical_key: solution.instance.canonical_key(),
            score: solution.score,
            revalidated: solution.revalidated,
        });
        Ok(solution)
    }

    /// Phase 1: bounded-time search with the early-termination watchdog.
    async fn run_phase1(
        &self,
        deadline: Instant,
    ) -> EngineResult<(Vec<CandidateRecord>, SearchStats)> {
        let generator = DomainGenerator::new(Arc::clone(&self.repository), &self.requested_interface);

        let rollout = Arc::new(RandomCompletionEvaluator::new(
            Arc::clone(&self.search_objective),
            generator.clone(),
            self.config.number_of_random_completions,
            Duration::from_millis(self.config.timeout_per_candidate_evaluation_ms),
            self.config.random_seed,
        ));
        let evaluator = Arc::new(
            TimeAwareEvaluator::new(
                rollout,
                Duration::from_millis(self.config.timeout_per_node_evaluation_ms),
            )
            .with_global_deadline(deadline),
        );

        let search = BestFirstSearch::new(generator, evaluator);
        let phase1_token = self.cancel.child_token();
        let (tx, mut rx) = mpsc::channel::<CandidateRecord>(256);

        let search_token = phase1_token.clone();
        let search_task = tokio::spawn(async move { search.run(tx, search_token).await });

        let mut collected: Vec<CandidateRecord> = Vec::new();
        let mut watchdog = tokio::time::interval(Duration::from_secs(1));
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        watchdog.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(record) => {
                            // Accept only fully refined configurations.
                            if !is_refinement_complete(&self.repository, &record.instance) {
                                warn!(
                                    candidate = %record.instance,
                                    "discarding candidate with an unrefined parameter"
                                );
                                continue;
                            }
                            debug!(score = record.score, "candidate collected");
                            self.event_bus.publish(EnginePayload::CandidateFound {
                                canonical_key: record.instance.canonical_key(),
                                score: record.score,
                                evaluation_time_ms: record.evaluation_time_ms,
                            });
                            collected.push(record);
                        }
                        None => break, // search finished and dropped its sender
                    }
                }
                _ = watchdog.tick() => {
                    let remaining_ms = deadline
                        .saturating_duration_since(Instant::now())
                        .as_millis() as u64;
                    if remaining_ms < MIN_PHASE1_HEADROOM_MS
                        || self.should_terminate_phase1(&collected, remaining_ms)
                    {
                        info!(remaining_ms, "cancelling phase 1 early");
                        phase1_token.cancel();
                    }
                }
            }
        }

        let stats = search_task
            .await
            .map_err(|err| EngineError::Internal(format!("search task panicked: {err}")))??;
        Ok((collected, stats))
    }

    /// Watchdog estimate: would finishing phase 2 for the current shortlist
    /// (plus post-processing and a safety margin) no longer fit?
    fn should_terminate_phase1(&self, candidates: &[CandidateRecord], remaining_ms: u64) -> bool {
        if candidates.is_empty() {
            return false;
        }
        let shortlist = self.shortlist(candidates, None);
        let projected = self.estimate_total_remaining_ms(&shortlist, candidates);
        let terminate = projected + WATCHDOG_SAFETY_MARGIN_MS > remaining_ms;
        debug!(
            projected_ms = projected,
            remaining_ms, terminate, "phase-1 watchdog estimate"
        );
        terminate
    }

    /// Candidates eligible for phase 2: the best `k/2` within the margin,
    /// plus `k/2` drawn uniformly (seeded) from the within-margin rest.
    /// With a time budget, greedily drops lowest-priority members
    /// (keeping at least one) until the projection fits.
    fn shortlist(
        &self,
        candidates: &[CandidateRecord],
        remaining_ms: Option<u64>,
    ) -> Vec<CandidateRecord> {
        let Some(best) = candidates
            .iter()
            .map(|c| c.score)
            .min_by(f64::total_cmp)
        else {
            return Vec::new();
        };
        let threshold = best + MAX_MARGIN_FROM_BEST.max(best.abs() * MAX_MARGIN_FROM_BEST);

        let mut within: Vec<CandidateRecord> = candidates
            .iter()
            .filter(|c| c.score <= threshold)
            .cloned()
            .collect();
        within.sort_by(|a, b| a.score.total_cmp(&b.score));

        let k = self.config.selection_shortlist_size;
        let best_k = k.div_ceil(2);
        let random_k = k - best_k;

        let mut selection: Vec<CandidateRecord> =
            within.iter().take(best_k).cloned().collect();
        let mut rest: Vec<CandidateRecord> = within.into_iter().skip(best_k).collect();
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        rest.shuffle(&mut rng);
        selection.extend(rest.into_iter().take(random_k));

        if let Some(remaining_ms) = remaining_ms {
            // Greedy drop-to-fit, keeping at least one member.
            let mut kept: Vec<CandidateRecord> = Vec::new();
            for candidate in selection {
                kept.push(candidate);
                let projected = self.estimate_total_remaining_ms(&kept, candidates);
                if projected > remaining_ms && kept.len() > 1 {
                    let dropped = kept.pop();
                    if let Some(dropped) = dropped {
                        debug!(
                            score = dropped.score,
                            projected_ms = projected,
                            remaining_ms,
                            "dropping shortlist member to fit the deadline"
                        );
                    }
                }
            }
            kept.sort_by(|a, b| a.score.total_cmp(&b.score));
            return kept;
        }
        selection.sort_by(|a, b| a.score.total_cmp(&b.score));
        selection
    }

    /// Expected wall-clock cost of re-evaluating `pool` on the worker
    /// budget, in milliseconds.
    fn estimate_phase2_ms(&self, pool: &[CandidateRecord]) -> u64 {
        let in_search_ms: u64 = pool.iter().map(|c| c.evaluation_time_ms).sum();
        let scaled = in_search_ms as f64 * self.config.blowup_in_selection;
        let usable_workers = self.config.cpus.min(pool.len()).max(1);
        (scaled / usable_workers as f64).ceil() as u64
    }

    /// Expected post-processing cost of delivering the currently best
    /// candidate, in milliseconds.
    fn estimate_post_processing_ms(&self, candidates: &[CandidateRecord]) -> u64 {
        candidates
            .iter()
            .min_by(|a, b| a.score.total_cmp(&b.score))
            .map_or(0, |best| {
                (best.evaluation_time_ms as f64
                    * self.config.blowup_in_selection
                    * self.config.blowup_in_post_processing)
                    .round() as u64
            })
    }

    fn estimate_total_remaining_ms(
        &self,
        pool: &[CandidateRecord],
        candidates: &[CandidateRecord],
    ) -> u64 {
        self.estimate_phase2_ms(pool) + self.estimate_post_processing_ms(candidates)
    }

    /// Phase 2: concurrent re-evaluation of the shortlist.
    async fn run_phase2(
        &self,
        candidates: &[CandidateRecord],
        deadline: Instant,
    ) -> EngineResult<SelectedSolution> {
        let remaining_ms = deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64;
        let best_of_phase1 = candidates
            .iter()
            .min_by(|a, b| a.score.total_cmp(&b.score))
            .expect("phase 2 requires at least one candidate")
            .clone();

        if remaining_ms == 0 {
            warn!("budget exhausted before selection, returning best phase-1 candidate");
            return Ok(solution_from_search(&best_of_phase1));
        }

        let shortlist = self.shortlist(candidates, Some(remaining_ms));
        if shortlist.is_empty() {
            return Ok(solution_from_search(&best_of_phase1));
        }
        if shortlist.len() == 1 {
            // Nothing to compare against: no workers are launched.
            info!("single shortlisted candidate, selecting it directly");
            return Ok(solution_from_search(&shortlist[0]));
        }

        info!(
            shortlist = shortlist.len(),
            workers = self.config.cpus,
            remaining_ms,
            "entering selection phase"
        );

        let phase2_deadline = deadline - Duration::from_millis(DELIVERY_RESERVE_MS.min(remaining_ms));
        let semaphore = Arc::new(Semaphore::new(self.config.cpus));
        let mut workers: JoinSet<Result<SelectionRun, EvaluationError>> = JoinSet::new();

        for (candidate_index, candidate) in shortlist.iter().enumerate() {
            let expected_ms =
                (candidate.evaluation_time_ms as f64 * self.config.blowup_in_selection).ceil() as u64;
            let now = Instant::now();
            if now + Duration::from_millis(expected_ms) > phase2_deadline {
                // Its re-evaluation alone cannot fit; skip outright.
                warn!(
                    candidate_index,
                    expected_ms, "skipping candidate that cannot finish before the deadline"
                );
                continue;
            }
            let timeout_ms = MIN_CANDIDATE_TIMEOUT_MS.max(
                (expected_ms as f64 * (1.0 + self.config.selection_timeout_tolerance)).ceil() as u64,
            );

            let objective = Arc::clone(&self.selection_objective);
            let instance = candidate.instance.clone();
            let permit_source = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            workers.spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .map_err(|_| EvaluationError::Cancelled)?;
                let outcome = tokio::select! {
                    result = objective.evaluate(&instance) => result,
                    () = cancel.cancelled() => Err(EvaluationError::Cancelled),
                    () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                        Err(EvaluationError::TimedOut(timeout_ms))
                    }
                };
                match outcome {
                    Ok(score) => {
                        Ok(SelectionRun { candidate_index, selection_score: Some(score) })
                    }
                    Err(err) if err.is_hard() => Err(err),
                    Err(err) => {
                        // Contained per-candidate failure: excluded from the
                        // winner comparison, never aborts the phase.
                        debug!(candidate_index, error = %err, "selection run excluded");
                        Ok(SelectionRun { candidate_index, selection_score: None })
                    }
                }
            });
        }

        // Barrier: wait for every worker (or pool shutdown on cancel).
        let mut runs: Vec<SelectionRun> = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(run)) => runs.push(run),
                Ok(Err(EvaluationError::Cancelled)) => {
                    workers.abort_all();
                    return Err(EngineError::Cancelled);
                }
                Ok(Err(_)) | Err(_) => {}
            }
        }

        let winner = runs
            .iter()
            .filter_map(|run| run.selection_score.map(|s| (run.candidate_index, s)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match winner {
            Some((index, selection_score)) => {
                let candidate = &shortlist[index];
                info!(
                    search_score = candidate.score,
                    selection_score, "selection phase picked a re-validated candidate"
                );
                Ok(SelectedSolution {
                    instance: candidate.instance.clone(),
                    score: selection_score,
                    search_score: candidate.score,
                    revalidated: true,
                })
            }
            None => {
                warn!("no selection run succeeded, falling back to best phase-1 candidate");
                Ok(solution_from_search(&best_of_phase1))
            }
        }
    }
}

fn solution_from_search(candidate: &CandidateRecord) -> SelectedSolution {
    SelectedSolution {
        instance: candidate.instance.clone(),
        score: candidate.score,
        search_score: candidate.score,
        revalidated: false,
    }
}
