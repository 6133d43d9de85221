//! Confopt - Hierarchical Software Configuration Search
//!
//! Confopt searches the space of hierarchical software configurations: pick a
//! component for a requested interface, recursively pick components for its
//! required interfaces, and refine every numeric parameter until it is
//! concrete. Candidates are found by an anytime best-first search guided by
//! Monte-Carlo rollouts, then a selection phase re-evaluates a shortlist
//! against a more rigorous benchmark before committing.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): component model, configuration trees,
//!   engine configuration, error taxonomy, and the objective port
//! - **Service Layer** (`services`): refinement predicates, the planning
//!   domain generator, node evaluators, best-first search, and the
//!   two-phase controller
//! - **Infrastructure Layer** (`infrastructure`): catalogue and
//!   configuration file loading, logging setup
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use confopt::{ConfigLoader, FnObjective, TwoPhaseEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let repository = Arc::new(confopt::infrastructure::repository::load_yaml("catalogue.yaml")?);
//!     let config = ConfigLoader::load()?;
//!     let objective = Arc::new(FnObjective::new(|instance| {
//!         // benchmark the configuration
//!         Ok(0.0)
//!     }));
//!     let engine = TwoPhaseEngine::new(
//!         repository,
//!         "classifier",
//!         config,
//!         Arc::clone(&objective) as _,
//!         objective as _,
//!     )?;
//!     let solution = engine.run().await?;
//!     println!("selected {} with score {}", solution.instance, solution.score);
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{EngineError, EngineResult, EvaluationError};
pub use domain::models::{
    CandidateRecord, Component, ComponentInstance, ComponentRepository, EngineConfig, EngineState,
    Interval, Parameter, ParameterDefault, ParameterDomain, ParameterRefinementConfig,
    ParameterValue, RequiredInterface, SelectedSolution,
};
pub use domain::ports::{FnObjective, ObjectiveEvaluator};
pub use infrastructure::config::ConfigLoader;
pub use infrastructure::repository::RepositoryError;
pub use services::{
    BestFirstSearch, DomainGenerator, EngineEvent, EnginePayload, EventBus,
    RandomCompletionEvaluator, TwoPhaseEngine,
};
