//! Service layer: the search machinery and the two-phase controller.
//!
//! Services operate on domain models only and reach external code solely
//! through the `ObjectiveEvaluator` port.

pub mod best_first;
pub mod evaluator;
pub mod event_bus;
pub mod expansion;
pub mod random_completion;
pub mod refinement;
pub mod two_phase;

pub use best_first::{BestFirstSearch, SearchStats};
pub use evaluator::{
    AlternativeEvaluator, Evaluation, FnEvaluator, LinearCombinationEvaluator, NodeEvaluator,
    TimeAwareEvaluator,
};
pub use event_bus::{EngineEvent, EnginePayload, EventBus, SequenceNumber};
pub use expansion::{ConfigurationState, DomainGenerator, ExpansionTask, SearchNode};
pub use random_completion::RandomCompletionEvaluator;
pub use two_phase::TwoPhaseEngine;
