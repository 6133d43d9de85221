//! Domain models for the configuration search engine.

pub mod candidate;
pub mod component;
pub mod config;
pub mod instance;

pub use candidate::{CandidateRecord, EngineState, SelectedSolution};
pub use component::{
    Component, ComponentRepository, Parameter, ParameterDefault, ParameterDomain,
    ParameterRefinementConfig, RequiredInterface,
};
pub use config::EngineConfig;
pub use instance::{ComponentInstance, Interval, ParameterValue};
