//! Engine configuration.
//!
//! Every knob recognized by the two-phase engine, with serde defaults so a
//! partial YAML file or environment overlay yields a complete configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the two-phase configuration search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Global wall-clock budget for both phases, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Worker budget for phase-2 re-evaluation.
    #[serde(default = "default_cpus")]
    pub cpus: usize,

    /// Successful rollouts required per node evaluation.
    #[serde(default = "default_random_completions")]
    pub number_of_random_completions: usize,

    /// Budget for a single node evaluation, in milliseconds.
    #[serde(default = "default_node_evaluation_timeout_ms")]
    pub timeout_per_node_evaluation_ms: u64,

    /// Budget for a single rollout evaluation, in milliseconds.
    #[serde(default = "default_candidate_evaluation_timeout_ms")]
    pub timeout_per_candidate_evaluation_ms: u64,

    /// Target shortlist size for the selection phase.
    #[serde(default = "default_shortlist_size")]
    pub selection_shortlist_size: usize,

    /// Expected cost multiplier of a selection-phase re-evaluation relative
    /// to the in-search evaluation of the same candidate.
    #[serde(default = "default_blowup_selection")]
    pub blowup_in_selection: f64,

    /// Expected cost multiplier of post-processing relative to a
    /// selection-phase re-evaluation.
    #[serde(default = "default_blowup_post_processing")]
    pub blowup_in_post_processing: f64,

    /// Tolerance applied to per-candidate timeouts in phase 2.
    #[serde(default = "default_selection_timeout_tolerance")]
    pub selection_timeout_tolerance: f64,

    /// Seed for rollouts and shortlist sampling; fixed seeds make runs
    /// reproducible.
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

const fn default_timeout_secs() -> u64 {
    600
}

const fn default_cpus() -> usize {
    4
}

const fn default_random_completions() -> usize {
    3
}

const fn default_node_evaluation_timeout_ms() -> u64 {
    15_000
}

const fn default_candidate_evaluation_timeout_ms() -> u64 {
    10_000
}

const fn default_shortlist_size() -> usize {
    10
}

const fn default_blowup_selection() -> f64 {
    1.5
}

const fn default_blowup_post_processing() -> f64 {
    1.2
}

const fn default_selection_timeout_tolerance() -> f64 {
    0.1
}

const fn default_random_seed() -> u64 {
    0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            cpus: default_cpus(),
            number_of_random_completions: default_random_completions(),
            timeout_per_node_evaluation_ms: default_node_evaluation_timeout_ms(),
            timeout_per_candidate_evaluation_ms: default_candidate_evaluation_timeout_ms(),
            selection_shortlist_size: default_shortlist_size(),
            blowup_in_selection: default_blowup_selection(),
            blowup_in_post_processing: default_blowup_post_processing(),
            selection_timeout_tolerance: default_selection_timeout_tolerance(),
            random_seed: default_random_seed(),
        }
    }
}

impl EngineConfig {
    /// Fail-fast validation of all knobs. Called before any search starts.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be positive".into());
        }
        if self.cpus == 0 {
            return Err("cpus must be at least 1".into());
        }
        if self.number_of_random_completions == 0 {
            return Err("number_of_random_completions must be at least 1".into());
        }
        if self.selection_shortlist_size == 0 {
            return Err("selection_shortlist_size must be at least 1".into());
        }
        if !self.blowup_in_selection.is_finite() || self.blowup_in_selection <= 0.0 {
            return Err(format!(
                "blowup_in_selection must be a positive finite number, got {}",
                self.blowup_in_selection
            ));
        }
        if !self.blowup_in_post_processing.is_finite() || self.blowup_in_post_processing <= 0.0 {
            return Err(format!(
                "blowup_in_post_processing must be a positive finite number, got {}",
                self.blowup_in_post_processing
            ));
        }
        if !self.selection_timeout_tolerance.is_finite() || self.selection_timeout_tolerance < 0.0 {
            return Err(format!(
                "selection_timeout_tolerance must be non-negative, got {}",
                self.selection_timeout_tolerance
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn nan_blowup_is_rejected() {
        let config = EngineConfig { blowup_in_selection: f64::NAN, ..EngineConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cpus_is_rejected() {
        let config = EngineConfig { cpus: 0, ..EngineConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: EngineConfig = serde_yaml::from_str("timeout_secs: 30\ncpus: 2\n").unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.cpus, 2);
        assert_eq!(config.selection_shortlist_size, default_shortlist_size());
    }
}
