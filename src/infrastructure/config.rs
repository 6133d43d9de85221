//! Hierarchical engine-configuration loading.
//!
//! Precedence (lowest to highest): programmatic defaults, a project-local
//! `confopt.yaml`, then `CONFOPT_*` environment variables. Every loaded
//! configuration passes the domain validation before it reaches the engine.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use tracing::debug;

use crate::domain::models::EngineConfig;

/// Environment variable prefix for overrides, e.g. `CONFOPT_TIMEOUT_SECS=120`.
const ENV_PREFIX: &str = "CONFOPT_";
/// Default project-local configuration file.
const CONFIG_FILE: &str = "confopt.yaml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the engine configuration with hierarchical merging.
    pub fn load() -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("failed to assemble engine configuration")?;
        Self::validated(config)
    }

    /// Load from a specific YAML file, still honoring environment overrides.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .with_context(|| {
                format!("failed to load configuration from {}", path.as_ref().display())
            })?;
        Self::validated(config)
    }

    fn validated(config: EngineConfig) -> Result<EngineConfig> {
        config
            .validate()
            .map_err(|reason| anyhow::anyhow!("invalid engine configuration: {reason}"))?;
        debug!(?config, "engine configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_any_file() {
        temp_env::with_var_unset("CONFOPT_TIMEOUT_SECS", || {
            let config = ConfigLoader::load().unwrap();
            assert_eq!(config.timeout_secs, EngineConfig::default().timeout_secs);
        });
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "timeout_secs: 42\ncpus: 2").unwrap();
        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.timeout_secs, 42);
        assert_eq!(config.cpus, 2);
        // Untouched knobs keep their defaults.
        assert_eq!(
            config.selection_shortlist_size,
            EngineConfig::default().selection_shortlist_size
        );
    }

    #[test]
    fn environment_beats_the_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "timeout_secs: 42").unwrap();
        temp_env::with_var("CONFOPT_TIMEOUT_SECS", Some("7"), || {
            let config = ConfigLoader::load_from_file(file.path()).unwrap();
            assert_eq!(config.timeout_secs, 7);
        });
    }

    #[test]
    fn invalid_values_are_rejected_at_load_time() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "cpus: 0").unwrap();
        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }
}
