//! Component catalogue loader.
//!
//! Catalogues are plain YAML or JSON files describing components, the
//! interfaces they provide and require, and their parameters. Loading
//! validates everything up front so the engine never discovers a broken
//! catalogue mid-search.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::models::{
    Component, ComponentRepository, Interval, Parameter, ParameterDefault, ParameterDomain,
    ParameterRefinementConfig, RequiredInterface,
};

/// Catalogue loading and validation errors.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("failed to read catalogue file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalogue: {0}")]
    Parse(String),

    #[error("duplicate component name: {0}")]
    DuplicateComponent(String),

    #[error("component {component}: duplicate required-interface id {id}")]
    DuplicateRequiredInterface { component: String, id: String },

    #[error("component {component}, parameter {parameter}: {reason}")]
    InvalidParameter {
        component: String,
        parameter: String,
        reason: String,
    },

    #[error("catalogue contains no components")]
    Empty,
}

/// On-disk shape of a catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogueFile {
    components: Vec<ComponentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ComponentSpec {
    name: String,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(default)]
    requires: Vec<RequiredInterfaceSpec>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RequiredInterfaceSpec {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
enum ParameterSpec {
    Numeric {
        name: String,
        min: f64,
        max: f64,
        #[serde(default)]
        integer: bool,
        default: f64,
        refinement: RefinementSpec,
    },
    Categorical {
        name: String,
        values: Vec<String>,
        default: String,
    },
    Boolean {
        name: String,
        #[serde(default)]
        default: bool,
    },
}

impl ParameterSpec {
    fn name(&self) -> &str {
        match self {
            Self::Numeric { name, .. }
            | Self::Categorical { name, .. }
            | Self::Boolean { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefinementSpec {
    interval_length: f64,
    refinements_per_step: usize,
    #[serde(default)]
    init_with_log_scale: bool,
    #[serde(default)]
    focus_point: f64,
    #[serde(default = "default_log_base")]
    log_base: f64,
}

const fn default_log_base() -> f64 {
    2.0
}

/// Load a catalogue from a YAML file.
pub fn load_yaml(path: impl AsRef<Path>) -> Result<ComponentRepository, RepositoryError> {
    let text = read(path.as_ref())?;
    parse_yaml(&text)
}

/// Load a catalogue from a JSON file.
pub fn load_json(path: impl AsRef<Path>) -> Result<ComponentRepository, RepositoryError> {
    let text = read(path.as_ref())?;
    parse_json(&text)
}

/// Parse a YAML catalogue from a string.
pub fn parse_yaml(text: &str) -> Result<ComponentRepository, RepositoryError> {
    let file: CatalogueFile =
        serde_yaml::from_str(text).map_err(|e| RepositoryError::Parse(e.to_string()))?;
    build(file)
}

/// Parse a JSON catalogue from a string.
pub fn parse_json(text: &str) -> Result<ComponentRepository, RepositoryError> {
    let file: CatalogueFile =
        serde_json::from_str(text).map_err(|e| RepositoryError::Parse(e.to_string()))?;
    build(file)
}

fn read(path: &Path) -> Result<String, RepositoryError> {
    std::fs::read_to_string(path).map_err(|source| RepositoryError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn build(file: CatalogueFile) -> Result<ComponentRepository, RepositoryError> {
    if file.components.is_empty() {
        return Err(RepositoryError::Empty);
    }

    let mut names: HashSet<String> = HashSet::new();
    let mut components: Vec<Component> = Vec::with_capacity(file.components.len());
    let mut refinement_configs: HashMap<(String, String), ParameterRefinementConfig> =
        HashMap::new();

    for spec in file.components {
        if !names.insert(spec.name.clone()) {
            return Err(RepositoryError::DuplicateComponent(spec.name));
        }

        let mut interface_ids: HashSet<&str> = HashSet::new();
        for required in &spec.requires {
            if !interface_ids.insert(required.id.as_str()) {
                return Err(RepositoryError::DuplicateRequiredInterface {
                    component: spec.name.clone(),
                    id: required.id.clone(),
                });
            }
        }

        let mut parameters: Vec<Parameter> = Vec::with_capacity(spec.parameters.len());
        let mut parameter_names: HashSet<String> = HashSet::new();
        for parameter in spec.parameters {
            if !parameter_names.insert(parameter.name().to_string()) {
                return Err(invalid(&spec.name, parameter.name(), "declared twice"));
            }
            match parameter {
                ParameterSpec::Numeric { name, min, max, integer, default, refinement } => {
                    if !min.is_finite() || !max.is_finite() || min >= max {
                        return Err(invalid(
                            &spec.name,
                            &name,
                            &format!("invalid range [{min}, {max}]"),
                        ));
                    }
                    if !Interval::new(min, max).contains(default) {
                        return Err(invalid(
                            &spec.name,
                            &name,
                            &format!("default {default} outside [{min}, {max}]"),
                        ));
                    }
                    if !(refinement.interval_length.is_finite()
                        && refinement.interval_length > 0.0)
                    {
                        return Err(invalid(
                            &spec.name,
                            &name,
                            "refinement interval_length must be positive",
                        ));
                    }
                    if refinement.refinements_per_step < 2 {
                        return Err(invalid(
                            &spec.name,
                            &name,
                            "refinements_per_step must be at least 2",
                        ));
                    }
                    if refinement.init_with_log_scale && refinement.log_base <= 1.0 {
                        return Err(invalid(
                            &spec.name,
                            &name,
                            "log_base must exceed 1 for log-scale refinement",
                        ));
                    }
                    refinement_configs.insert(
                        (spec.name.clone(), name.clone()),
                        ParameterRefinementConfig {
                            interval_length: refinement.interval_length,
                            refinements_per_step: refinement.refinements_per_step,
                            init_with_log_scale: refinement.init_with_log_scale,
                            focus_point: refinement.focus_point,
                            log_base: refinement.log_base,
                        },
                    );
                    parameters.push(Parameter {
                        name,
                        default: ParameterDefault::Number(default),
                        domain: ParameterDomain::Numeric { min, max, integer },
                    });
                }
                ParameterSpec::Categorical { name, values, default } => {
                    if values.is_empty() {
                        return Err(invalid(&spec.name, &name, "no admissible values"));
                    }
                    if !values.contains(&default) {
                        return Err(invalid(
                            &spec.name,
                            &name,
                            &format!("default {default:?} not among admissible values"),
                        ));
                    }
                    parameters.push(Parameter {
                        name,
                        default: ParameterDefault::Text(default),
                        domain: ParameterDomain::Categorical { values },
                    });
                }
                ParameterSpec::Boolean { name, default } => {
                    parameters.push(Parameter {
                        name,
                        default: ParameterDefault::Flag(default),
                        domain: ParameterDomain::Boolean,
                    });
                }
            }
        }

        components.push(Component {
            name: spec.name,
            provided_interfaces: spec.provides,
            required_interfaces: spec
                .requires
                .into_iter()
                .map(|r| RequiredInterface { id: r.id, name: r.name })
                .collect(),
            parameters,
        });
    }

    // Interfaces nobody provides are legal (the catalogue may be partial)
    // but almost always a mistake worth flagging.
    let provided: HashSet<&str> = components
        .iter()
        .flat_map(|c| c.provided_interfaces.iter().map(String::as_str))
        .collect();
    for component in &components {
        for required in &component.required_interfaces {
            if !provided.contains(required.name.as_str()) {
                warn!(
                    component = %component.name,
                    interface = %required.name,
                    "required interface has no provider in the catalogue"
                );
            }
        }
    }

    info!(components = components.len(), "component catalogue loaded");
    Ok(ComponentRepository::new(components, refinement_configs))
}

fn invalid(component: &str, parameter: &str, reason: &str) -> RepositoryError {
    RepositoryError::InvalidParameter {
        component: component.to_string(),
        parameter: parameter.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML: &str = r#"
components:
  - name: pipeline
    provides: [app]
    requires:
      - id: learner
        name: classifier
    parameters: []
  - name: tree
    provides: [classifier]
    parameters:
      - type: numeric
        name: depth
        min: 1
        max: 30
        integer: true
        default: 10
        refinement:
          interval_length: 2
          refinements_per_step: 4
      - type: categorical
        name: criterion
        values: [gini, entropy]
        default: gini
      - type: boolean
        name: prune
        default: true
"#;

    #[test]
    fn valid_catalogue_loads_with_refinement_configs() {
        let repo = parse_yaml(VALID_YAML).unwrap();
        assert_eq!(repo.components().len(), 2);
        assert_eq!(repo.providers_of("classifier").len(), 1);
        let config = repo.refinement_config("tree", "depth").unwrap();
        assert_eq!(config.refinements_per_step, 4);
        assert!((config.log_base - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn json_and_yaml_agree() {
        let yaml = parse_yaml(VALID_YAML).unwrap();
        let value: serde_json::Value = serde_yaml::from_str(VALID_YAML).unwrap();
        let json = parse_json(&value.to_string()).unwrap();
        assert_eq!(yaml.components(), json.components());
    }

    #[test]
    fn empty_catalogue_is_rejected() {
        assert!(matches!(parse_yaml("components: []"), Err(RepositoryError::Empty)));
    }

    #[test]
    fn duplicate_component_is_rejected() {
        let text = r"
components:
  - name: a
    provides: [x]
  - name: a
    provides: [y]
";
        assert!(matches!(parse_yaml(text), Err(RepositoryError::DuplicateComponent(_))));
    }

    #[test]
    fn inverted_numeric_range_is_rejected() {
        let text = r"
components:
  - name: a
    provides: [x]
    parameters:
      - type: numeric
        name: p
        min: 5
        max: 1
        default: 3
        refinement:
          interval_length: 1
          refinements_per_step: 2
";
        assert!(matches!(parse_yaml(text), Err(RepositoryError::InvalidParameter { .. })));
    }

    #[test]
    fn categorical_default_must_be_admissible() {
        let text = r"
components:
  - name: a
    provides: [x]
    parameters:
      - type: categorical
        name: p
        values: [u, v]
        default: w
";
        assert!(matches!(parse_yaml(text), Err(RepositoryError::InvalidParameter { .. })));
    }

    #[test]
    fn single_branch_refinement_is_rejected() {
        let text = r"
components:
  - name: a
    provides: [x]
    parameters:
      - type: numeric
        name: p
        min: 0
        max: 1
        default: 0.5
        refinement:
          interval_length: 0.1
          refinements_per_step: 1
";
        assert!(matches!(parse_yaml(text), Err(RepositoryError::InvalidParameter { .. })));
    }

    #[test]
    fn loading_missing_file_reports_the_path() {
        let err = load_yaml("/nonexistent/catalogue.yaml").unwrap_err();
        assert!(matches!(err, RepositoryError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/catalogue.yaml"));
    }
}
