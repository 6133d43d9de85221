//! Component model: the catalogue of interchangeable building blocks.
//!
//! A component exposes named interfaces, requires others to be satisfied by
//! further components, and declares parameters. The catalogue is loaded once
//! and never mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Domain of a single component parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ParameterDomain {
    /// Continuous or integer-valued numeric range.
    Numeric {
        min: f64,
        max: f64,
        /// Whether only integer values are admissible.
        integer: bool,
    },
    /// Finite set of admissible values.
    Categorical { values: Vec<String> },
    /// True/false choice.
    Boolean,
}

impl ParameterDomain {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric { .. })
    }
}

/// Default value assigned to a parameter when its component is instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterDefault {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl std::fmt::Display for ParameterDefault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

/// A declared component parameter. The domain never changes; only the live
/// search interval of a numeric parameter narrows during refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default: ParameterDefault,
    pub domain: ParameterDomain,
}

impl Parameter {
    pub fn is_numeric(&self) -> bool {
        self.domain.is_numeric()
    }

    /// Default as a number, if the parameter is numeric.
    pub fn numeric_default(&self) -> Option<f64> {
        match self.default {
            ParameterDefault::Number(v) => Some(v),
            _ => None,
        }
    }
}

/// Refinement behavior for one numeric parameter of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ParameterRefinementConfig {
    /// Refinement stops once the live interval is this short or shorter.
    pub interval_length: f64,
    /// Branching factor of each refinement step.
    pub refinements_per_step: usize,
    /// Whether the first refinement concentrates resolution near `focus_point`.
    #[serde(default)]
    pub init_with_log_scale: bool,
    /// Point of interest for log-scale refinement (typically the default value).
    #[serde(default)]
    pub focus_point: f64,
    /// Geometric growth ratio of log-scale sub-interval widths.
    #[serde(default = "default_log_base")]
    pub log_base: f64,
}

const fn default_log_base() -> f64 {
    2.0
}

impl ParameterRefinementConfig {
    pub fn linear(interval_length: f64, refinements_per_step: usize) -> Self {
        Self {
            interval_length,
            refinements_per_step,
            init_with_log_scale: false,
            focus_point: 0.0,
            log_base: default_log_base(),
        }
    }
}

/// An interchangeable component: what it provides, what it needs, and the
/// parameters it declares (in declaration order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    /// Interfaces this component can stand in for.
    pub provided_interfaces: Vec<String>,
    /// Required interface id -> interface name. Each entry must be resolved
    /// by some providing component instance.
    pub required_interfaces: Vec<RequiredInterface>,
    pub parameters: Vec<Parameter>,
}

/// One required-interface slot of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredInterface {
    /// Slot identifier, unique within the component.
    pub id: String,
    /// Name of the interface a chosen provider must expose.
    pub name: String,
}

impl Component {
    pub fn provides(&self, interface: &str) -> bool {
        self.provided_interfaces.iter().any(|i| i == interface)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn numeric_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_numeric())
    }
}

/// The loaded, validated component catalogue. Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct ComponentRepository {
    components: Vec<Component>,
    /// (component name, parameter name) -> refinement configuration.
    refinement_configs: HashMap<(String, String), ParameterRefinementConfig>,
}

impl ComponentRepository {
    pub fn new(
        components: Vec<Component>,
        refinement_configs: HashMap<(String, String), ParameterRefinementConfig>,
    ) -> Self {
        Self { components, refinement_configs }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// All components providing the given interface, in catalogue order.
    pub fn providers_of(&self, interface: &str) -> Vec<&Component> {
        self.components.iter().filter(|c| c.provides(interface)).collect()
    }

    pub fn refinement_config(
        &self,
        component: &str,
        parameter: &str,
    ) -> Option<&ParameterRefinementConfig> {
        self.refinement_configs
            .get(&(component.to_string(), parameter.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
