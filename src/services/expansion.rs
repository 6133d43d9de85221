//! Planning domain generator: compiles the component repository into a
//! one-step expansion function over partial configuration trees.
//!
//! Expansion tasks form a fixed agenda per node. Choosing a component for an
//! open interface enqueues the fresh instance's parameter refinements before
//! its own required interfaces, so every parameter reaches its completion
//! threshold before the search recurses deeper. Expansion is a pure function
//! of the node state: no global progress leaks in, which keeps it
//! reproducible and safe to call from concurrent evaluators.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::{
    ComponentInstance, ComponentRepository, Interval, ParameterDefault, ParameterDomain,
    ParameterValue,
};
use crate::services::refinement::{
    enclosed_integer_count, enumerate_integers, refine_linear, refine_log_scale,
};

/// One pending decision in a partial configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "task")]
pub enum ExpansionTask {
    /// Pick a providing component for an open required interface.
    ChooseComponent {
        /// Path of required-interface ids from the root to the owner.
        path: Vec<String>,
        /// Required-interface id at the owner.
        interface_id: String,
        /// Interface name a provider must expose.
        interface_name: String,
    },
    /// Narrow the live interval of a numeric parameter.
    RefineParameter { path: Vec<String>, parameter: String },
    /// Fix a sufficiently narrowed parameter to its concrete value.
    CloseParameter { path: Vec<String>, parameter: String },
}

/// A partial configuration plus the agenda of decisions still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationState {
    pub root: ComponentInstance,
    pub agenda: VecDeque<ExpansionTask>,
}

impl ConfigurationState {
    /// A goal state has nothing left to decide: all required interfaces are
    /// resolved and every numeric parameter is refined and closed.
    pub fn is_goal(&self) -> bool {
        self.agenda.is_empty()
    }

    /// Canonical key covering both the tree and the remaining agenda, so two
    /// states are merged by the closed set only if they are truly identical.
    pub fn canonical_key(&self) -> String {
        let mut key = self.root.canonical_key();
        for task in &self.agenda {
            key.push('|');
            match task {
                ExpansionTask::ChooseComponent { path, interface_id, .. } => {
                    key.push_str("c:");
                    key.push_str(&path.join("/"));
                    key.push('#');
                    key.push_str(interface_id);
                }
                ExpansionTask::RefineParameter { path, parameter } => {
                    key.push_str("r:");
                    key.push_str(&path.join("/"));
                    key.push('#');
                    key.push_str(parameter);
                }
                ExpansionTask::CloseParameter { path, parameter } => {
                    key.push_str("x:");
                    key.push_str(&path.join("/"));
                    key.push('#');
                    key.push_str(parameter);
                }
            }
        }
        key
    }
}

/// A node of the refinement search tree. Nodes never revisit states; the
/// predecessor chain exists for score propagation, not for merging.
#[derive(Debug)]
pub struct SearchNode {
    pub state: ConfigurationState,
    pub parent: Option<Arc<SearchNode>>,
    pub depth: usize,
}

impl SearchNode {
    pub fn root(state: ConfigurationState) -> Arc<Self> {
        Arc::new(Self { state, parent: None, depth: 0 })
    }

    pub fn child(self: &Arc<Self>, state: ConfigurationState) -> Arc<Self> {
        Arc::new(Self { state, parent: Some(Arc::clone(self)), depth: self.depth + 1 })
    }

    pub fn is_goal(&self) -> bool {
        self.state.is_goal()
    }

    pub fn canonical_key(&self) -> String {
        self.state.canonical_key()
    }

    /// Ancestor chain from this node up to the root (inclusive).
    pub fn ancestry(self: &Arc<Self>) -> Vec<Arc<SearchNode>> {
        let mut chain = vec![Arc::clone(self)];
        let mut cursor = self.parent.clone();
        while let Some(node) = cursor {
            cursor = node.parent.clone();
            chain.push(node);
        }
        chain
    }
}

/// Compiles the component repository into the expansion function consumed by
/// the generic search driver.
#[derive(Debug, Clone)]
pub struct DomainGenerator {
    repository: Arc<ComponentRepository>,
    requested_interface: String,
}

impl DomainGenerator {
    pub fn new(repository: Arc<ComponentRepository>, requested_interface: impl Into<String>) -> Self {
        Self { repository, requested_interface: requested_interface.into() }
    }

    pub fn repository(&self) -> &ComponentRepository {
        &self.repository
    }

    /// Initial state: a single open interface at the (virtual) root and an
    /// empty tree. Fails fast when nothing can ever provide it.
    pub fn initial_state(&self) -> EngineResult<ConfigurationState> {
        if self.repository.providers_of(&self.requested_interface).is_empty() {
            return Err(EngineError::UnresolvableInterface(self.requested_interface.clone()));
        }
        let mut agenda = VecDeque::new();
        agenda.push_back(ExpansionTask::ChooseComponent {
            path: Vec::new(),
            interface_id: ROOT_SLOT.to_string(),
            interface_name: self.requested_interface.clone(),
        });
        Ok(ConfigurationState { root: ComponentInstance::new(PENDING_ROOT), agenda })
    }

    /// All valid one-step expansions of `state`. Empty for goal states and
    /// for dead ends (an interface nobody provides).
    pub fn expand(&self, state: &ConfigurationState) -> Vec<ConfigurationState> {
        let mut agenda = state.agenda.clone();
        let Some(task) = agenda.pop_front() else {
            return Vec::new();
        };
        match task {
            ExpansionTask::ChooseComponent { path, interface_id, interface_name } => {
                self.expand_component_choice(state, &agenda, &path, &interface_id, &interface_name)
            }
            ExpansionTask::RefineParameter { path, parameter } => {
                self.expand_refinement(state, &agenda, &path, &parameter)
            }
            ExpansionTask::CloseParameter { path, parameter } => {
                self.expand_close(state, &agenda, &path, &parameter)
            }
        }
    }

    fn expand_component_choice(
        &self,
        state: &ConfigurationState,
        agenda_rest: &VecDeque<ExpansionTask>,
        path: &[String],
        interface_id: &str,
        interface_name: &str,
    ) -> Vec<ConfigurationState> {
        let mut successors = Vec::new();
        for component in self.repository.providers_of(interface_name) {
            let child_path: Vec<String> = if path.is_empty() && interface_id == ROOT_SLOT {
                Vec::new()
            } else {
                let mut p = path.to_vec();
                p.push(interface_id.to_string());
                p
            };

            // Fresh instance: full-domain live intervals for numeric
            // parameters, defaults for the rest.
            let mut instance = ComponentInstance::new(&component.name);
            for param in &component.parameters {
                let value = match &param.domain {
                    ParameterDomain::Numeric { min, max, .. } => {
                        ParameterValue::Range(Interval::new(*min, *max))
                    }
                    ParameterDomain::Categorical { .. } => match &param.default {
                        ParameterDefault::Text(v) => ParameterValue::Text(v.clone()),
                        other => ParameterValue::Text(other.to_string()),
                    },
                    ParameterDomain::Boolean => match &param.default {
                        ParameterDefault::Flag(v) => ParameterValue::Flag(*v),
                        _ => ParameterValue::Flag(false),
                    },
                };
                instance.parameter_values.insert(param.name.clone(), value);
            }

            let mut root = state.root.clone();
            if child_path.is_empty() {
                root = instance;
            } else {
                let (parent_path, slot) = child_path.split_at(child_path.len() - 1);
                let Some(owner) = root.instance_at_mut(parent_path) else {
                    continue;
                };
                owner
                    .satisfaction_of_required_interfaces
                    .insert(slot[0].clone(), instance);
            }

            // Parameters of the fresh instance come first, then its own
            // required interfaces; the remaining agenda follows.
            let mut new_agenda = VecDeque::new();
            for param in component.numeric_parameters() {
                new_agenda.push_back(ExpansionTask::RefineParameter {
                    path: child_path.clone(),
                    parameter: param.name.clone(),
                });
            }
            for required in &component.required_interfaces {
                new_agenda.push_back(ExpansionTask::ChooseComponent {
                    path: child_path.clone(),
                    interface_id: required.id.clone(),
                    interface_name: required.name.clone(),
                });
            }
            new_agenda.extend(agenda_rest.iter().cloned());
            successors.push(ConfigurationState { root, agenda: new_agenda });
        }
        successors
    }

    fn expand_refinement(
        &self,
        state: &ConfigurationState,
        agenda_rest: &VecDeque<ExpansionTask>,
        path: &[String],
        parameter: &str,
    ) -> Vec<ConfigurationState> {
        let Some(instance) = state.root.instance_at(path) else {
            return Vec::new();
        };
        let Some(interval) = instance
            .parameter_values
            .get(parameter)
            .and_then(ParameterValue::live_interval)
        else {
            return Vec::new();
        };
        let Some(config) = self.repository.refinement_config(&instance.component_name, parameter)
        else {
            return Vec::new();
        };
        let is_integer = self
            .repository
            .component(&instance.component_name)
            .and_then(|c| c.parameter(parameter))
            .is_some_and(|p| matches!(p.domain, ParameterDomain::Numeric { integer: true, .. }));

        // Narrow enough: the only move left is to close the parameter.
        if interval.width() <= config.interval_length {
            let mut agenda = VecDeque::new();
            agenda.push_back(ExpansionTask::CloseParameter {
                path: path.to_vec(),
                parameter: parameter.to_string(),
            });
            agenda.extend(agenda_rest.iter().cloned());
            return vec![ConfigurationState { root: state.root.clone(), agenda }];
        }

        let refinements = if is_integer
            && enclosed_integer_count(interval) <= config.refinements_per_step
        {
            enumerate_integers(interval)
        } else if config.init_with_log_scale && interval.width() >= full_domain_width(self, instance, parameter) {
            refine_log_scale(
                interval,
                config.refinements_per_step,
                config.log_base,
                config.focus_point,
            )
        } else {
            refine_linear(interval, config.refinements_per_step, config.interval_length)
        };

        refinements
            .into_iter()
            .map(|sub| {
                let mut root = state.root.clone();
                if let Some(inst) = root.instance_at_mut(path) {
                    inst.parameter_values
                        .insert(parameter.to_string(), ParameterValue::Range(sub));
                }
                let mut agenda = VecDeque::new();
                agenda.push_back(ExpansionTask::RefineParameter {
                    path: path.to_vec(),
                    parameter: parameter.to_string(),
                });
                agenda.extend(agenda_rest.iter().cloned());
                ConfigurationState { root, agenda }
            })
            .collect()
    }

    fn expand_close(
        &self,
        state: &ConfigurationState,
        agenda_rest: &VecDeque<ExpansionTask>,
        path: &[String],
        parameter: &str,
    ) -> Vec<ConfigurationState> {
        let mut root = state.root.clone();
        let Some(instance) = root.instance_at_mut(path) else {
            return Vec::new();
        };
        let Some(interval) = instance
            .parameter_values
            .get(parameter)
            .and_then(ParameterValue::live_interval)
        else {
            return Vec::new();
        };
        let is_integer = self
            .repository
            .component(&instance.component_name)
            .and_then(|c| c.parameter(parameter))
            .is_some_and(|p| matches!(p.domain, ParameterDomain::Numeric { integer: true, .. }));
        let value = if is_integer { interval.midpoint().round() } else { interval.midpoint() };
        instance
            .parameter_values
            .insert(parameter.to_string(), ParameterValue::Number(value));
        vec![ConfigurationState { root, agenda: agenda_rest.clone() }]
    }
}

/// Width of the declared full domain of `parameter` on the instance's
/// component, used to recognize the very first refinement step (the only one
/// eligible for the log-scale split).
fn full_domain_width(
    generator: &DomainGenerator,
    instance: &ComponentInstance,
    parameter: &str,
) -> f64 {
    generator
        .repository
        .component(&instance.component_name)
        .and_then(|c| c.parameter(parameter))
        .map_or(f64::INFINITY, |p| match p.domain {
            ParameterDomain::Numeric { min, max, .. } => max - min,
            _ => f64::INFINITY,
        })
}

/// Placeholder name of the root before the first component choice.
const PENDING_ROOT: &str = "<root>";
const ROOT_SLOT: &str = "<requested>";
