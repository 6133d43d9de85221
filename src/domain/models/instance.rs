//! Configuration trees: components wired together with concrete or
//! still-refining parameter values.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// A closed numeric interval `[lo, hi]` used as the live search range of a
/// numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Self {
        debug_assert!(lo <= hi, "interval bounds out of order: [{lo}, {hi}]");
        Self { lo, hi }
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn midpoint(&self) -> f64 {
        self.lo + (self.hi - self.lo) / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

/// Currently assigned value of a parameter within a configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ParameterValue {
    /// Concrete scalar (numeric parameters once closed).
    Number(f64),
    /// Concrete categorical value.
    Text(String),
    /// Concrete boolean value.
    Flag(bool),
    /// Numeric parameter still under refinement.
    Range(Interval),
}

impl ParameterValue {
    /// The scalar handed to the objective: closed values verbatim, a live
    /// interval as its midpoint.
    pub fn effective_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Range(iv) => Some(iv.midpoint()),
            _ => None,
        }
    }

    pub fn live_interval(&self) -> Option<Interval> {
        match self {
            Self::Range(iv) => Some(*iv),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
            Self::Range(iv) => write!(f, "{iv}"),
        }
    }
}

/// One instantiated component inside a configuration.
///
/// The instance exclusively owns the sub-instances satisfying its required
/// interfaces, so a configuration is always a tree. `BTreeMap`s keep the
/// canonical rendering order-independent of insertion history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub component_name: String,
    /// Required-interface id -> satisfying child instance.
    pub satisfaction_of_required_interfaces: BTreeMap<String, ComponentInstance>,
    /// Parameter name -> currently assigned value.
    pub parameter_values: BTreeMap<String, ParameterValue>,
}

impl ComponentInstance {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            satisfaction_of_required_interfaces: BTreeMap::new(),
            parameter_values: BTreeMap::new(),
        }
    }

    /// Navigate to the instance at `path` (sequence of required-interface
    /// ids starting at this instance).
    pub fn instance_at(&self, path: &[String]) -> Option<&ComponentInstance> {
        let mut current = self;
        for segment in path {
            current = current.satisfaction_of_required_interfaces.get(segment)?;
        }
        Some(current)
    }

    /// Mutable variant of [`Self::instance_at`].
    pub fn instance_at_mut(&mut self, path: &[String]) -> Option<&mut ComponentInstance> {
        let mut current = self;
        for segment in path {
            current = current.satisfaction_of_required_interfaces.get_mut(segment)?;
        }
        Some(current)
    }

    /// Depth-first iteration over this instance and all sub-instances.
    pub fn iter_tree(&self) -> Vec<&ComponentInstance> {
        let mut stack = vec![self];
        let mut out = Vec::new();
        while let Some(inst) = stack.pop() {
            out.push(inst);
            stack.extend(inst.satisfaction_of_required_interfaces.values());
        }
        out
    }

    /// Deterministic textual key identifying this configuration. Two
    /// instances with equal trees and parameter assignments share a key, so
    /// it is safe for score caches and closed sets.
    pub fn canonical_key(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        out.push_str(&self.component_name);
        out.push('(');
        for (name, value) in &self.parameter_values {
            let _ = write!(out, "{name}={value};");
        }
        for (iface, child) in &self.satisfaction_of_required_interfaces {
            let _ = write!(out, "{iface}:");
            child.write_canonical(out);
            out.push(';');
        }
        out.push(')');
    }
}

impl std::fmt::Display for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_key())
    }
}
