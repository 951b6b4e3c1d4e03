//! Signal Conventions and Port System
//!
//! This module defines the signal types, port definitions, and the type-erased
//! node interface that every element of a voice's signal graph implements.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a port within a node
pub type PortId = u32;

/// Unique identifier for a parameter within a node
pub type ParamId = u32;

/// Semantic signal classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Audio-rate signal, nominally ±1.0 full scale
    Audio,

    /// Frequency offset in Hz, summed onto a generator's base frequency
    Frequency,

    /// Linear control value summed onto a parameter (e.g. gain)
    Control,
}

/// Definition of a single port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Unique identifier within the node
    pub id: PortId,

    /// Human-readable name (e.g., "in", "gain", "frequency", "out")
    pub name: String,

    /// Signal type for validation and UI hints
    pub kind: SignalKind,

    /// Default value when no cable connected
    pub default: f64,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            default: 0.0,
        }
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = default;
        self
    }
}

/// Specification of all ports for a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

/// Runtime port values container
#[derive(Debug, Clone, Default)]
pub struct PortValues {
    pub values: HashMap<PortId, f64>,
}

impl PortValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PortId) -> Option<f64> {
        self.values.get(&id).copied()
    }

    pub fn get_or(&self, id: PortId, default: f64) -> f64 {
        self.values.get(&id).copied().unwrap_or(default)
    }

    pub fn set(&mut self, id: PortId, value: f64) {
        self.values.insert(id, value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Parameter definition for UI binding and introspection
#[derive(Debug, Clone, Serialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

/// Type-erased node interface for the signal graph
pub trait GraphModule: Send + Sync {
    /// Returns the node's port specification
    fn port_spec(&self) -> &PortSpec;

    /// Process one sample given port values
    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues);

    /// Reset internal state
    fn reset(&mut self);

    /// Set sample rate
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Get parameter definitions
    fn params(&self) -> &[ParamDef] {
        &[]
    }

    /// Get a parameter value
    fn get_param(&self, _id: ParamId) -> Option<f64> {
        None
    }

    /// Set a parameter value
    fn set_param(&mut self, _id: ParamId, _value: f64) {}

    /// Begin producing output. Only scheduled sources care.
    fn start(&mut self) {}

    /// Stop producing output permanently
    fn stop(&mut self) {}

    /// Whether the node currently produces output
    fn is_playing(&self) -> bool {
        true
    }

    /// Node type identifier
    fn type_id(&self) -> &'static str {
        "unknown"
    }
}
