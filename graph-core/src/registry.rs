//! Registry of node kinds: a process-wide, read-only-at-runtime mapping
//! from a node-type string to a constructor plus its declarative pin and
//! parameter schema.
//!
//! Per §9's "Polymorphism" note: nodes are represented as a dispatch table
//! over concrete types rather than as an inheritance hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::NodeBehavior;
use crate::pin::PinDescriptor;

/// A parameter a node instance can be configured with at hydration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl ParameterDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// The declarative schema for a registered node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Output pin used to route the node's continuation when its result
    /// doesn't specify transitions of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_output: Option<String>,
    pub pins: Vec<PinDescriptor>,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
}

impl NodeDefinition {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            label: None,
            description: None,
            default_output: None,
            pins: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn default_output(mut self, pin_id: impl Into<String>) -> Self {
        self.default_output = Some(pin_id.into());
        self
    }

    pub fn pin(mut self, pin: PinDescriptor) -> Self {
        self.pins.push(pin);
        self
    }

    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn find_pin(&self, pin_id: &str) -> Option<&PinDescriptor> {
        self.pins.iter().find(|p| p.id == pin_id)
    }
}

/// Constructs a fresh, unconfigured node instance.
pub type NodeConstructor = Arc<dyn Fn() -> Box<dyn NodeBehavior> + Send + Sync>;

/// Process-wide mapping from node-type string to definition + constructor.
/// Populated during authoring; treated as read-only once any run starts.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: HashMap<String, (NodeDefinition, NodeConstructor)>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: NodeDefinition, constructor: NodeConstructor) {
        self.entries
            .insert(definition.type_id.clone(), (definition, constructor));
    }

    pub fn get(&self, type_id: &str) -> Option<&(NodeDefinition, NodeConstructor)> {
        self.entries.get(type_id)
    }

    pub fn definition(&self, type_id: &str) -> Option<&NodeDefinition> {
        self.entries.get(type_id).map(|(def, _)| def)
    }

    /// Registers the built-in control nodes documented in §4.9.
    pub fn register_builtins(&mut self) -> &mut Self {
        crate::nodes::register_builtins(self);
        self
    }
}
