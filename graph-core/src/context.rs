//! Execution context: the per-invocation view given to a node.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::adapter::{GraphLibrary, HostAdapter, Services};
use crate::scope::{Blackboard, Scope};
use crate::signal::ExecutionSignal;

pub struct ExecutionContext {
    pub node_id: String,
    pub entity_id: String,
    pub adapter: Arc<dyn HostAdapter>,
    pub scope: Arc<Scope>,
    pub blackboard: Arc<Blackboard>,
    pub signal: ExecutionSignal,
    pub inputs: HashMap<String, Value>,
    pub graph_library: Option<Arc<dyn GraphLibrary>>,
    pub services: Option<Services>,
}

impl ExecutionContext {
    /// Reads a resolved input: the node's literal value overlaid with the
    /// latest data-connection source, as computed by `build_inputs`.
    pub fn input(&self, pin_id: &str) -> Option<&Value> {
        self.inputs.get(pin_id)
    }
}
