//! Scope and blackboard: the two per-run key/value stores.
//!
//! Scope is keyed by `(node_id, pin_id)` — last-write-wins pin-level
//! dataflow. Blackboard is keyed by free-form strings — graph-level shared
//! variables (used by Set/Get Variable and the Loop node's own counters).
//! Neither is shared across runs; both are discarded when the run ends.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Per-run store of last-produced pin output values.
#[derive(Default)]
pub struct Scope {
    values: Mutex<HashMap<(String, String), Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str, pin_id: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap()
            .get(&(node_id.to_string(), pin_id.to_string()))
            .cloned()
    }

    pub fn set(&self, node_id: &str, pin_id: &str, value: Value) {
        self.values
            .lock()
            .unwrap()
            .insert((node_id.to_string(), pin_id.to_string()), value);
    }

    /// A flat `"nodeId:pinId" -> value` snapshot, per §6.4.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values
            .lock()
            .unwrap()
            .iter()
            .map(|((node_id, pin_id), value)| (format!("{node_id}:{pin_id}"), value.clone()))
            .collect()
    }
}

/// Per-run, graph-level string-keyed variable store.
#[derive(Default)]
pub struct Blackboard {
    values: Mutex<HashMap<String, Value>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.lock().unwrap().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}
