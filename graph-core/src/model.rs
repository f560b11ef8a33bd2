//! Graph model: the serialized asset format (§3, §6.5) and its hydration
//! (§4.1) into an immutable, run-ready form.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::node::NodeBehavior;
use crate::registry::{NodeDefinition, NodeRegistry};
use crate::scope::Scope;

/// `{ id, type, params?, inputs?, entityId?, metadata? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
    #[serde(default, rename = "entityId", skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// An endpoint reference `{ nodeId, pinId }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "pinId")]
    pub pin_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Flow,
    Data,
}

/// `{ kind, from: {nodeId,pinId}, to: {nodeId,pinId} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedConnection {
    pub kind: ConnectionKind,
    pub from: Endpoint,
    pub to: Endpoint,
}

/// Roots may be absent, a single id, or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RootSpec {
    Single(String),
    Many(Vec<String>),
}

/// `{ id, name, root?, nodes[], connections?, metadata? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphAsset {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<RootSpec>,
    pub nodes: Vec<SerializedNode>,
    #[serde(default)]
    pub connections: Vec<SerializedConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A hydrated node: a freshly constructed, parameter-bound instance plus the
/// declarative definition it was built from and its literal input fallbacks.
pub struct HydratedNode {
    pub id: String,
    pub type_id: String,
    pub entity_id: Option<String>,
    pub instance: Arc<dyn NodeBehavior>,
    pub definition: NodeDefinition,
    pub literal_inputs: HashMap<String, Value>,
}

/// An immutable hydrated form of a graph asset, ready to run.
pub struct HydratedGraph {
    pub id: String,
    nodes: HashMap<String, HydratedNode>,
    node_order: Vec<String>,
    /// `(from_node, from_pin) -> [to_node]`, insertion order preserved.
    flow_adjacency: HashMap<(String, String), Vec<String>>,
    /// `(to_node, to_pin) -> [(from_node, from_pin)]`, insertion order preserved.
    data_adjacency: HashMap<(String, String), Vec<(String, String)>>,
    pub roots: Vec<String>,
}

impl HydratedGraph {
    pub fn get_node(&self, id: &str) -> Option<&HydratedNode> {
        self.nodes.get(id)
    }

    pub fn list_node_ids(&self) -> Vec<String> {
        self.node_order.clone()
    }

    pub fn flow_targets(&self, from_node: &str, from_pin: &str) -> Vec<String> {
        self.flow_adjacency
            .get(&(from_node.to_string(), from_pin.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Builds the inputs map for one invocation: literal inputs overlaid
    /// with the latest scope value from each data-connection source. Later
    /// sources for the same pin overwrite earlier ones (§8's round-trip law).
    pub fn build_inputs(&self, node_id: &str, scope: &Scope) -> HashMap<String, Value> {
        let Some(node) = self.nodes.get(node_id) else {
            return HashMap::new();
        };
        let mut inputs = node.literal_inputs.clone();
        for pin_id in node.definition.pins.iter().map(|p| &p.id) {
            if let Some(sources) = self
                .data_adjacency
                .get(&(node_id.to_string(), pin_id.clone()))
            {
                for (from_node, from_pin) in sources {
                    if let Some(value) = scope.get(from_node, from_pin) {
                        inputs.insert(pin_id.clone(), value);
                    }
                }
            }
        }
        inputs
    }
}

/// Hydrates a serialized graph asset against a node registry (§4.1).
pub fn hydrate(asset: &GraphAsset, registry: &NodeRegistry) -> Result<HydratedGraph, EngineError> {
    let mut nodes = HashMap::with_capacity(asset.nodes.len());
    let mut node_order = Vec::with_capacity(asset.nodes.len());

    for serialized in &asset.nodes {
        let Some((definition, constructor)) = registry.get(&serialized.type_id) else {
            return Err(EngineError::UnknownNodeType(serialized.type_id.clone()));
        };
        let mut instance = constructor();
        let mut bound_params = HashMap::with_capacity(definition.parameters.len());
        for param in &definition.parameters {
            let value = serialized
                .params
                .get(&param.id)
                .cloned()
                .or_else(|| param.default_value.clone());
            if let Some(value) = value {
                bound_params.insert(param.id.clone(), value);
            }
        }
        instance.configure(&bound_params);

        node_order.push(serialized.id.clone());
        nodes.insert(
            serialized.id.clone(),
            HydratedNode {
                id: serialized.id.clone(),
                type_id: serialized.type_id.clone(),
                entity_id: serialized.entity_id.clone(),
                instance: Arc::from(instance),
                definition: definition.clone(),
                literal_inputs: serialized.inputs.clone(),
            },
        );
    }

    let mut flow_adjacency: HashMap<(String, String), Vec<String>> = HashMap::new();
    let mut data_adjacency: HashMap<(String, String), Vec<(String, String)>> = HashMap::new();
    let mut has_inbound_flow: HashMap<String, bool> = HashMap::new();

    for connection in &asset.connections {
        if !nodes.contains_key(&connection.from.node_id) {
            return Err(EngineError::UnknownConnectionNode(
                connection.from.node_id.clone(),
            ));
        }
        if !nodes.contains_key(&connection.to.node_id) {
            return Err(EngineError::UnknownConnectionNode(
                connection.to.node_id.clone(),
            ));
        }
        match connection.kind {
            ConnectionKind::Flow => {
                flow_adjacency
                    .entry((connection.from.node_id.clone(), connection.from.pin_id.clone()))
                    .or_default()
                    .push(connection.to.node_id.clone());
                has_inbound_flow.insert(connection.to.node_id.clone(), true);
            }
            ConnectionKind::Data => {
                data_adjacency
                    .entry((connection.to.node_id.clone(), connection.to.pin_id.clone()))
                    .or_default()
                    .push((connection.from.node_id.clone(), connection.from.pin_id.clone()));
            }
        }
    }

    let roots = resolve_roots(asset, &node_order, &has_inbound_flow);

    Ok(HydratedGraph {
        id: asset.id.clone(),
        nodes,
        node_order,
        flow_adjacency,
        data_adjacency,
        roots,
    })
}

fn resolve_roots(
    asset: &GraphAsset,
    node_order: &[String],
    has_inbound_flow: &HashMap<String, bool>,
) -> Vec<String> {
    if let Some(spec) = &asset.root {
        return match spec {
            RootSpec::Single(id) => vec![id.clone()],
            RootSpec::Many(ids) => ids.clone(),
        };
    }
    let computed: Vec<String> = node_order
        .iter()
        .filter(|id| !has_inbound_flow.contains_key(*id))
        .cloned()
        .collect();
    if !computed.is_empty() {
        return computed;
    }
    node_order.first().cloned().into_iter().collect()
}
