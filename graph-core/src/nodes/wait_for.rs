//! Wait For Nodes: suspends the fiber until the union of its configured
//! and wired targets have each completed at least once more (§4.9).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeResult, Transition};
use crate::pin::{PinDescriptor, TransitionStrategy};
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};

#[derive(Default)]
pub struct WaitForNodesNode {
    targets: Vec<String>,
}

fn parse_targets(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .split([',', ' ', '\t', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl NodeBehavior for WaitForNodesNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let mut targets = self.targets.clone();
        if let Some(wired) = ctx.input("nodes") {
            for id in parse_targets(wired) {
                if !targets.contains(&id) {
                    targets.push(id);
                }
            }
        }

        if targets.is_empty() {
            return Ok(NodeResult::failure(
                "WaitForNodes requires at least one target node",
            ));
        }

        Ok(NodeResult::success()
            .with_wait_for(targets.clone(), false)
            .with_transition(Transition::sequential("next"))
            .with_output("nodes", Value::from(targets)))
    }

    fn configure(&mut self, params: &HashMap<String, Value>) {
        if let Some(v) = params.get("nodeIds") {
            self.targets = parse_targets(v);
        }
    }
}

pub(crate) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("waitForNodes")
            .label("Wait For Nodes")
            .pin(PinDescriptor::flow_in("in"))
            .pin(PinDescriptor::data_in("nodes"))
            .pin(PinDescriptor::data_out("nodes"))
            .pin(PinDescriptor::flow_out("next", TransitionStrategy::Sequential))
            .parameter(ParameterDescriptor::new("nodeIds")),
        std::sync::Arc::new(|| Box::<WaitForNodesNode>::default()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HostAdapter;
    use crate::scope::{Blackboard, Scope};
    use crate::signal::ExecutionSignal;
    use serde_json::json;
    use std::sync::Arc;

    struct NoopAdapter;
    #[async_trait]
    impl HostAdapter for NoopAdapter {
        async fn get_entity(&self, _: &str) -> Option<Value> {
            None
        }
        async fn get_component(&self, _: &str, _: &str) -> Option<Value> {
            None
        }
        async fn invoke_action(&self, _: &str, _: &str, _: &str, _: Vec<Value>) -> Result<Value, String> {
            Err("unused".into())
        }
    }

    fn ctx(inputs: HashMap<String, Value>) -> ExecutionContext {
        ExecutionContext {
            node_id: "w".into(),
            entity_id: "e".into(),
            adapter: Arc::new(NoopAdapter),
            scope: Arc::new(Scope::new()),
            blackboard: Arc::new(Blackboard::new()),
            signal: ExecutionSignal::new(),
            inputs,
            graph_library: None,
            services: None,
        }
    }

    #[tokio::test]
    async fn empty_targets_fails() {
        let node = WaitForNodesNode::default();
        let mut c = ctx(HashMap::new());
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.status, crate::node::NodeStatus::Failure);
    }

    #[tokio::test]
    async fn merges_configured_and_wired_targets_without_duplicates() {
        let mut node = WaitForNodesNode::default();
        node.configure(&HashMap::from([(
            "nodeIds".to_string(),
            json!("a, b"),
        )]));
        let mut c = ctx(HashMap::from([(
            "nodes".to_string(),
            json!(["b", "c"]),
        )]));
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.wait_for, Some(vec!["a".to_string(), "b".to_string(), "c".to_string()]));
        assert_eq!(
            result.outputs.get("nodes"),
            Some(&json!(["a", "b", "c"]))
        );
    }
}
