//! Branch: routes to `true` or `false` based on a coerced condition (§4.9).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{coerce_bool, NodeBehavior, NodeResult, Transition};
use crate::pin::{PinDescriptor, TransitionStrategy};
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};

#[derive(Default)]
pub struct BranchNode {
    default_condition: bool,
}

#[async_trait]
impl NodeBehavior for BranchNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let condition = ctx
            .input("condition")
            .map(coerce_bool)
            .unwrap_or(self.default_condition);
        let pin = if condition { "true" } else { "false" };
        Ok(NodeResult::success().with_transition(Transition::sequential(pin)))
    }

    async fn on_fast_forward(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        self.on_execute(ctx).await
    }

    fn configure(&mut self, params: &HashMap<String, Value>) {
        self.default_condition = params
            .get("defaultCondition")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }
}

pub(crate) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("branch")
            .label("Branch")
            .pin(PinDescriptor::flow_in("in"))
            .pin(PinDescriptor::data_in("condition"))
            .pin(PinDescriptor::flow_out("true", TransitionStrategy::Sequential))
            .pin(PinDescriptor::flow_out("false", TransitionStrategy::Sequential))
            .parameter(ParameterDescriptor::new("defaultCondition").with_default(Value::Bool(false))),
        std::sync::Arc::new(|| Box::<BranchNode>::default()),
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
            node_id: "b".into(),
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
    async fn non_empty_string_is_truthy() {
        let mut c = ctx(HashMap::from([("condition".to_string(), json!("x"))]));
        let result = BranchNode::default().on_execute(&mut c).await.unwrap();
        assert_eq!(result.transitions.unwrap()[0].pin_id, "true");
    }

    #[tokio::test]
    async fn zero_is_falsy() {
        let mut c = ctx(HashMap::from([("condition".to_string(), json!(0))]));
        let result = BranchNode::default().on_execute(&mut c).await.unwrap();
        assert_eq!(result.transitions.unwrap()[0].pin_id, "false");
    }

    #[tokio::test]
    async fn missing_condition_defaults_to_false() {
        let mut c = ctx(HashMap::new());
        let result = BranchNode::default().on_execute(&mut c).await.unwrap();
        assert_eq!(result.transitions.unwrap()[0].pin_id, "false");
    }

    #[tokio::test]
    async fn missing_condition_falls_back_to_default_condition_parameter() {
        let mut node = BranchNode::default();
        node.configure(&HashMap::from([(
            "defaultCondition".to_string(),
            json!(true),
        )]));
        let mut c = ctx(HashMap::new());
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.transitions.unwrap()[0].pin_id, "true");
    }

    #[tokio::test]
    async fn wired_condition_overrides_default_condition_parameter() {
        let mut node = BranchNode::default();
        node.configure(&HashMap::from([(
            "defaultCondition".to_string(),
            json!(true),
        )]));
        let mut c = ctx(HashMap::from([("condition".to_string(), json!(false))]));
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.transitions.unwrap()[0].pin_id, "false");
    }
}
