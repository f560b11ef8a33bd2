//! SetVariable / GetVariable: blackboard-backed graph-level variables
//! (§4.9).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeResult, Transition};
use crate::pin::{PinDescriptor, TransitionStrategy};
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};

#[derive(Default)]
pub struct SetVariableNode {
    key: Option<String>,
}

#[async_trait]
impl NodeBehavior for SetVariableNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let Some(key) = self.key.as_deref() else {
            return Ok(NodeResult::failure("SetVariable requires a key"));
        };
        let value = ctx.input("value").cloned().unwrap_or(Value::Null);
        ctx.blackboard.set(key.to_string(), value);
        Ok(NodeResult::success().with_transition(Transition::sequential("next")))
    }

    fn configure(&mut self, params: &HashMap<String, Value>) {
        self.key = params
            .get("key")
            .and_then(Value::as_str)
            .map(str::to_string);
    }
}

pub(crate) fn register_set(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("setVariable")
            .label("Set Variable")
            .pin(PinDescriptor::flow_in("in"))
            .pin(PinDescriptor::data_in("value"))
            .pin(PinDescriptor::flow_out("next", TransitionStrategy::Sequential))
            .parameter(ParameterDescriptor::new("key")),
        std::sync::Arc::new(|| Box::<SetVariableNode>::default()),
    );
}

#[derive(Default)]
pub struct GetVariableNode {
    key: Option<String>,
    default_value: Option<Value>,
}

#[async_trait]
impl NodeBehavior for GetVariableNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let Some(key) = self.key.as_deref() else {
            return Ok(NodeResult::failure("GetVariable requires a key"));
        };
        let value = ctx
            .blackboard
            .get(key)
            .or_else(|| self.default_value.clone())
            .unwrap_or(Value::Null);
        Ok(NodeResult::success()
            .with_output("value", value)
            .with_transition(Transition::sequential("next")))
    }

    fn configure(&mut self, params: &HashMap<String, Value>) {
        self.key = params
            .get("key")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.default_value = params.get("default").cloned();
    }
}

pub(crate) fn register_get(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("getVariable")
            .label("Get Variable")
            .pin(PinDescriptor::flow_in("in"))
            .pin(PinDescriptor::data_out("value"))
            .pin(PinDescriptor::flow_out("next", TransitionStrategy::Sequential))
            .parameter(ParameterDescriptor::new("key"))
            .parameter(ParameterDescriptor::new("default")),
        std::sync::Arc::new(|| Box::<GetVariableNode>::default()),
    );
}
