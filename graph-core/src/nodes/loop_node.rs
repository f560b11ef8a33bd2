//! Loop: repeats `body` a fixed number of times before routing to
//! `complete`, keeping its counter in the blackboard under a
//! node-instance-scoped key so concurrent runs of the same graph don't
//! collide (§4.9).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeResult, Transition};
use crate::pin::{PinDescriptor, TransitionStrategy};
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};

#[derive(Default)]
pub struct LoopNode {
    count: u64,
    loop_key: Option<String>,
}

impl LoopNode {
    fn blackboard_key(&self, ctx: &ExecutionContext) -> String {
        let loop_key = self.loop_key.as_deref().unwrap_or("default");
        format!("loop:{}:{}", ctx.node_id, loop_key)
    }
}

#[async_trait]
impl NodeBehavior for LoopNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let key = self.blackboard_key(ctx);
        let index = ctx.blackboard.get(&key).and_then(|v| v.as_u64()).unwrap_or(0);

        if index >= self.count {
            ctx.blackboard.remove(&key);
            return Ok(NodeResult::success().with_transition(Transition::sequential("complete")));
        }

        ctx.blackboard.set(key, Value::from(index + 1));
        Ok(NodeResult::success()
            .with_output("index", Value::from(index))
            .with_transition(Transition::sequential("body")))
    }

    fn configure(&mut self, params: &HashMap<String, Value>) {
        if let Some(count) = params.get("count").and_then(Value::as_u64) {
            self.count = count;
        }
        self.loop_key = params
            .get("loopKey")
            .and_then(Value::as_str)
            .map(str::to_string);
    }
}

pub(crate) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("loop")
            .label("Loop")
            .pin(PinDescriptor::flow_in("in"))
            .pin(PinDescriptor::data_out("index"))
            .pin(PinDescriptor::flow_out("body", TransitionStrategy::Sequential))
            .pin(PinDescriptor::flow_out("complete", TransitionStrategy::Sequential))
            .parameter(ParameterDescriptor::new("count").with_default(Value::from(0)))
            .parameter(ParameterDescriptor::new("loopKey")),
        std::sync::Arc::new(|| Box::<LoopNode>::default()),
    );
}
