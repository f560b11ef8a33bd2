//! Delay: sleeps for a configured duration, race-cancellable by the signal
//! (§4.9). The formal `NodeResult.status` enum has no `cancelled` variant, so
//! both the cancel and fast-forward interruption paths resolve to `skipped`
//! — the cancelled-equivalent result the base protocol already uses (§4.4).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeResult, Transition};
use crate::pin::{PinDescriptor, TransitionStrategy};
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};

#[derive(Default)]
pub struct DelayNode {
    ms: u64,
}

#[async_trait]
impl NodeBehavior for DelayNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        if ctx.signal.is_cancelled() || ctx.signal.is_fast_forward() {
            return Ok(NodeResult::skipped());
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.ms)) => {
                Ok(NodeResult::success().with_transition(Transition::sequential("next")))
            }
            _ = ctx.signal.cancelled() => {
                Ok(NodeResult::skipped())
            }
            _ = ctx.signal.fast_forwarded() => {
                Ok(NodeResult::skipped())
            }
        }
    }

    fn configure(&mut self, params: &std::collections::HashMap<String, Value>) {
        if let Some(ms) = params.get("ms").and_then(Value::as_u64) {
            self.ms = ms;
        }
    }
}

pub(crate) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("delay")
            .label("Delay")
            .pin(PinDescriptor::flow_in("in"))
            .pin(PinDescriptor::flow_out("next", TransitionStrategy::Sequential))
            .parameter(ParameterDescriptor::new("ms").with_default(Value::from(0))),
        std::sync::Arc::new(|| Box::<DelayNode>::default()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HostAdapter;
    use crate::scope::{Blackboard, Scope};
    use crate::signal::ExecutionSignal;
    use std::collections::HashMap;
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

    fn ctx(signal: ExecutionSignal) -> ExecutionContext {
        ExecutionContext {
            node_id: "d".into(),
            entity_id: "e".into(),
            adapter: Arc::new(NoopAdapter),
            scope: Arc::new(Scope::new()),
            blackboard: Arc::new(Blackboard::new()),
            signal,
            inputs: HashMap::new(),
            graph_library: None,
            services: None,
        }
    }

    #[tokio::test]
    async fn already_cancelled_skips_without_sleeping() {
        let signal = ExecutionSignal::new();
        signal.cancel(None);
        let mut c = ctx(signal);
        let node = DelayNode { ms: 10_000 };
        let result = tokio::time::timeout(Duration::from_millis(50), node.on_execute(&mut c))
            .await
            .expect("should not actually sleep")
            .unwrap();
        assert_eq!(result.status, crate::node::NodeStatus::Skipped);
    }

    #[tokio::test]
    async fn already_fast_forwarding_skips_without_sleeping() {
        let signal = ExecutionSignal::new();
        signal.set_fast_forward();
        let mut c = ctx(signal);
        let node = DelayNode { ms: 10_000 };
        let result = tokio::time::timeout(Duration::from_millis(50), node.on_execute(&mut c))
            .await
            .expect("should not actually sleep")
            .unwrap();
        assert_eq!(result.status, crate::node::NodeStatus::Skipped);
    }

    #[tokio::test]
    async fn completes_and_routes_next_when_not_interrupted() {
        let mut c = ctx(ExecutionSignal::new());
        let node = DelayNode { ms: 5 };
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.status, crate::node::NodeStatus::Success);
        assert_eq!(result.transitions.unwrap()[0].pin_id, "next");
    }

    #[tokio::test]
    async fn cancel_mid_sleep_resolves_promptly_as_skipped() {
        let signal = ExecutionSignal::new();
        let mut c = ctx(signal.clone());
        let node = DelayNode { ms: 10_000 };
        let run = tokio::spawn(async move { node.on_execute(&mut c).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        signal.cancel(None);
        let result = tokio::time::timeout(Duration::from_millis(200), run)
            .await
            .expect("cancellation should resolve promptly")
            .unwrap()
            .unwrap();
        assert_eq!(result.status, crate::node::NodeStatus::Skipped);
    }
}
