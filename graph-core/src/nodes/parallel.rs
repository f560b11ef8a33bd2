//! Parallel: emits up to four transitions, all forked with strategy
//! `parallel` (§4.9).

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeResult, Transition};
use crate::pin::{PinDescriptor, TransitionStrategy};
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};

const BRANCH_PINS: [&str; 4] = ["branchA", "branchB", "branchC", "branchD"];

#[derive(Default)]
pub struct ParallelNode {
    await_completion: bool,
}

impl ParallelNode {
    fn new_default_awaiting() -> Self {
        Self {
            await_completion: true,
        }
    }
}

#[async_trait]
impl NodeBehavior for ParallelNode {
    async fn on_execute(&self, _ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let transitions = BRANCH_PINS
            .iter()
            .map(|pin| Transition::parallel(*pin, self.await_completion))
            .collect();
        Ok(NodeResult::success().with_transitions(transitions))
    }

    fn configure(&mut self, params: &std::collections::HashMap<String, Value>) {
        if let Some(v) = params.get("awaitCompletion").and_then(Value::as_bool) {
            self.await_completion = v;
        }
    }
}

pub(crate) fn register(registry: &mut NodeRegistry) {
    let mut definition = NodeDefinition::new("parallel")
        .label("Parallel")
        .pin(PinDescriptor::flow_in("in"))
        .parameter(ParameterDescriptor::new("awaitCompletion").with_default(Value::Bool(true)));
    for pin in BRANCH_PINS {
        definition = definition.pin(PinDescriptor::flow_out(pin, TransitionStrategy::Parallel));
    }
    registry.register(
        definition,
        std::sync::Arc::new(|| Box::new(ParallelNode::new_default_awaiting())),
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

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            node_id: "p".into(),
            entity_id: "e".into(),
            adapter: Arc::new(NoopAdapter),
            scope: Arc::new(Scope::new()),
            blackboard: Arc::new(Blackboard::new()),
            signal: ExecutionSignal::new(),
            inputs: HashMap::new(),
            graph_library: None,
            services: None,
        }
    }

    #[tokio::test]
    async fn emits_all_four_branches_as_parallel() {
        let node = ParallelNode::new_default_awaiting();
        let mut c = ctx();
        let result = node.on_execute(&mut c).await.unwrap();
        let transitions = result.transitions.unwrap();
        assert_eq!(transitions.len(), 4);
        for t in &transitions {
            assert_eq!(t.strategy, Some(TransitionStrategy::Parallel));
            assert_eq!(t.await_completion, Some(true));
        }
    }

    #[tokio::test]
    async fn await_completion_false_is_applied_uniformly() {
        let mut node = ParallelNode::default();
        node.configure(&HashMap::from([(
            "awaitCompletion".to_string(),
            Value::Bool(false),
        )]));
        let mut c = ctx();
        let result = node.on_execute(&mut c).await.unwrap();
        for t in result.transitions.unwrap() {
            assert_eq!(t.await_completion, Some(false));
        }
    }
}
