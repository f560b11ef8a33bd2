//! Run Subgraph: instantiates a graph from the library and runs it as a
//! nested `GraphRunner`, optionally sharing the parent's scope/blackboard
//! and awaiting the child to completion (§4.10).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeResult, Transition};
use crate::pin::{PinDescriptor, TransitionStrategy};
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};
use crate::scheduler::GraphRunner;

#[derive(Default)]
pub struct RunSubgraphNode {
    target_graph: Option<String>,
    share_scope: bool,
    share_blackboard: bool,
    await_completion: bool,
    args: Option<Value>,
}

#[async_trait]
impl NodeBehavior for RunSubgraphNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let target_graph = ctx
            .input("targetGraph")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.target_graph.clone());
        let Some(target_graph) = target_graph else {
            return Ok(NodeResult::failure(
                "RunSubgraph requires a target graph id",
            ));
        };

        let Some(library) = ctx.graph_library.clone() else {
            return Err(NodeError::Other(
                "graph library required but not configured".into(),
            ));
        };

        let handle = library
            .instantiate(&target_graph)
            .await
            .map_err(|e| NodeError::Other(e.to_string()))?;

        let mut runner = GraphRunner::new(handle.graph, ctx.adapter.clone(), ctx.entity_id.clone());
        if self.share_scope {
            runner = runner.with_scope(ctx.scope.clone());
        }
        if self.share_blackboard {
            runner = runner.with_blackboard(ctx.blackboard.clone());
        } else if let Some(Value::Object(args)) = self.args.clone() {
            let child_blackboard = crate::scope::Blackboard::new();
            for (key, value) in args {
                child_blackboard.set(key, value);
            }
            runner = runner.with_blackboard(std::sync::Arc::new(child_blackboard));
        }
        if let Some(services) = ctx.services.clone() {
            runner = runner.with_services(services);
        }

        let child = runner.run();

        if !self.await_completion {
            return Ok(NodeResult::success().with_transition(Transition::sequential("next")));
        }

        child.await_completion().await;
        if child.had_node_failure() {
            return Ok(NodeResult::failure(format!(
                "subgraph {target_graph} failed"
            )));
        }
        Ok(NodeResult::success()
            .with_output(
                "scope",
                Value::Object(
                    child
                        .scope()
                        .into_iter()
                        .collect::<serde_json::Map<String, Value>>(),
                ),
            )
            .with_transition(Transition::sequential("next")))
    }

    fn configure(&mut self, params: &HashMap<String, Value>) {
        self.target_graph = params
            .get("targetGraph")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.share_scope = params
            .get("shareScope")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.share_blackboard = params
            .get("shareBlackboard")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.await_completion = params
            .get("awaitCompletion")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        self.args = params.get("args").cloned();
    }
}

pub(crate) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("runSubgraph")
            .label("Run Subgraph")
            .pin(PinDescriptor::flow_in("in"))
            .pin(PinDescriptor::data_in("targetGraph"))
            .pin(PinDescriptor::data_out("scope"))
            .pin(PinDescriptor::flow_out("next", TransitionStrategy::Sequential))
            .parameter(ParameterDescriptor::new("targetGraph"))
            .parameter(ParameterDescriptor::new("shareScope").with_default(Value::Bool(false)))
            .parameter(ParameterDescriptor::new("shareBlackboard").with_default(Value::Bool(false)))
            .parameter(ParameterDescriptor::new("awaitCompletion").with_default(Value::Bool(true)))
            .parameter(ParameterDescriptor::new("args")),
        std::sync::Arc::new(|| Box::<RunSubgraphNode>::default()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{GraphLibrary, HostAdapter};
    use crate::model::{hydrate, GraphAsset, SerializedNode};
    use crate::node::NodeStatus;
    use crate::registry::NodeRegistry;
    use crate::scheduler::HydratedGraphHandle;
    use crate::scope::{Blackboard, Scope};
    use crate::signal::ExecutionSignal;
    use async_trait::async_trait;
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

    struct FailingLeaf;
    #[async_trait]
    impl NodeBehavior for FailingLeaf {
        async fn on_execute(&self, _ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
            Ok(NodeResult::failure("boom"))
        }
    }

    fn leaf_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register(
            NodeDefinition::new("failingLeaf").pin(PinDescriptor::flow_in("in")),
            Arc::new(|| Box::new(FailingLeaf)),
        );
        registry
    }

    fn leaf_asset() -> GraphAsset {
        GraphAsset {
            id: "child".into(),
            name: "child".into(),
            root: None,
            nodes: vec![SerializedNode {
                id: "leaf".into(),
                type_id: "failingLeaf".into(),
                params: HashMap::new(),
                inputs: HashMap::new(),
                entity_id: None,
                metadata: None,
            }],
            connections: vec![],
            metadata: None,
        }
    }

    struct FakeLibrary {
        registry: NodeRegistry,
    }

    #[async_trait]
    impl GraphLibrary for FakeLibrary {
        fn get_asset(&self, _graph_id: &str) -> Result<GraphAsset, crate::error::EngineError> {
            Ok(leaf_asset())
        }

        async fn instantiate(
            &self,
            graph_id: &str,
        ) -> Result<HydratedGraphHandle, crate::error::EngineError> {
            let asset = self.get_asset(graph_id)?;
            let hydrated = hydrate(&asset, &self.registry)?;
            Ok(HydratedGraphHandle {
                graph: Arc::new(hydrated),
            })
        }
    }

    fn ctx(library: Arc<dyn GraphLibrary>) -> ExecutionContext {
        ExecutionContext {
            node_id: "s".into(),
            entity_id: "e".into(),
            adapter: Arc::new(NoopAdapter),
            scope: Arc::new(Scope::new()),
            blackboard: Arc::new(Blackboard::new()),
            signal: ExecutionSignal::new(),
            inputs: HashMap::new(),
            graph_library: Some(library),
            services: None,
        }
    }

    #[tokio::test]
    async fn missing_target_graph_fails() {
        let node = RunSubgraphNode::default();
        let library: Arc<dyn GraphLibrary> = Arc::new(FakeLibrary {
            registry: leaf_registry(),
        });
        let mut c = ctx(library);
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.status, NodeStatus::Failure);
    }

    #[tokio::test]
    async fn child_failure_propagates_as_node_failure_when_awaited() {
        let mut node = RunSubgraphNode::default();
        node.configure(&HashMap::from([(
            "targetGraph".to_string(),
            json!("child"),
        )]));
        let library: Arc<dyn GraphLibrary> = Arc::new(FakeLibrary {
            registry: leaf_registry(),
        });
        let mut c = ctx(library);
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.status, NodeStatus::Failure);
    }

    #[tokio::test]
    async fn fire_and_forget_returns_success_immediately() {
        let mut node = RunSubgraphNode::default();
        node.configure(&HashMap::from([
            ("targetGraph".to_string(), json!("child")),
            ("awaitCompletion".to_string(), json!(false)),
        ]));
        let library: Arc<dyn GraphLibrary> = Arc::new(FakeLibrary {
            registry: leaf_registry(),
        });
        let mut c = ctx(library);
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.status, NodeStatus::Success);
    }
}
