//! On Event: subscribes to a named event on the services' event gateway and
//! spawns an ephemeral child run per emission (§4.10).
//!
//! The gateway is looked up through `Services::get::<Arc<dyn EventGateway>>`
//! — the trait object is itself the concrete type stored under the
//! capability key, since `Services` downcasts to a concrete `T`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::adapter::EventGateway;
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeResult};
use crate::pin::PinDescriptor;
use crate::registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};
use crate::scheduler::GraphRunner;
use crate::scope::Blackboard;

const DEFAULT_SERVICES_KEY: &str = "events";

#[derive(Default)]
pub struct OnEventNode {
    event_name: Option<String>,
    target_graph: Option<String>,
    services_key: Option<String>,
    isolate_blackboard: bool,
    bind_payload_to: Option<String>,
}

#[async_trait]
impl NodeBehavior for OnEventNode {
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        let Some(event_name) = self.event_name.clone() else {
            return Ok(NodeResult::failure("OnEvent requires an eventName"));
        };
        let Some(target_graph) = self.target_graph.clone() else {
            return Ok(NodeResult::failure("OnEvent requires a targetGraph"));
        };
        let Some(services) = ctx.services.clone() else {
            return Err(NodeError::Other(
                "events capability not available in services".into(),
            ));
        };
        let key = self.services_key.as_deref().unwrap_or(DEFAULT_SERVICES_KEY);
        let Some(gateway) = services.get::<Arc<dyn EventGateway>>(key) else {
            return Err(NodeError::Other(
                "events capability not available in services".into(),
            ));
        };
        let gateway: Arc<dyn EventGateway> = (*gateway).clone();

        let Some(library) = ctx.graph_library.clone() else {
            return Err(NodeError::Other(
                "graph library required but not configured".into(),
            ));
        };

        let adapter = ctx.adapter.clone();
        let parent_blackboard = ctx.blackboard.clone();
        let isolate_blackboard = self.isolate_blackboard;
        let bind_payload_to = self.bind_payload_to.clone();
        let entity_id = ctx.entity_id.clone();
        let gateway_for_listener = gateway.clone();

        let subscription = gateway.on(
            &event_name,
            Box::new(move |payload: Value| {
                let library = library.clone();
                let adapter = adapter.clone();
                let parent_blackboard = parent_blackboard.clone();
                let bind_payload_to = bind_payload_to.clone();
                let target_graph = target_graph.clone();
                let entity_id = entity_id.clone();
                tokio::spawn(async move {
                    let Ok(handle) = library.instantiate(&target_graph).await else {
                        return;
                    };
                    let blackboard = if isolate_blackboard {
                        Arc::new(Blackboard::new())
                    } else {
                        parent_blackboard
                    };
                    if let Some(key) = bind_payload_to.as_deref() {
                        blackboard.set(key.to_string(), payload);
                    }
                    let runner = GraphRunner::new(handle.graph, adapter, entity_id)
                        .with_blackboard(blackboard);
                    runner.run();
                });
            }),
        );

        let subscription = Arc::new(AsyncMutex::new(Some(subscription)));
        let cleanup_subscription = subscription.clone();
        let cleanup_gateway = gateway_for_listener;
        ctx.signal.subscribe(move |_event| {
            let cleanup_subscription = cleanup_subscription.clone();
            let cleanup_gateway = cleanup_gateway.clone();
            tokio::spawn(async move {
                if let Some(token) = cleanup_subscription.lock().await.take() {
                    cleanup_gateway.unsubscribe(token);
                }
            });
        });

        ctx.signal.cancelled().await;
        Ok(NodeResult::skipped())
    }

    fn configure(&mut self, params: &HashMap<String, Value>) {
        self.event_name = params
            .get("eventName")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.target_graph = params
            .get("targetGraph")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.services_key = params
            .get("servicesKey")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.isolate_blackboard = params
            .get("isolateBlackboard")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.bind_payload_to = params
            .get("bindPayloadTo")
            .and_then(Value::as_str)
            .map(str::to_string);
    }
}

pub(crate) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeDefinition::new("onEvent")
            .label("On Event")
            .pin(PinDescriptor::flow_in("in"))
            .parameter(ParameterDescriptor::new("eventName"))
            .parameter(ParameterDescriptor::new("targetGraph"))
            .parameter(ParameterDescriptor::new("servicesKey"))
            .parameter(ParameterDescriptor::new("isolateBlackboard").with_default(Value::Bool(false)))
            .parameter(ParameterDescriptor::new("bindPayloadTo")),
        std::sync::Arc::new(|| Box::<OnEventNode>::default()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{EventSubscription, GraphLibrary, HostAdapter, Services};
    use crate::model::{hydrate, GraphAsset, SerializedNode};
    use crate::node::NodeStatus;
    use crate::registry::NodeRegistry;
    use crate::scheduler::HydratedGraphHandle;
    use crate::scope::Scope;
    use crate::signal::ExecutionSignal;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

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

    struct NoopLeaf;
    #[async_trait]
    impl NodeBehavior for NoopLeaf {
        async fn on_execute(&self, _ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
            Ok(NodeResult::success())
        }
    }

    fn fake_library() -> Arc<dyn GraphLibrary> {
        struct Lib {
            registry: NodeRegistry,
        }
        #[async_trait]
        impl GraphLibrary for Lib {
            fn get_asset(&self, _graph_id: &str) -> Result<GraphAsset, crate::error::EngineError> {
                Ok(GraphAsset {
                    id: "child".into(),
                    name: "child".into(),
                    root: None,
                    nodes: vec![SerializedNode {
                        id: "leaf".into(),
                        type_id: "noop".into(),
                        params: HashMap::new(),
                        inputs: HashMap::new(),
                        entity_id: None,
                        metadata: None,
                    }],
                    connections: vec![],
                    metadata: None,
                })
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
        let mut registry = NodeRegistry::new();
        registry.register(
            NodeDefinition::new("noop").pin(PinDescriptor::flow_in("in")),
            Arc::new(|| Box::new(NoopLeaf)),
        );
        Arc::new(Lib { registry })
    }

    #[derive(Default)]
    struct FakeGateway {
        listener: StdMutex<Option<(String, Box<dyn Fn(Value) + Send + Sync>)>>,
        unsubscribed: AtomicBool,
    }

    impl EventGateway for FakeGateway {
        fn on(
            &self,
            event_name: &str,
            listener: Box<dyn Fn(Value) + Send + Sync>,
        ) -> EventSubscription {
            *self.listener.lock().unwrap() = Some((event_name.to_string(), listener));
            EventSubscription(1)
        }

        fn unsubscribe(&self, _subscription: EventSubscription) {
            self.unsubscribed.store(true, Ordering::SeqCst);
        }
    }

    fn ctx_with(
        services: Option<Services>,
        library: Option<Arc<dyn GraphLibrary>>,
        signal: ExecutionSignal,
    ) -> ExecutionContext {
        ExecutionContext {
            node_id: "o".into(),
            entity_id: "e".into(),
            adapter: Arc::new(NoopAdapter),
            scope: Arc::new(Scope::new()),
            blackboard: Arc::new(crate::scope::Blackboard::new()),
            signal,
            inputs: HashMap::new(),
            graph_library: library,
            services,
        }
    }

    #[tokio::test]
    async fn missing_event_name_fails() {
        let node = OnEventNode::default();
        let mut c = ctx_with(None, None, ExecutionSignal::new());
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.status, NodeStatus::Failure);
    }

    #[tokio::test]
    async fn missing_target_graph_fails() {
        let mut node = OnEventNode::default();
        node.configure(&HashMap::from([("eventName".to_string(), json!("x"))]));
        let mut c = ctx_with(None, None, ExecutionSignal::new());
        let result = node.on_execute(&mut c).await.unwrap();
        assert_eq!(result.status, NodeStatus::Failure);
    }

    #[tokio::test]
    async fn missing_gateway_in_services_errors() {
        let mut node = OnEventNode::default();
        node.configure(&HashMap::from([
            ("eventName".to_string(), json!("x")),
            ("targetGraph".to_string(), json!("child")),
        ]));
        let mut c = ctx_with(Some(Services::new()), None, ExecutionSignal::new());
        let result = node.on_execute(&mut c).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancellation_unsubscribes_and_resolves_as_skipped() {
        let mut node = OnEventNode::default();
        node.configure(&HashMap::from([
            ("eventName".to_string(), json!("x")),
            ("targetGraph".to_string(), json!("child")),
        ]));
        let gateway = Arc::new(FakeGateway::default());
        let gateway_dyn: Arc<dyn EventGateway> = gateway.clone();
        let mut services = Services::new();
        services.insert::<Arc<dyn EventGateway>>("events", Arc::new(gateway_dyn));

        let signal = ExecutionSignal::new();
        let mut c = ctx_with(Some(services), Some(fake_library()), signal.clone());

        let run = tokio::spawn(async move { node.on_execute(&mut c).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(gateway.listener.lock().unwrap().is_some());

        signal.cancel(None);
        let result = tokio::time::timeout(Duration::from_millis(200), run)
            .await
            .expect("should resolve promptly")
            .unwrap()
            .unwrap();
        assert_eq!(result.status, NodeStatus::Skipped);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(gateway.unsubscribed.load(Ordering::SeqCst));
    }
}
