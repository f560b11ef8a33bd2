//! External interfaces the core consumes (§6): the host adapter, the graph
//! library, and the opaque services bag. All are collaborators supplied by
//! the embedding host; the core only calls through the trait objects below.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;
use crate::model::GraphAsset;
use crate::scheduler::HydratedGraphHandle;

/// The host's entity/component world (§6.1). The runner never inspects
/// component internals — it delegates action execution entirely.
#[async_trait]
pub trait HostAdapter: Send + Sync {
    async fn get_entity(&self, entity_id: &str) -> Option<Value>;
    async fn get_component(&self, entity_id: &str, component_type: &str) -> Option<Value>;
    async fn invoke_action(
        &self,
        entity_id: &str,
        component_type: &str,
        action_id: &str,
        args: Vec<Value>,
    ) -> Result<Value, String>;
}

/// A graph-id-keyed library of graph assets (§6.2), used by the subgraph and
/// on-event nodes. Unknown ids must fail with a clear error.
#[async_trait]
pub trait GraphLibrary: Send + Sync {
    fn get_asset(&self, graph_id: &str) -> Result<GraphAsset, EngineError>;
    async fn instantiate(&self, graph_id: &str) -> Result<HydratedGraphHandle, EngineError>;
}

/// An opaque capability bag passed through to node contexts (§6.3). The
/// runner imposes no schema; nodes probe it by string key and downcast to
/// the capability type they expect.
#[derive(Clone, Default)]
pub struct Services {
    capabilities: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: Arc<T>) {
        self.capabilities.insert(key.into(), value);
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.capabilities
            .get(key)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }
}

/// An event gateway capability (§4.10's On Event node): subscribe to a named
/// event, get a token back to unsubscribe with later.
pub trait EventGateway: Send + Sync {
    fn on(
        &self,
        event_name: &str,
        listener: Box<dyn Fn(Value) + Send + Sync>,
    ) -> EventSubscription;

    fn unsubscribe(&self, subscription: EventSubscription);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSubscription(pub u64);
