//! Fiber-scheduled runtime engine for visual/data-flow graphs.
//!
//! A [`model::GraphAsset`] is hydrated against a [`registry::NodeRegistry`]
//! into a [`model::HydratedGraph`], which a [`scheduler::GraphRunner`] then
//! executes: one cooperative fiber per root, routing transitions through
//! sequential continuation or parallel fan-out, writing pin outputs to a
//! per-run [`scope::Scope`] and graph-level variables to a
//! [`scope::Blackboard`].

pub mod adapter;
pub mod context;
pub mod error;
pub mod logging;
pub mod model;
pub mod node;
pub mod nodes;
pub mod pin;
pub mod registry;
pub mod scheduler;
pub mod scope;
pub mod signal;

pub use adapter::{EventGateway, EventSubscription, GraphLibrary, HostAdapter, Services};
pub use context::ExecutionContext;
pub use error::{EngineError, NodeError};
pub use model::{
    hydrate, ConnectionKind, Endpoint, GraphAsset, HydratedGraph, HydratedNode, RootSpec,
    SerializedConnection, SerializedNode,
};
pub use node::{NodeBehavior, NodeResult, NodeStatus, Transition};
pub use pin::{PinDescriptor, PinDirection, PinSignal, TransitionStrategy};
pub use registry::{NodeDefinition, NodeRegistry, ParameterDescriptor};
pub use scheduler::{ExecutionHandle, GraphRunner, HydratedGraphHandle, RunStatus};
pub use scope::{Blackboard, Scope};
pub use signal::{ExecutionSignal, SignalEvent, SubscriptionToken};

pub use serde_json::Value;
