//! Node protocol: the behavior every registered node type implements.
//!
//! Aligns with the teacher's `Node<S>` trait (`async fn run(&self, state) ->
//! Result<(S, Next), AgentError>`), generalized from single-state-in/out to
//! this engine's pin-scoped inputs/outputs and explicit transition routing.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::pin::TransitionStrategy;

/// Outcome of one node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Running,
    Failure,
    Skipped,
}

/// A routing directive attached to a node's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub pin_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<TransitionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub await_completion: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Transition {
    pub fn sequential(pin_id: impl Into<String>) -> Self {
        Self {
            pin_id: pin_id.into(),
            strategy: Some(TransitionStrategy::Sequential),
            await_completion: None,
            group_id: None,
        }
    }

    pub fn parallel(pin_id: impl Into<String>, await_completion: bool) -> Self {
        Self {
            pin_id: pin_id.into(),
            strategy: Some(TransitionStrategy::Parallel),
            await_completion: Some(await_completion),
            group_id: None,
        }
    }
}

/// Result of one node invocation: status, produced outputs, outgoing
/// transitions, and an optional wait-for clause.
#[derive(Debug, Clone, Default)]
pub struct NodeResult {
    pub status: NodeStatus,
    pub outputs: HashMap<String, Value>,
    pub transitions: Option<Vec<Transition>>,
    pub wait_for: Option<Vec<String>>,
    pub wait_for_next: bool,
    pub message: Option<String>,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Success
    }
}

impl NodeResult {
    pub fn success() -> Self {
        Self {
            status: NodeStatus::Success,
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: NodeStatus::Skipped,
            ..Default::default()
        }
    }

    pub fn running() -> Self {
        Self {
            status: NodeStatus::Running,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failure,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, pin_id: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(pin_id.into(), value);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.get_or_insert_with(Vec::new).push(transition);
        self
    }

    pub fn with_transitions(mut self, transitions: Vec<Transition>) -> Self {
        self.transitions = Some(transitions);
        self
    }

    pub fn with_wait_for(mut self, targets: Vec<String>, wait_for_next: bool) -> Self {
        self.wait_for = Some(targets);
        self.wait_for_next = wait_for_next;
        self
    }
}

/// Behavior every registered node type implements.
///
/// `execute` is the entry point the scheduler calls under normal operation;
/// its default implementation is exactly §4.4's base protocol: a cancelled
/// signal short-circuits to a skipped result, a fast-forwarding signal
/// delegates to `on_fast_forward`, otherwise the subclass hook `on_execute`
/// runs. The scheduler itself may also call `on_fast_forward` directly when
/// a node matches its own fast-forward set (§4.6) — that bypasses `execute`
/// entirely, which is why the dispatch lives here as a provided method
/// rather than being folded into the scheduler.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// The node's effectful body. Runs once per invocation.
    async fn on_execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError>;

    /// What the node would have done, without doing it. Defaults to
    /// `skipped` with no transitions; override to emit the transitions the
    /// node would have taken so the graph keeps moving under fast-forward.
    async fn on_fast_forward(&self, _ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::skipped())
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<NodeResult, NodeError> {
        if ctx.signal.is_cancelled() {
            return Ok(NodeResult::skipped());
        }
        if ctx.signal.is_fast_forward() {
            return self.on_fast_forward(ctx).await;
        }
        self.on_execute(ctx).await
    }

    /// Binds parameter values onto a freshly constructed instance. Called
    /// once during hydration, never again — parameter state is not shared
    /// across runs.
    fn configure(&mut self, _params: &HashMap<String, Value>) {}
}

/// Coerces an opaque pin value to a boolean per §4.9: strings are truthy iff
/// non-empty, numbers truthy iff non-zero.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_bool_strings_truthy_iff_non_empty() {
        assert!(!coerce_bool(&Value::String("".into())));
        assert!(coerce_bool(&Value::String("x".into())));
    }

    #[test]
    fn coerce_bool_numbers_truthy_iff_non_zero() {
        assert!(!coerce_bool(&serde_json::json!(0)));
        assert!(coerce_bool(&serde_json::json!(1)));
        assert!(coerce_bool(&serde_json::json!(-0.5)));
    }

    #[test]
    fn node_result_builders_compose() {
        let r = NodeResult::success()
            .with_output("v", serde_json::json!("A"))
            .with_transition(Transition::sequential("next"));
        assert_eq!(r.status, NodeStatus::Success);
        assert_eq!(r.outputs.get("v").unwrap(), "A");
        assert_eq!(r.transitions.unwrap().len(), 1);
    }
}
