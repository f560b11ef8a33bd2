//! Engine error types.
//!
//! `EngineError` covers configuration failures that abort hydration or a run
//! outright (unknown node type, unknown wait target, missing graph library).
//! `NodeError` covers faults raised from inside a node body (host action
//! rejections, or a node choosing to treat something as unrecoverable rather
//! than reporting a `failure` status) — these propagate out of the node, up
//! into the owning fiber, and from there abort the whole run.

use thiserror::Error;

/// Fatal to hydration or to a run. Never produced by a node's own business logic.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("connection references unknown node: {0}")]
    UnknownConnectionNode(String),

    #[error("wait target is not a node in this graph: {0}")]
    UnknownWaitTarget(String),

    #[error("graph library required but not configured")]
    MissingGraphLibrary,

    #[error("unknown graph id: {0}")]
    UnknownGraphId(String),

    #[error("events capability not available in services")]
    MissingEventGateway,

    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Raised from inside a node's execution. Distinct from a node reporting
/// `NodeStatus::Failure` in its result: that is a normal, recoverable
/// outcome the node chose to report. A `NodeError` is unhandled — it tears
/// down the fiber and, through it, the whole run.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("host action failed: {0}")]
    HostFault(String),

    #[error("node execution failed: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display_unknown_node_type() {
        let err = EngineError::UnknownNodeType("widget".into());
        assert!(err.to_string().contains("widget"));
    }

    #[test]
    fn engine_error_wraps_node_error() {
        let err: EngineError = NodeError::HostFault("boom".into()).into();
        assert!(matches!(err, EngineError::Node(_)));
        assert!(err.to_string().contains("boom"));
    }
}
