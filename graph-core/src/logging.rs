//! Structured logging for graph execution.
//!
//! Mirrors the teacher's `graph::logging` shape: one function per lifecycle
//! event, each gated on the `tracing` feature with an `eprintln!` fallback so
//! the engine works the same with or without an observability stack wired in.

pub fn log_run_start(graph_id: &str, root_count: usize) {
    #[cfg(feature = "tracing")]
    tracing::info!(graph_id, root_count, "starting graph run");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[INFO] starting graph run: graph_id={graph_id} roots={root_count}");
}

pub fn log_fiber_spawn(node_id: &str) {
    #[cfg(feature = "tracing")]
    tracing::debug!(node_id, "spawning fiber");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[DEBUG] spawning fiber rooted at {node_id}");
}

pub fn log_node_start(node_id: &str, node_type: &str) {
    #[cfg(feature = "tracing")]
    tracing::debug!(node_id, node_type, "node start");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[DEBUG] node start: id={node_id} type={node_type}");
}

pub fn log_node_complete(node_id: &str, status: &crate::node::NodeStatus) {
    #[cfg(feature = "tracing")]
    tracing::debug!(node_id, ?status, "node complete");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[DEBUG] node complete: id={node_id} status={status:?}");
}

pub fn log_scope_write(node_id: &str, pin_id: &str) {
    #[cfg(feature = "tracing")]
    tracing::trace!(node_id, pin_id, "scope write");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[TRACE] scope write: {node_id}:{pin_id}");
}

pub fn log_run_complete(graph_id: &str, status: &crate::scheduler::RunStatus) {
    #[cfg(feature = "tracing")]
    tracing::info!(graph_id, ?status, "graph run complete");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[INFO] graph run complete: graph_id={graph_id} status={status:?}");
}

pub fn log_run_error(graph_id: &str, error: &crate::error::EngineError) {
    #[cfg(feature = "tracing")]
    tracing::error!(graph_id, %error, "graph run error");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[ERROR] graph run error: graph_id={graph_id} error={error}");
}

pub fn log_subscriber_panic(event: &str) {
    #[cfg(feature = "tracing")]
    tracing::warn!(event, "signal subscriber panicked, ignoring");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[WARN] signal subscriber panicked on event={event}, ignoring");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_functions_do_not_panic() {
        log_run_start("g1", 2);
        log_fiber_spawn("n1");
        log_node_start("n1", "branch");
        log_node_complete("n1", &crate::node::NodeStatus::Success);
        log_scope_write("n1", "out");
        log_run_complete("g1", &crate::scheduler::RunStatus::Completed);
        log_run_error(
            "g1",
            &crate::error::EngineError::UnknownNodeType("x".into()),
        );
        log_subscriber_panic("cancel");
    }
}
