//! Built-in control nodes (§4.9, §4.10).

mod branch;
mod delay;
mod loop_node;
mod on_event;
mod parallel;
mod run_subgraph;
mod variables;
mod wait_for;

pub use branch::BranchNode;
pub use delay::DelayNode;
pub use loop_node::LoopNode;
pub use on_event::OnEventNode;
pub use parallel::ParallelNode;
pub use run_subgraph::RunSubgraphNode;
pub use variables::{GetVariableNode, SetVariableNode};
pub use wait_for::WaitForNodesNode;

use crate::registry::NodeRegistry;

/// Registers every built-in node type onto a registry.
pub fn register_builtins(registry: &mut NodeRegistry) {
    branch::register(registry);
    delay::register(registry);
    loop_node::register(registry);
    on_event::register(registry);
    parallel::register(registry);
    run_subgraph::register(registry);
    variables::register_set(registry);
    variables::register_get(registry);
    wait_for::register(registry);
}
