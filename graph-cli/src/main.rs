//! Graph runner binary: loads a graph asset, runs it, prints the final
//! scope snapshot and terminal status.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use graph_core::{hydrate, GraphAsset, GraphRunner, HostAdapter, NodeRegistry};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "graph-cli")]
#[command(about = "Run a graph-core graph asset and print the result")]
struct Args {
    /// Path to a JSON graph asset
    asset_path: PathBuf,

    /// Entity id to run the graph against, when nodes don't specify their own
    #[arg(short, long, default_value = "demo-entity")]
    entity_id: String,

    /// Node ids to fast-forward from the start of the run (comma-separated)
    #[arg(long, value_delimiter = ',')]
    fast_forward: Vec<String>,

    /// Cancel the run after this many milliseconds, for demo/debug purposes
    #[arg(long)]
    cancel_after_ms: Option<u64>,
}

/// A host adapter with no backing entity world: entities/components always
/// resolve to `null`, and actions always fail. Enough to exercise a graph's
/// control flow without a real host attached.
struct DemoAdapter;

#[async_trait]
impl HostAdapter for DemoAdapter {
    async fn get_entity(&self, _entity_id: &str) -> Option<Value> {
        None
    }

    async fn get_component(&self, _entity_id: &str, _component_type: &str) -> Option<Value> {
        None
    }

    async fn invoke_action(
        &self,
        _entity_id: &str,
        component_type: &str,
        action_id: &str,
        _args: Vec<Value>,
    ) -> Result<Value, String> {
        Err(format!(
            "no host attached: cannot invoke {component_type}.{action_id}"
        ))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.asset_path)?;
    let asset: GraphAsset = serde_json::from_str(&raw)?;

    let mut registry = NodeRegistry::new();
    registry.register_builtins();

    let graph = hydrate(&asset, &registry)?;
    let runner = GraphRunner::new(Arc::new(graph), Arc::new(DemoAdapter), args.entity_id);
    let handle = runner.run();

    for node_id in &args.fast_forward {
        handle.fast_forward_node(node_id.clone());
    }

    if let Some(ms) = args.cancel_after_ms {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            handle.cancel(Some("cancel-after-ms elapsed".into()));
        });
    }

    handle.await_completion().await;

    println!("status: {:?}", handle.status());
    println!("scope:");
    println!("{}", serde_json::to_string_pretty(&handle.scope())?);

    if handle.status() == graph_core::RunStatus::Failed {
        std::process::exit(1);
    }

    Ok(())
}
