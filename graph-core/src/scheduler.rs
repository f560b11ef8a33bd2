//! The graph runner: spawns one fiber per root, routes transitions, tracks
//! completion counts and waiters, and exposes a handle for cancellation,
//! fast-forward, status inspection, and completion awaiting (§4.5–§4.8).
//!
//! Fibers are modeled as per-fiber cooperative tasks (§9's option (a)): each
//! fiber is a tokio task owning a FIFO queue. The ordering guarantees in §5
//! hold as specified when the runtime driving these tasks is single-threaded
//! (a current-thread `tokio::Runtime`, or a multi-thread one pinned to a
//! single worker) — nothing here spawns blocking work or takes a lock across
//! an `.await`, so cooperative interleaving is all that's required.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::adapter::{GraphLibrary, HostAdapter, Services};
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::logging::{
    log_fiber_spawn, log_node_complete, log_node_start, log_run_complete, log_run_error,
    log_run_start, log_scope_write,
};
use crate::model::{HydratedGraph, HydratedNode};
use crate::node::{NodeResult, Transition};
use crate::pin::TransitionStrategy;
use crate::scope::{Blackboard, Scope};
use crate::signal::{ExecutionSignal, SignalEvent};

/// Terminal and in-progress states of one run. Terminal states are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

fn is_terminal(status: RunStatus) -> bool {
    matches!(
        status,
        RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed
    )
}

/// A fiber queue entry: a node id paired with the entity it should run
/// against (§4.5's entity resolution chain).
#[derive(Debug, Clone)]
struct QueueItem {
    node_id: String,
    entity_id: String,
}

/// A fiber waiting on a node reaching `target_count` completions.
struct Waiter {
    target_count: u64,
    resolver: oneshot::Sender<()>,
}

/// Fast-forward opt-ins installed on a running or not-yet-run graph (§4.6).
#[derive(Default)]
pub struct FastForwardSet {
    node_ids: Mutex<HashSet<String>>,
    rules: Mutex<Vec<Box<dyn Fn(&str, &str) -> bool + Send + Sync>>>,
}

impl FastForwardSet {
    fn add_node(&self, node_id: String) {
        self.node_ids.lock().unwrap().insert(node_id);
    }

    fn add_rule(&self, rule: Box<dyn Fn(&str, &str) -> bool + Send + Sync>) {
        self.rules.lock().unwrap().push(rule);
    }

    fn matches(&self, node_id: &str, node_type: &str) -> bool {
        if self.node_ids.lock().unwrap().contains(node_id) {
            return true;
        }
        self.rules.lock().unwrap().iter().any(|rule| rule(node_id, node_type))
    }
}

/// State shared by every fiber of one run.
struct RunnerInner {
    graph: Arc<HydratedGraph>,
    adapter: Arc<dyn HostAdapter>,
    graph_library: Option<Arc<dyn GraphLibrary>>,
    services: Option<Services>,
    scope: Arc<Scope>,
    blackboard: Arc<Blackboard>,
    signal: ExecutionSignal,
    status: Mutex<RunStatus>,
    completion_counts: Mutex<HashMap<String, u64>>,
    waiters: Mutex<HashMap<String, Vec<Waiter>>>,
    fast_forward: FastForwardSet,
    failed: AtomicBool,
    /// Set when any node reports `NodeStatus::Failure`. Distinct from
    /// `failed`/the run's terminal status — a node-level failure doesn't
    /// cancel the run (§7), but a caller composing graphs (e.g. Run
    /// Subgraph) needs some way to observe it without parsing scope values.
    any_node_failed: AtomicBool,
    active_fibers: AtomicUsize,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl RunnerInner {
    fn new(
        graph: Arc<HydratedGraph>,
        adapter: Arc<dyn HostAdapter>,
        graph_library: Option<Arc<dyn GraphLibrary>>,
        services: Option<Services>,
        scope: Option<Arc<Scope>>,
        blackboard: Option<Arc<Blackboard>>,
    ) -> Arc<Self> {
        let (done_tx, done_rx) = watch::channel(false);
        let inner = Arc::new(Self {
            graph,
            adapter,
            graph_library,
            services,
            scope: scope.unwrap_or_else(|| Arc::new(Scope::new())),
            blackboard: blackboard.unwrap_or_else(|| Arc::new(Blackboard::new())),
            signal: ExecutionSignal::new(),
            status: Mutex::new(RunStatus::Idle),
            completion_counts: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            fast_forward: FastForwardSet::default(),
            failed: AtomicBool::new(false),
            any_node_failed: AtomicBool::new(false),
            active_fibers: AtomicUsize::new(0),
            done_tx,
            done_rx,
        });

        // All outstanding waiters must resolve the instant cancellation
        // latches, regardless of which fiber is holding them. A weak
        // reference keeps this subscription from pinning the run forever.
        let weak = Arc::downgrade(&inner);
        inner.signal.subscribe(move |event| {
            if matches!(event, SignalEvent::Cancelled(_)) {
                if let Some(inner) = weak.upgrade() {
                    inner.resolve_all_waiters();
                }
            }
        });

        inner
    }

    fn completion_count(&self, node_id: &str) -> u64 {
        *self.completion_counts.lock().unwrap().get(node_id).unwrap_or(&0)
    }

    fn mark_node_completed(&self, node_id: &str) {
        let new_count = {
            let mut counts = self.completion_counts.lock().unwrap();
            let entry = counts.entry(node_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let resolved = {
            let mut waiters = self.waiters.lock().unwrap();
            let Some(list) = waiters.get_mut(node_id) else {
                return;
            };
            let mut resolved = Vec::new();
            let mut i = 0;
            while i < list.len() {
                if list[i].target_count <= new_count {
                    resolved.push(list.remove(i));
                } else {
                    i += 1;
                }
            }
            resolved
        };
        for waiter in resolved {
            let _ = waiter.resolver.send(());
        }
    }

    fn resolve_all_waiters(&self) {
        let mut waiters = self.waiters.lock().unwrap();
        for (_, list) in waiters.drain() {
            for waiter in list {
                let _ = waiter.resolver.send(());
            }
        }
    }

    /// Registers waiters for a `waitFor` clause, failing fast on an unknown
    /// target (§4.7), then awaits them all.
    async fn await_waiters(&self, targets: &[String], wait_for_next: bool) -> Result<(), EngineError> {
        for id in targets {
            if self.graph.get_node(id).is_none() {
                return Err(EngineError::UnknownWaitTarget(id.clone()));
            }
        }
        let mut receivers = Vec::new();
        for id in targets {
            let current = self.completion_count(id);
            if !wait_for_next && current >= 1 {
                continue;
            }
            let target_count = if wait_for_next { current + 1 } else { 1 };
            let (tx, rx) = oneshot::channel();
            self.waiters
                .lock()
                .unwrap()
                .entry(id.clone())
                .or_default()
                .push(Waiter {
                    target_count,
                    resolver: tx,
                });
            receivers.push(rx);
        }
        for rx in receivers {
            let _ = rx.await;
        }
        Ok(())
    }

    fn finish(&self, status: RunStatus) {
        let mut current = self.status.lock().unwrap();
        if is_terminal(*current) {
            return;
        }
        *current = status;
        drop(current);
        log_run_complete(&self.graph.id, &status);
        let _ = self.done_tx.send(true);
    }

    fn on_fiber_finished(&self, result: Result<(), EngineError>) {
        if let Err(err) = result {
            self.failed.store(true, Ordering::SeqCst);
            log_run_error(&self.graph.id, &err);
            self.signal.cancel(Some(err.to_string()));
        }
        let remaining = self.active_fibers.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            // Failed takes precedence over cancelled even though the
            // failure itself triggered the cancel (§9, open question 2).
            let status = if self.failed.load(Ordering::SeqCst) {
                RunStatus::Failed
            } else if self.signal.is_cancelled() {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            };
            self.finish(status);
        }
    }

    fn cancel(&self, reason: Option<String>) {
        self.signal.cancel(reason);
        if self.active_fibers.load(Ordering::SeqCst) == 0 {
            self.finish(RunStatus::Cancelled);
        }
    }
}

fn resolve_entity(graph: &HydratedGraph, node_id: &str, fallback: &str) -> String {
    graph
        .get_node(node_id)
        .and_then(|n| n.entity_id.clone())
        .unwrap_or_else(|| fallback.to_string())
}

fn effective_transitions(node: &HydratedNode, result: &NodeResult) -> Vec<Transition> {
    if let Some(transitions) = &result.transitions {
        transitions.clone()
    } else if let Some(default_pin) = &node.definition.default_output {
        vec![Transition::sequential(default_pin.clone())]
    } else {
        Vec::new()
    }
}

fn spawn_fiber(inner: Arc<RunnerInner>, root: QueueItem) -> JoinHandle<()> {
    inner.active_fibers.fetch_add(1, Ordering::SeqCst);
    log_fiber_spawn(&root.node_id);
    tokio::spawn(async move {
        let mut queue = VecDeque::from([root]);
        let result = run_fiber(&inner, &mut queue).await;
        inner.on_fiber_finished(result);
    })
}

async fn run_fiber(inner: &Arc<RunnerInner>, queue: &mut VecDeque<QueueItem>) -> Result<(), EngineError> {
    while !inner.signal.is_cancelled() {
        let Some(item) = queue.pop_front() else {
            break;
        };
        let node = inner
            .graph
            .get_node(&item.node_id)
            .expect("queue items always reference a node in this graph");

        let inputs = inner.graph.build_inputs(&item.node_id, &inner.scope);
        let mut ctx = ExecutionContext {
            node_id: item.node_id.clone(),
            entity_id: item.entity_id.clone(),
            adapter: inner.adapter.clone(),
            scope: inner.scope.clone(),
            blackboard: inner.blackboard.clone(),
            signal: inner.signal.clone(),
            inputs,
            graph_library: inner.graph_library.clone(),
            services: inner.services.clone(),
        };

        log_node_start(&item.node_id, &node.type_id);

        let outcome = if inner.fast_forward.matches(&item.node_id, &node.type_id) {
            node.instance.on_fast_forward(&mut ctx).await
        } else {
            node.instance.execute(&mut ctx).await
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                inner.mark_node_completed(&item.node_id);
                return Err(err.into());
            }
        };

        log_node_complete(&item.node_id, &result.status);

        if result.status == crate::node::NodeStatus::Failure {
            inner.any_node_failed.store(true, Ordering::SeqCst);
        }

        if let Some(targets) = result.wait_for.clone() {
            if let Err(err) = inner.await_waiters(&targets, result.wait_for_next).await {
                inner.mark_node_completed(&item.node_id);
                return Err(err);
            }
            if inner.signal.is_cancelled() {
                inner.mark_node_completed(&item.node_id);
                break;
            }
        }

        for (pin_id, value) in &result.outputs {
            inner.scope.set(&item.node_id, pin_id, value.clone());
            log_scope_write(&item.node_id, pin_id);
        }

        let mut to_await = Vec::new();
        for transition in effective_transitions(node, &result) {
            let strategy = transition.strategy.unwrap_or_else(|| {
                node.definition
                    .find_pin(&transition.pin_id)
                    .and_then(|p| p.strategy)
                    .unwrap_or(TransitionStrategy::Sequential)
            });
            let targets = inner.graph.flow_targets(&item.node_id, &transition.pin_id);
            match strategy {
                TransitionStrategy::Sequential => {
                    let mut to_prepend = Vec::with_capacity(targets.len());
                    for target_id in &targets {
                        let entity_id = resolve_entity(&inner.graph, target_id, &item.entity_id);
                        to_prepend.push(QueueItem {
                            node_id: target_id.clone(),
                            entity_id,
                        });
                    }
                    for queue_item in to_prepend.into_iter().rev() {
                        queue.push_front(queue_item);
                    }
                }
                TransitionStrategy::Parallel => {
                    let await_completion = transition.await_completion.unwrap_or(true);
                    for target_id in &targets {
                        let entity_id = resolve_entity(&inner.graph, target_id, &item.entity_id);
                        let handle = spawn_fiber(
                            inner.clone(),
                            QueueItem {
                                node_id: target_id.clone(),
                                entity_id,
                            },
                        );
                        if await_completion {
                            to_await.push(handle);
                        }
                    }
                }
            }
        }
        for handle in to_await {
            let _ = handle.await;
        }

        inner.mark_node_completed(&item.node_id);
    }
    Ok(())
}

/// A graph runner not yet (or already) run. Configured once, then `run()`
/// any number of times — the second and later calls are a no-op that return
/// the handle for the run already in flight (§4.5).
pub struct GraphRunner {
    graph: Arc<HydratedGraph>,
    adapter: Arc<dyn HostAdapter>,
    graph_library: Option<Arc<dyn GraphLibrary>>,
    services: Option<Services>,
    scope: Option<Arc<Scope>>,
    blackboard: Option<Arc<Blackboard>>,
    default_entity_id: String,
    state: Mutex<RunState>,
}

enum RunState {
    Idle,
    Started(Arc<RunnerInner>),
}

impl GraphRunner {
    pub fn new(
        graph: Arc<HydratedGraph>,
        adapter: Arc<dyn HostAdapter>,
        default_entity_id: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            adapter,
            graph_library: None,
            services: None,
            scope: None,
            blackboard: None,
            default_entity_id: default_entity_id.into(),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn with_graph_library(mut self, library: Arc<dyn GraphLibrary>) -> Self {
        self.graph_library = Some(library);
        self
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    /// Shares an existing scope with this run instead of starting a fresh
    /// one — used by Run Subgraph when `shareScope` is set.
    pub fn with_scope(mut self, scope: Arc<Scope>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Shares an existing blackboard with this run instead of starting a
    /// fresh one — used by Run Subgraph when `shareBlackboard` is set.
    pub fn with_blackboard(mut self, blackboard: Arc<Blackboard>) -> Self {
        self.blackboard = Some(blackboard);
        self
    }

    pub fn run(&self) -> ExecutionHandle {
        let mut state = self.state.lock().unwrap();
        if let RunState::Started(inner) = &*state {
            return ExecutionHandle {
                inner: inner.clone(),
            };
        }

        let inner = RunnerInner::new(
            self.graph.clone(),
            self.adapter.clone(),
            self.graph_library.clone(),
            self.services.clone(),
            self.scope.clone(),
            self.blackboard.clone(),
        );
        *state = RunState::Started(inner.clone());
        drop(state);

        let roots = inner.graph.roots.clone();
        log_run_start(&inner.graph.id, roots.len());

        if roots.is_empty() {
            inner.finish(RunStatus::Completed);
            return ExecutionHandle { inner };
        }

        *inner.status.lock().unwrap() = RunStatus::Running;
        for root_id in roots {
            let entity_id = resolve_entity(&inner.graph, &root_id, &self.default_entity_id);
            spawn_fiber(
                inner.clone(),
                QueueItem {
                    node_id: root_id,
                    entity_id,
                },
            );
        }

        ExecutionHandle { inner }
    }
}

/// Handle to one run, returned by `GraphRunner::run` (§6.4).
#[derive(Clone)]
pub struct ExecutionHandle {
    inner: Arc<RunnerInner>,
}

impl ExecutionHandle {
    pub fn status(&self) -> RunStatus {
        *self.inner.status.lock().unwrap()
    }

    pub fn scope(&self) -> HashMap<String, Value> {
        self.inner.scope.snapshot()
    }

    /// Whether any node in this run reported `NodeStatus::Failure`. Distinct
    /// from `status() == Failed`, which only reflects an unhandled node
    /// error — used by Run Subgraph to translate a child's node-level
    /// failure into its own (§4.10, §7).
    pub fn had_node_failure(&self) -> bool {
        self.inner.any_node_failed.load(Ordering::SeqCst)
    }

    pub fn cancel(&self, reason: Option<String>) {
        self.inner.cancel(reason);
    }

    pub fn fast_forward_node(&self, node_id: impl Into<String>) {
        self.inner.fast_forward.add_node(node_id.into());
    }

    pub fn fast_forward_where(&self, rule: impl Fn(&str, &str) -> bool + Send + Sync + 'static) {
        self.inner.fast_forward.add_rule(Box::new(rule));
    }

    pub async fn await_completion(&self) {
        let mut rx = self.inner.done_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

/// What `GraphLibrary::instantiate` hands back: a ready-to-run hydrated
/// graph, without committing to any particular adapter or services (the
/// caller — typically the Run Subgraph or On Event node — supplies those
/// when it builds a `GraphRunner` around this).
pub struct HydratedGraphHandle {
    pub graph: Arc<HydratedGraph>,
}
