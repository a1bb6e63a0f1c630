use crate::executor::WorkflowExecutor;
use crate::registry::CapabilityRegistry;
use crate::resolver::{self, AncestorPath};
use chrono::Utc;
use futures::future::join_all;
use mediacore::{
    Connection, Edge, EdgeId, EventBus, ExecutionEvent, ExecutionRun, FlowError, History, Node,
    NodeId, NodeUpdate, RetryPolicy, RunId, RunScope, RunStatus, Workflow, WorkflowError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock, RwLockWriteGuard, Semaphore};
use uuid::Uuid;

/// Owns the workflow graph, the run history and the running flag, and
/// drives runs over it.
///
/// The graph is frozen for the duration of a run: every mutation is refused
/// with [`WorkflowError::RunInProgress`] until the run has been recorded.
pub struct FlowRuntime {
    workflow: Arc<RwLock<Workflow>>,
    capabilities: CapabilityRegistry,
    event_bus: Arc<EventBus>,
    history: Arc<RwLock<History>>,
    running: Arc<AtomicBool>,
    call_permits: Arc<Semaphore>,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a runtime over `workflow` with default settings
    pub fn new(workflow: Workflow, capabilities: CapabilityRegistry) -> Self {
        Self::with_config(workflow, capabilities, RuntimeConfig::default())
    }

    pub fn with_config(workflow: Workflow, capabilities: CapabilityRegistry, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let call_permits = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));

        Self {
            workflow: Arc::new(RwLock::new(workflow)),
            capabilities,
            event_bus,
            history: Arc::new(RwLock::new(History::new())),
            running: Arc::new(AtomicBool::new(false)),
            call_permits,
            config,
        }
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Snapshot of the current graph, including node status and outputs.
    pub async fn workflow(&self) -> Workflow {
        self.workflow.read().await.clone()
    }

    /// Write access to the graph, unless a run holds it.
    ///
    /// The flag is checked with the lock held. A run sets the flag before it
    /// first reads the graph, so an edit either lands before the run sees the
    /// graph or is refused.
    async fn editable(&self) -> Result<RwLockWriteGuard<'_, Workflow>, WorkflowError> {
        let workflow = self.workflow.write().await;
        if self.is_running() {
            return Err(WorkflowError::RunInProgress);
        }
        Ok(workflow)
    }

    /// Replace the whole graph.
    pub async fn load_workflow(&self, workflow: Workflow) -> Result<(), FlowError> {
        let mut current = self.editable().await?;
        tracing::info!("Loading workflow: {} ({} nodes)", workflow.name, workflow.nodes.len());
        *current = workflow;
        Ok(())
    }

    pub async fn node(&self, id: &str) -> Option<Node> {
        self.workflow.read().await.node(id).cloned()
    }

    pub async fn add_node(&self, node: Node) -> Result<NodeId, WorkflowError> {
        self.editable().await?.add_node(node)
    }

    /// Add an edge if it passes the connection rules.
    pub async fn add_edge(&self, connection: Connection) -> Result<EdgeId, WorkflowError> {
        self.editable().await?.add_edge(connection)
    }

    pub async fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node, WorkflowError> {
        self.editable().await?.update_node(id, update).cloned()
    }

    pub async fn remove_node(&self, id: &str) -> Result<Node, WorkflowError> {
        self.editable().await?.remove_node(id)
    }

    pub async fn remove_edge(&self, id: &str) -> Result<Edge, WorkflowError> {
        self.editable().await?.remove_edge(id)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run every terminal node. Returns `None` without doing anything when a
    /// run is already in progress.
    pub async fn run_workflow(&self) -> Option<ExecutionRun> {
        self.run(RunScope::Full, None).await
    }

    /// Run the given nodes and whatever they depend on.
    pub async fn run_nodes(&self, node_ids: Vec<NodeId>) -> Option<ExecutionRun> {
        self.run(RunScope::Partial, Some(node_ids)).await
    }

    pub async fn run_node(&self, node_id: impl Into<NodeId>) -> Option<ExecutionRun> {
        self.run(RunScope::Single, Some(vec![node_id.into()])).await
    }

    /// The run executes on its own task. Dropping the returned future stops
    /// the wait, not the run: it still finishes, is recorded, and releases
    /// the running flag.
    async fn run(&self, scope: RunScope, targets: Option<Vec<NodeId>>) -> Option<ExecutionRun> {
        let Some(guard) = RunGuard::acquire(&self.running) else {
            tracing::debug!("Run requested while another run is in progress; ignoring");
            return None;
        };

        let task = RunTask {
            workflow: Arc::clone(&self.workflow),
            capabilities: self.capabilities.clone(),
            event_bus: Arc::clone(&self.event_bus),
            history: Arc::clone(&self.history),
            call_permits: Arc::clone(&self.call_permits),
            config: self.config.clone(),
        };

        match tokio::spawn(task.run(guard, scope, targets)).await {
            Ok(run) => Some(run),
            Err(e) => {
                tracing::error!("Run task did not complete: {}", e);
                None
            }
        }
    }

    /// Return every node to idle and clear error messages, keeping outputs.
    pub async fn reset(&self) {
        self.workflow.write().await.reset();
        self.event_bus.emit(ExecutionEvent::WorkflowReset { timestamp: Utc::now() });
    }

    /// Recorded runs, most recent first.
    pub async fn history(&self) -> Vec<ExecutionRun> {
        self.history.read().await.runs().cloned().collect()
    }

    pub async fn run_record(&self, id: RunId) -> Option<ExecutionRun> {
        self.history.read().await.get(id).cloned()
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Everything one run needs, owned so the run can outlive its caller.
struct RunTask {
    workflow: Arc<RwLock<Workflow>>,
    capabilities: CapabilityRegistry,
    event_bus: Arc<EventBus>,
    history: Arc<RwLock<History>>,
    call_permits: Arc<Semaphore>,
    config: RuntimeConfig,
}

impl RunTask {
    async fn run(self, _guard: RunGuard, scope: RunScope, targets: Option<Vec<NodeId>>) -> ExecutionRun {
        let run_id = Uuid::new_v4();
        let timestamp = Utc::now();
        let start = Instant::now();

        let (targets, memoize) = {
            let workflow = self.workflow.read().await;
            let mut targets = targets.unwrap_or_else(|| workflow.terminal_nodes());
            let mut seen = HashSet::new();
            targets.retain(|id| seen.insert(id.clone()));
            let memoize = self.config.memoize_runs && resolver::upstream_is_acyclic(&workflow, &targets);
            (targets, memoize)
        };

        tracing::info!(
            "Starting {:?} run {} over {} target(s){}",
            scope,
            run_id,
            targets.len(),
            if memoize { "" } else { " without result sharing" }
        );
        self.event_bus.emit(ExecutionEvent::RunStarted {
            run_id,
            scope,
            targets: targets.clone(),
            timestamp,
        });

        let executor = WorkflowExecutor::new(
            run_id,
            Arc::clone(&self.workflow),
            self.capabilities.clone(),
            Arc::clone(&self.event_bus),
            self.config.clone(),
            Arc::clone(&self.call_permits),
        );
        let executor = Arc::new(if memoize { executor.memoized() } else { executor });

        let outcomes = join_all(
            targets
                .iter()
                .map(|id| executor.execute(id.clone(), AncestorPath::root())),
        )
        .await;

        let mut results = HashMap::new();
        let mut failures = 0;
        for (id, outcome) in targets.into_iter().zip(outcomes) {
            match outcome {
                Ok(value) => {
                    results.insert(id, value);
                }
                Err(e) => {
                    tracing::warn!("Target {} failed: {}", id, e);
                    failures += 1;
                }
            }
        }

        let status = if failures == 0 { RunStatus::Success } else { RunStatus::Failed };
        let duration_ms = start.elapsed().as_millis() as u64;
        let run = ExecutionRun {
            id: run_id,
            timestamp,
            status,
            duration_ms,
            scope,
            results,
        };

        self.history.write().await.record(run.clone());
        self.event_bus.emit(ExecutionEvent::RunCompleted {
            run_id,
            status,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!("Run {} finished: {:?} in {}ms", run_id, status, duration_ms);

        run
    }
}

/// Holds the running flag for the duration of a run, whatever its outcome.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Artificial wait before each node produces its output.
    pub simulated_latency: Duration,
    /// Per-attempt limit on a capability call.
    pub capability_timeout: Option<Duration>,
    /// Capability calls allowed in flight at once.
    pub max_concurrent_calls: usize,
    /// Applied to nodes without their own retry policy.
    pub retry: RetryPolicy,
    /// Share one execution per node across all branches of an acyclic run.
    pub memoize_runs: bool,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            simulated_latency: Duration::ZERO,
            capability_timeout: None,
            max_concurrent_calls: 10,
            retry: RetryPolicy::none(),
            memoize_runs: true,
            event_buffer_size: 1000,
        }
    }
}
