use crate::registry::CapabilityRegistry;
use crate::resolver::{AncestorPath, ResolvedInputs};
use crate::retry::call_with_retry;
use crate::RuntimeConfig;
use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use mediacore::{
    CapabilityError, Edge, EventBus, ExecutionEvent, Node, NodeError, NodeId, NodeKind, RunId,
    Value, Workflow,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, Semaphore};

type NodeResult = Result<Value, NodeError>;
type SharedResult = Shared<BoxFuture<'static, NodeResult>>;

/// Executes nodes for a single run by recursively resolving their inputs.
///
/// Dependencies run before the node that consumes them, siblings run
/// concurrently on the calling task. Node status, output and error message
/// are written back into the shared workflow as execution progresses.
pub struct WorkflowExecutor {
    run_id: RunId,
    workflow: Arc<RwLock<Workflow>>,
    capabilities: CapabilityRegistry,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
    call_permits: Arc<Semaphore>,
    memo: Option<Mutex<HashMap<NodeId, SharedResult>>>,
}

impl WorkflowExecutor {
    pub fn new(
        run_id: RunId,
        workflow: Arc<RwLock<Workflow>>,
        capabilities: CapabilityRegistry,
        event_bus: Arc<EventBus>,
        config: RuntimeConfig,
        call_permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            run_id,
            workflow,
            capabilities,
            event_bus,
            config,
            call_permits,
            memo: None,
        }
    }

    /// Execute each node at most once for this run, sharing its result with
    /// every branch that depends on it. Only sound on acyclic graphs: a
    /// branch waiting on its own in-flight result would never finish.
    pub fn memoized(mut self) -> Self {
        self.memo = Some(Mutex::new(HashMap::new()));
        self
    }

    /// Execute `node_id` after everything upstream of it.
    ///
    /// `path` holds the nodes currently being resolved above this one; meeting
    /// one of them again is a cycle and fails this branch.
    pub fn execute(self: &Arc<Self>, node_id: NodeId, path: AncestorPath) -> BoxFuture<'static, NodeResult> {
        let this = Arc::clone(self);
        async move {
            if path.contains(&node_id) {
                tracing::warn!("Circular dependency at node {} (depth {})", node_id, path.depth());
                return Err(NodeError::CycleDetected { node_id });
            }

            let Some(memo) = &this.memo else {
                return Arc::clone(&this).run_node(node_id, path).await;
            };

            let shared = {
                let mut memo = memo.lock().await;
                match memo.get(&node_id) {
                    Some(in_flight) => {
                        tracing::debug!("Reusing result of node {}", node_id);
                        in_flight.clone()
                    }
                    None => {
                        let fut = Arc::clone(&this)
                            .run_node(node_id.clone(), path)
                            .boxed()
                            .shared();
                        memo.insert(node_id, fut.clone());
                        fut
                    }
                }
            };
            shared.await
        }
        .boxed()
    }

    async fn run_node(self: Arc<Self>, node_id: NodeId, path: AncestorPath) -> NodeResult {
        let node = self.workflow.read().await.node(&node_id).cloned();
        let Some(node) = node else {
            if path.depth() == 0 {
                return Err(NodeError::NodeNotFound(node_id));
            }
            tracing::warn!("Edge references missing node {}, resolving to null", node_id);
            return Ok(Value::Null);
        };

        self.workflow.write().await.mark_running(&node_id);
        self.event_bus.emit(ExecutionEvent::NodeStarted {
            run_id: self.run_id,
            node_id: node_id.clone(),
            kind: node.kind,
            timestamp: Utc::now(),
        });
        tracing::debug!("Running node {} ({})", node_id, node.kind);

        let start = Instant::now();
        let result = self.resolve_and_dispatch(&node, path.extend(node_id.clone())).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => {
                self.workflow.write().await.mark_success(&node_id, output.clone());
                tracing::info!("Node {} completed in {}ms", node_id, duration_ms);
                self.event_bus.emit(ExecutionEvent::NodeCompleted {
                    run_id: self.run_id,
                    node_id,
                    output: output.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                self.workflow.write().await.mark_error(&node_id, e.to_string());
                tracing::error!("Node {} failed: {}", node_id, e);
                self.event_bus.emit(ExecutionEvent::NodeFailed {
                    run_id: self.run_id,
                    node_id,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    async fn resolve_and_dispatch(self: &Arc<Self>, node: &Node, path: AncestorPath) -> NodeResult {
        let edges: Vec<Edge> = self.workflow.read().await.incoming_edges(&node.id).cloned().collect();

        // Every dependency settles before the first failure is reported, so no
        // upstream node is left marked as running.
        let results = join_all(
            edges
                .iter()
                .map(|edge| self.execute(edge.source.clone(), path.clone())),
        )
        .await;

        let mut inputs = ResolvedInputs::default();
        for (edge, result) in edges.iter().zip(results) {
            inputs.push(edge.target_port, result?);
        }

        if !self.config.simulated_latency.is_zero() {
            tokio::time::sleep(self.config.simulated_latency).await;
        }

        self.dispatch(node, inputs).await
    }

    async fn dispatch(&self, node: &Node, inputs: ResolvedInputs) -> NodeResult {
        match node.kind {
            NodeKind::RunLlm => {
                let prompt = compose_prompt(&inputs.text, node.value.as_deref());
                let images: Vec<String> = inputs
                    .image
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                let system_prompt = node
                    .config
                    .get("system_prompt")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty());
                self.event_bus
                    .create_emitter(self.run_id, node.id.clone())
                    .info(format!(
                        "Prompting {} with {} text input(s) and {} image(s)",
                        self.capabilities.llm().name(),
                        inputs.text.len(),
                        images.len()
                    ));
                let llm = self.capabilities.llm();

                let text = self
                    .invoke(node, || llm.generate(&prompt, &images, system_prompt))
                    .await?;
                Ok(Value::String(text))
            }
            NodeKind::CropImage => match inputs.first_generic() {
                Some(image) => {
                    let media = self.capabilities.media();
                    self.invoke(node, || media.crop(image.clone())).await
                }
                None => Ok(node.output.clone().unwrap_or_default()),
            },
            NodeKind::ExtractFrame => {
                let video = inputs.generic.first().cloned().unwrap_or_default();
                let media = self.capabilities.media();
                self.invoke(node, || media.extract_frame(video.clone())).await
            }
            NodeKind::Text => Ok(inputs
                .first_generic()
                .cloned()
                .or_else(|| node.value.clone().map(Value::String))
                .unwrap_or_default()),
            NodeKind::UploadImage | NodeKind::UploadVideo => Ok(node.output.clone().unwrap_or_default()),
        }
    }

    /// One capability call: bounded by the shared call permits, the
    /// configured timeout and the node's retry policy.
    async fn invoke<T, F, Fut>(&self, node: &Node, call: F) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let _permit = self
            .call_permits
            .acquire()
            .await
            .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;

        let policy = node.retry_policy.as_ref().unwrap_or(&self.config.retry);
        let events = self.event_bus.create_emitter(self.run_id, node.id.clone());
        call_with_retry(policy, self.config.capability_timeout, &events, call).await
    }
}

/// Build an LLM prompt: upstream text in edge order, then the node's own
/// text, skipping empty entries, one per line.
pub fn compose_prompt(text_inputs: &[Value], own_value: Option<&str>) -> String {
    text_inputs
        .iter()
        .filter(|v| v.is_truthy())
        .map(Value::to_text)
        .chain(own_value.filter(|v| !v.is_empty()).map(str::to_string))
        .collect::<Vec<_>>()
        .join("\n")
}
