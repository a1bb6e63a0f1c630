// crates/mediaruntime/tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use mediacore::{CapabilityError, ExecutionEvent, Node, NodeKind, TargetPort, Value, Workflow};
use mediaruntime::{CapabilityRegistry, FlowRuntime, LlmCapability, MediaCapability, RuntimeConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

pub const FRAME: &str = "frame://center";
pub const PRODUCT_PHOTO: &str = "https://picsum.photos/seed/product/400/300";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmCall {
    pub prompt: String,
    pub images: Vec<String>,
    pub system_prompt: Option<String>,
}

/// LLM fake that records every call and answers from a script.
/// Once the script runs out it answers with "generated: <prompt>".
#[derive(Default)]
pub struct ScriptedLlm {
    calls: Mutex<Vec<LlmCall>>,
    script: Mutex<VecDeque<Result<String, CapabilityError>>>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, reply: Result<String, CapabilityError>) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn push(&self, reply: Result<String, CapabilityError>) {
        self.script.lock().unwrap().push_back(reply);
    }

    /// Block every call until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Notified whenever a call starts.
    pub fn entered(&self) -> Arc<Notify> {
        Arc::clone(&self.entered)
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmCapability for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        images: &[String],
        system_prompt: Option<&str>,
    ) -> Result<String, CapabilityError> {
        self.calls.lock().unwrap().push(LlmCall {
            prompt: prompt.to_string(),
            images: images.to_vec(),
            system_prompt: system_prompt.map(str::to_string),
        });
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(format!("generated: {prompt}")))
    }
}

/// Media fake: crop passes through, frame extraction returns [`FRAME`].
#[derive(Default)]
pub struct FakeMedia {
    pub crops: AtomicUsize,
}

#[async_trait]
impl MediaCapability for FakeMedia {
    fn name(&self) -> &str {
        "fake"
    }

    async fn crop(&self, image: Value) -> Result<Value, CapabilityError> {
        self.crops.fetch_add(1, Ordering::SeqCst);
        Ok(image)
    }

    async fn extract_frame(&self, _video: Value) -> Result<Value, CapabilityError> {
        Ok(Value::from(FRAME))
    }
}

pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        retry: mediacore::RetryPolicy::none(),
        ..RuntimeConfig::default()
    }
}

pub fn runtime_with(workflow: Workflow, llm: Arc<ScriptedLlm>) -> FlowRuntime {
    runtime_with_config(workflow, llm, test_config())
}

pub fn runtime_with_config(workflow: Workflow, llm: Arc<ScriptedLlm>, config: RuntimeConfig) -> FlowRuntime {
    let registry = CapabilityRegistry::new(llm, Arc::new(FakeMedia::default()));
    FlowRuntime::with_config(workflow, registry, config)
}

/// The "Product Marketing Kit" graph: a cropped photo, a video frame and
/// two text fragments converging on one LLM node.
pub fn marketing_kit() -> Workflow {
    let mut workflow = Workflow::new("Product Marketing Kit Generator");
    let nodes = [
        Node::with_id("img-1", NodeKind::UploadImage)
            .with_label("Product Photo")
            .with_output(PRODUCT_PHOTO),
        Node::with_id("crop-1", NodeKind::CropImage).with_label("Center Crop"),
        Node::with_id("txt-1", NodeKind::Text).with_value("persona string"),
        Node::with_id("txt-2", NodeKind::Text).with_value("details string"),
        Node::with_id("vid-1", NodeKind::UploadVideo).with_output("https://example.com/promo.mp4"),
        Node::with_id("frame-1", NodeKind::ExtractFrame),
        Node::with_id("llm-1", NodeKind::RunLlm).with_label("Generate Ad Content"),
    ];
    for node in nodes {
        workflow.add_node(node).unwrap();
    }

    workflow.connect("img-1", "crop-1", None).unwrap();
    workflow.connect("crop-1", "llm-1", Some(TargetPort::Image)).unwrap();
    workflow.connect("txt-1", "llm-1", Some(TargetPort::Text)).unwrap();
    workflow.connect("txt-2", "llm-1", Some(TargetPort::Text)).unwrap();
    workflow.connect("vid-1", "frame-1", None).unwrap();
    workflow.connect("frame-1", "llm-1", Some(TargetPort::Image)).unwrap();
    workflow
}

/// Drain every event currently buffered on `events`.
pub fn drain(events: &mut broadcast::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn started(events: &[ExecutionEvent], node: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::NodeStarted { node_id, .. } if node_id == node))
        .count()
}
