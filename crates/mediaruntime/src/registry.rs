use async_trait::async_trait;
use mediacore::{CapabilityError, NodeKind, TargetPort, Value};
use serde::Serialize;
use std::sync::Arc;

/// External LLM inference service.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    /// Provider identifier (e.g. "gemini", "echo")
    fn name(&self) -> &str;

    /// Generate text for `prompt`. `images` are URLs or base64 data URLs.
    async fn generate(
        &self,
        prompt: &str,
        images: &[String],
        system_prompt: Option<&str>,
    ) -> Result<String, CapabilityError>;
}

/// External media processing service (cropping, frame extraction).
#[async_trait]
pub trait MediaCapability: Send + Sync {
    fn name(&self) -> &str;

    async fn crop(&self, image: Value) -> Result<Value, CapabilityError>;

    async fn extract_frame(&self, video: Value) -> Result<Value, CapabilityError>;
}

/// The set of capabilities the executor calls out to.
#[derive(Clone)]
pub struct CapabilityRegistry {
    llm: Arc<dyn LlmCapability>,
    media: Arc<dyn MediaCapability>,
}

impl CapabilityRegistry {
    pub fn new(llm: Arc<dyn LlmCapability>, media: Arc<dyn MediaCapability>) -> Self {
        tracing::info!("Registering capabilities: llm={}, media={}", llm.name(), media.name());
        Self { llm, media }
    }

    pub fn llm(&self) -> &Arc<dyn LlmCapability> {
        &self.llm
    }

    pub fn media(&self) -> &Arc<dyn MediaCapability> {
        &self.media
    }

    /// Describe every node kind, for editors and the CLI.
    pub fn catalog(&self) -> Vec<NodeMetadata> {
        NodeKind::ALL.iter().map(|kind| NodeMetadata::for_kind(*kind)).collect()
    }
}

/// Metadata about a node kind
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetadata {
    pub kind: NodeKind,
    pub label: String,
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortDefinition {
    pub port: Option<TargetPort>,
    pub description: String,
    pub accepts: Vec<NodeKind>,
}

impl NodeMetadata {
    pub fn for_kind(kind: NodeKind) -> Self {
        let images = vec![NodeKind::UploadImage, NodeKind::CropImage, NodeKind::ExtractFrame];
        let (description, category, inputs) = match kind {
            NodeKind::Text => (
                "Static text, or the first upstream value when connected",
                "input",
                vec![PortDefinition::generic("Overrides the text", NodeKind::ALL.to_vec())],
            ),
            NodeKind::UploadImage => ("Uploaded image reference", "input", vec![]),
            NodeKind::UploadVideo => ("Uploaded video reference", "input", vec![]),
            NodeKind::RunLlm => (
                "Prompt an LLM with text and image inputs",
                "ai",
                vec![
                    PortDefinition {
                        port: Some(TargetPort::Text),
                        description: "Prompt fragments, joined by newlines".to_string(),
                        accepts: vec![NodeKind::Text, NodeKind::RunLlm],
                    },
                    PortDefinition {
                        port: Some(TargetPort::Image),
                        description: "Images attached to the prompt".to_string(),
                        accepts: images.clone(),
                    },
                ],
            ),
            NodeKind::CropImage => (
                "Crop an image",
                "media",
                vec![PortDefinition::generic("Image to crop", images)],
            ),
            NodeKind::ExtractFrame => (
                "Extract a frame from a video",
                "media",
                vec![PortDefinition::generic("Source video", vec![NodeKind::UploadVideo])],
            ),
        };

        Self {
            kind,
            label: kind.default_label().to_string(),
            description: description.to_string(),
            category: category.to_string(),
            inputs,
        }
    }
}

impl PortDefinition {
    fn generic(description: &str, accepts: Vec<NodeKind>) -> Self {
        Self {
            port: None,
            description: description.to_string(),
            accepts,
        }
    }
}
