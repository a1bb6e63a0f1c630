use crate::{RetryPolicy, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub type NodeId = String;

/// The six kinds of work a workflow node can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Text,
    UploadImage,
    UploadVideo,
    RunLlm,
    CropImage,
    ExtractFrame,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Text,
        NodeKind::UploadImage,
        NodeKind::UploadVideo,
        NodeKind::RunLlm,
        NodeKind::CropImage,
        NodeKind::ExtractFrame,
    ];

    /// What this kind produces on its output, as seen by the connection rules.
    pub fn port_class(self) -> PortClass {
        match self {
            NodeKind::UploadImage | NodeKind::CropImage | NodeKind::ExtractFrame => PortClass::Image,
            NodeKind::Text | NodeKind::RunLlm => PortClass::Text,
            NodeKind::UploadVideo => PortClass::Video,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Text => "text",
            NodeKind::UploadImage => "upload_image",
            NodeKind::UploadVideo => "upload_video",
            NodeKind::RunLlm => "run_llm",
            NodeKind::CropImage => "crop_image",
            NodeKind::ExtractFrame => "extract_frame",
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            NodeKind::Text => "Text",
            NodeKind::UploadImage => "Upload Image",
            NodeKind::UploadVideo => "Upload Video",
            NodeKind::RunLlm => "Run LLM",
            NodeKind::CropImage => "Crop Image",
            NodeKind::ExtractFrame => "Extract Frame",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output classification of a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortClass {
    Image,
    Text,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

/// A node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl Node {
    /// Create an idle node with a generated id and the kind's default label.
    pub fn new(kind: NodeKind) -> Self {
        let id = format!("{}-{}", kind, Uuid::new_v4().simple());
        Self::with_id(id, kind)
    }

    pub fn with_id(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: kind.default_label().to_string(),
            value: None,
            output: None,
            status: NodeStatus::Idle,
            error_message: None,
            config: HashMap::new(),
            position: None,
            retry_policy: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<Value>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.retry_policy = Some(RetryPolicy {
            max_attempts,
            delay_ms,
            backoff_multiplier: 1.0,
        });
        self
    }

    /// Apply a partial update. Fields left as `None` are untouched.
    pub fn apply(&mut self, update: NodeUpdate) {
        if let Some(label) = update.label {
            self.label = label;
        }
        if let Some(value) = update.value {
            self.value = Some(value);
        }
        if let Some(output) = update.output {
            self.output = Some(output);
        }
        if let Some(position) = update.position {
            self.position = Some(position);
        }
        self.config.extend(update.config);
    }

    pub(crate) fn set_running(&mut self) {
        self.status = NodeStatus::Running;
        self.error_message = None;
    }
}

/// Partial node update coming from the editing surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
