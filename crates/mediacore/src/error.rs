use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single node execution.
///
/// `Clone` because one failure can be observed by every branch that was
/// waiting on the same node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Circular dependency detected at node '{node_id}'")]
    CycleDetected { node_id: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Capability call timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl NodeError {
    /// Whether another attempt at the same capability call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            NodeError::Capability(e) => e.is_retryable(),
            NodeError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Errors raised by external services (LLM inference, media processing).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("API Key not found")]
    MissingCredentials,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl CapabilityError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CapabilityError::Transport(_) | CapabilityError::Unavailable(_) => true,
            CapabilityError::Status { status, .. } => *status == 429 || *status >= 500,
            CapabilityError::MissingCredentials | CapabilityError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Connection already exists: {from} -> {to}")]
    DuplicateEdge { from: String, to: String },

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// Members of one strongly connected component, in no particular order.
    #[error("Cyclic dependency among nodes: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Workflow cannot be changed while a run is in progress")]
    RunInProgress,
}
