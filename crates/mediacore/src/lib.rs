//! Core abstractions for the media workflow engine
//!
//! Graph model, connection rules, run history, values, errors and the
//! execution event bus. Everything here is free of execution logic.

mod error;
pub mod events;
pub mod history;
mod node;
pub mod validator;
mod value;
mod workflow;

pub use error::{CapabilityError, FlowError, NodeError, WorkflowError};
pub use events::*;
pub use history::{ExecutionRun, History, RunId, RunScope, RunStatus};
pub use node::{Node, NodeId, NodeKind, NodeStatus, NodeUpdate, PortClass, Position};
pub use validator::{is_valid_connection, validate_connection};
pub use value::{DataUrl, Value};
pub use workflow::{Connection, Edge, EdgeId, RetryPolicy, TargetPort, Workflow, WorkflowId};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
