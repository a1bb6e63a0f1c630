//! Workflow execution runtime
//!
//! Resolves node dependencies, executes nodes against the registered
//! capabilities, and records each run in the history.

mod executor;
mod registry;
pub mod resolver;
mod retry;
mod runtime;

pub use executor::{compose_prompt, WorkflowExecutor};
pub use registry::{CapabilityRegistry, LlmCapability, MediaCapability, NodeMetadata, PortDefinition};
pub use resolver::{AncestorPath, ResolvedInputs};
pub use retry::call_with_retry;
pub use runtime::{FlowRuntime, RuntimeConfig};
