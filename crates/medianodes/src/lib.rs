//! Standard capability library
//!
//! Concrete LLM and media services the runtime can call out to.

mod echo;
mod gemini;
mod media;
mod samples;

pub use echo::EchoLlm;
pub use gemini::{
    GeminiConfig, GeminiLlm, GenerateContentRequest, GenerateContentResponse, DEFAULT_MODEL,
};
pub use media::{PassthroughMedia, PLACEHOLDER_FRAME};
pub use samples::product_marketing_kit;
use mediaruntime::CapabilityRegistry;

use std::sync::Arc;

/// Registry backed by Gemini, configured from the environment
pub fn gemini_registry() -> CapabilityRegistry {
    CapabilityRegistry::new(
        Arc::new(GeminiLlm::new(GeminiConfig::from_env())),
        Arc::new(PassthroughMedia::new()),
    )
}

/// Registry that never leaves the process
pub fn offline_registry() -> CapabilityRegistry {
    CapabilityRegistry::new(Arc::new(EchoLlm::new()), Arc::new(PassthroughMedia::new()))
}
