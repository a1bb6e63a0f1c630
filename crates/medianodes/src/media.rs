use async_trait::async_trait;
use mediacore::{CapabilityError, Value};
use mediaruntime::MediaCapability;

/// Frame reference returned when no extraction service is wired in.
pub const PLACEHOLDER_FRAME: &str = "https://picsum.photos/seed/weavy/800/450";

/// Media capability that leaves images untouched and returns a fixed
/// placeholder for extracted frames.
pub struct PassthroughMedia {
    frame: String,
}

impl PassthroughMedia {
    pub fn new() -> Self {
        Self::with_frame(PLACEHOLDER_FRAME)
    }

    pub fn with_frame(frame: impl Into<String>) -> Self {
        Self { frame: frame.into() }
    }
}

impl Default for PassthroughMedia {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaCapability for PassthroughMedia {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn crop(&self, image: Value) -> Result<Value, CapabilityError> {
        Ok(image)
    }

    async fn extract_frame(&self, video: Value) -> Result<Value, CapabilityError> {
        tracing::debug!("Extracting center frame from {}", video.to_text());
        Ok(Value::String(self.frame.clone()))
    }
}
