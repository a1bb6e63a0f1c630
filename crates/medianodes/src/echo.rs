use async_trait::async_trait;
use mediacore::CapabilityError;
use mediaruntime::LlmCapability;
use tokio::time::{sleep, Duration};

/// Offline LLM that logs its prompt and answers with it.
pub struct EchoLlm {
    latency: Duration,
}

impl EchoLlm {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
        }
    }

    /// Wait `latency` before answering, to mimic a remote call.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for EchoLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmCapability for EchoLlm {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        prompt: &str,
        images: &[String],
        system_prompt: Option<&str>,
    ) -> Result<String, CapabilityError> {
        tracing::info!("ECHO: {} ({} image(s))", prompt, images.len());
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let mut reply = String::new();
        if let Some(system) = system_prompt {
            reply.push_str(&format!("[{system}] "));
        }
        reply.push_str(prompt);
        if !images.is_empty() {
            reply.push_str(&format!(" (+{} image(s))", images.len()));
        }
        Ok(reply)
    }
}
