use async_trait::async_trait;
use mediacore::{CapabilityError, DataUrl};
use mediaruntime::LlmCapability;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const EMPTY_RESPONSE: &str = "No response received";

/// Connection settings for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
}

impl GeminiConfig {
    /// Read `GEMINI_API_KEY` (falling back to `API_KEY`), `GEMINI_MODEL`
    /// and `GEMINI_ENDPOINT`.
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());

        Self {
            api_key,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            endpoint: std::env::var("GEMINI_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// LLM capability backed by Gemini `generateContent`
pub struct GeminiLlm {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiLlm {
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl LlmCapability for GeminiLlm {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        images: &[String],
        system_prompt: Option<&str>,
    ) -> Result<String, CapabilityError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(CapabilityError::MissingCredentials)?;

        let body = GenerateContentRequest::new(prompt, images, system_prompt);
        tracing::debug!(
            "POST {} ({} image part(s))",
            self.url(),
            body.contents[0].parts.len() - 1
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::InvalidResponse(e.to_string()))?;

        Ok(parsed.text().unwrap_or_else(|| EMPTY_RESPONSE.to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl GenerateContentRequest {
    /// Image parts first, then the prompt text. Images that are not base64
    /// data URLs are skipped.
    pub fn new(prompt: &str, images: &[String], system_prompt: Option<&str>) -> Self {
        let mut parts: Vec<Part> = images
            .iter()
            .filter_map(|image| DataUrl::parse(image))
            .map(|url| Part::InlineData {
                inline_data: InlineData {
                    mime_type: url.mime_type.to_string(),
                    data: url.data.to_string(),
                },
            })
            .collect();
        parts.push(Part::Text {
            text: prompt.to_string(),
        });

        Self {
            contents: vec![Content { parts }],
            system_instruction: system_prompt
                .filter(|s| !s.is_empty())
                .map(|s| Content {
                    parts: vec![Part::Text { text: s.to_string() }],
                }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it has any.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect();
        (!text.is_empty()).then_some(text)
    }
}
