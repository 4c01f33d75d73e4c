//! OpenAI-compatible chat completion client.
//!
//! Works against LiteLLM proxies, Ollama's `/v1` endpoint and any other server
//! speaking the `/chat/completions` protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ResponderConfig;
use crate::error::LlmError;

/// HTTP-level timeout. Per-call arena timeouts are shorter and applied by the
/// controller.
const HTTP_TIMEOUT_SECS: u64 = 300;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user" or "assistant").
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampler seed, honoured by servers that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            seed: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl GenerationResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    /// Why generation stopped (e.g. "stop", "length").
    pub finish_reason: String,
}

/// Token usage statistics. Zero when the server does not report usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Anything that can complete a chat request.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl LiteLlmClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            http_client,
        })
    }

    /// Creates a client from the arena's responder settings.
    pub fn from_config(config: &ResponderConfig, default_model: &str) -> Result<Self, LlmError> {
        Self::new(config.api_base.clone(), config.api_key.clone(), default_model)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Maps a non-success HTTP response to an `LlmError`.
fn error_from_response(status_code: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    if status_code == 429 {
        LlmError::RateLimited(message)
    } else {
        LlmError::ApiError {
            code: status_code,
            message,
        }
    }
}

fn into_generation_response(api_response: ApiResponse) -> GenerationResponse {
    let choices = api_response
        .choices
        .into_iter()
        .map(|choice| Choice {
            index: choice.index,
            message: Message {
                role: choice.message.role,
                content: choice.message.content.unwrap_or_default(),
            },
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
        .collect();

    GenerationResponse {
        id: api_response.id,
        model: api_response.model,
        choices,
        usage: api_response.usage.unwrap_or_default(),
    }
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let mut request = request;
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }

        let url = format!("{}/chat/completions", self.api_base);
        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(error_from_response(status.as_u16(), &error_text));
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        tracing::trace!(model = %api_response.model, choices = api_response.choices.len(), "Completion received");
        Ok(into_generation_response(api_response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_skips_unset_fields() {
        let request = GenerationRequest::new("m", vec![Message::user("hi")]).with_temperature(0.7);
        let value = serde_json::to_value(&request).expect("serializable");
        assert_eq!(value["temperature"], 0.7);
        assert!(value.get("max_tokens").is_none());
        assert!(value.get("seed").is_none());
    }

    #[test]
    fn test_error_mapping() {
        let body = r#"{"error": {"message": "slow down", "type": "rate_limit"}}"#;
        assert!(matches!(error_from_response(429, body), LlmError::RateLimited(ref m) if m == "slow down"));
        assert!(matches!(
            error_from_response(500, "boom"),
            LlmError::ApiError { code: 500, ref message } if message == "boom"
        ));
    }

    #[test]
    fn test_ollama_style_response_without_usage() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "llama3.1:8b",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Courage."}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).expect("valid");
        let response = into_generation_response(parsed);
        assert_eq!(response.first_content(), Some("Courage."));
        assert_eq!(response.usage.total_tokens, 0);
        assert_eq!(response.choices[0].finish_reason, "stop");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = LiteLlmClient::new("http://localhost:11434/v1/", None, "m").expect("client");
        assert_eq!(client.api_base(), "http://localhost:11434/v1");
        assert!(!client.has_api_key());
        assert_eq!(client.default_model(), "m");
    }
}
