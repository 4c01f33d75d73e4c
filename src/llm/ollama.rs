//! Model catalog for Ollama-style runtimes (`GET /api/tags`).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

const CATALOG_TIMEOUT_SECS: u64 = 10;

/// One locally available model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Result of a responder health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub base_url: String,
    pub model: String,
    pub model_available: bool,
    pub available_models: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.model_available
    }
}

/// Lists models served by the responder runtime.
pub struct ModelCatalog {
    base_url: String,
    http_client: Client,
}

impl ModelCatalog {
    /// Creates a catalog for `api_base`; a trailing `/v1` is stripped.
    pub fn new(api_base: &str) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(CATALOG_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: catalog_base(api_base),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        parse_tags(&body)
    }

    /// Checks the runtime is reachable and serves `model`.
    ///
    /// An unreachable runtime is an error; a missing model is reported in the
    /// returned [`HealthReport`].
    pub async fn health_check(&self, model: &str) -> Result<HealthReport, LlmError> {
        let models = self.list_models().await?;
        let available_models: Vec<String> = models.into_iter().map(|m| m.name).collect();
        let model_available = available_models.iter().any(|name| model_matches(name, model));

        if model_available {
            tracing::info!(base_url = %self.base_url, model = model, "Responder model available");
        } else {
            tracing::warn!(
                base_url = %self.base_url,
                model = model,
                available = available_models.len(),
                "Responder model not found"
            );
        }

        Ok(HealthReport {
            base_url: self.base_url.clone(),
            model: model.to_string(),
            model_available,
            available_models,
        })
    }
}

/// Strips trailing slashes and a trailing `/v1` from an API base URL.
pub fn catalog_base(api_base: &str) -> String {
    let trimmed = api_base.trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

fn parse_tags(body: &str) -> Result<Vec<ModelInfo>, LlmError> {
    serde_json::from_str::<TagsResponse>(body)
        .map(|tags| tags.models)
        .map_err(|e| LlmError::ParseError(format!("Failed to parse model list: {}", e)))
}

/// `llama3.1` matches `llama3.1:latest`; otherwise names must be equal.
fn model_matches(available: &str, wanted: &str) -> bool {
    available == wanted || (!wanted.contains(':') && available == format!("{}:latest", wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_base() {
        assert_eq!(catalog_base("http://localhost:11434/v1"), "http://localhost:11434");
        assert_eq!(catalog_base("http://localhost:11434/v1/"), "http://localhost:11434");
        assert_eq!(catalog_base("http://gpu-box:11434"), "http://gpu-box:11434");
    }

    #[test]
    fn test_parse_tags() {
        let body = r#"{"models": [
            {"name": "llama3.1:8b", "size": 4920753328, "modified_at": "2024-08-01T10:00:00Z"},
            {"name": "mistral:latest"}
        ]}"#;
        let models = parse_tags(body).expect("valid");
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].size, Some(4920753328));
        assert!(parse_tags("<html>").is_err());
    }

    #[test]
    fn test_model_matching() {
        assert!(model_matches("llama3.1:8b", "llama3.1:8b"));
        assert!(model_matches("mistral:latest", "mistral"));
        assert!(!model_matches("mistral:7b", "mistral"));
        assert!(!model_matches("llama3.1:70b", "llama3.1:8b"));
    }
}
