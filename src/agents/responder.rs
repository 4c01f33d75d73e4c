//! The external text generator, seen from the arena.
//!
//! The arena never talks to a model directly; it asks a [`Responder`] for text
//! given a prompt, a personality context and a memory context. [`LlmResponder`]
//! adapts any [`LlmProvider`] to this interface.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ResponderError;
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// Default completion budget for arena answers and ballots.
const DEFAULT_MAX_TOKENS: u32 = 512;

/// One responder call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponderRequest {
    /// The user-facing prompt (round prompt or ballot).
    pub prompt: String,
    /// The agent's rendered personality.
    pub personality_context: String,
    /// The agent's rendered memory window.
    pub memory_context: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Sampler seed, forwarded to servers that honour one.
    pub seed: Option<u64>,
}

/// Sampling settings for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f64,
    pub seed: Option<u64>,
}

impl Sampling {
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Produces free text for an agent.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generates text for the request.
    ///
    /// # Errors
    ///
    /// Returns `ResponderError` on timeout, transport failure or malformed output.
    async fn generate(&self, request: ResponderRequest) -> Result<String, ResponderError>;
}

/// Responder backed by an OpenAI-compatible chat completion provider.
pub struct LlmResponder {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl LlmResponder {
    /// Creates a responder that sends every request to `model`.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Sets the completion token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Returns the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &ResponderRequest) -> GenerationRequest {
        let system = format!(
            "{}\n\n{}",
            request.personality_context, request.memory_context
        );
        let generation = GenerationRequest::new(
            self.model.clone(),
            vec![Message::system(system), Message::user(request.prompt.clone())],
        )
        .with_temperature(request.temperature)
        .with_max_tokens(self.max_tokens);
        match request.seed {
            Some(seed) => generation.with_seed(seed),
            None => generation,
        }
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn generate(&self, request: ResponderRequest) -> Result<String, ResponderError> {
        let response = self.provider.generate(self.build_request(&request)).await?;

        let content = response
            .first_content()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ResponderError::Malformed("empty completion".to_string()))?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use std::sync::Mutex;

    struct MockLlmProvider {
        content: String,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl MockLlmProvider {
        fn new(content: &str) -> Self {
            Self {
                content: content.to_string(),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            *self.last_request.lock().expect("lock not poisoned") = Some(request);
            Ok(GenerationResponse {
                id: "mock-0".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.content.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    fn request() -> ResponderRequest {
        ResponderRequest {
            prompt: "What is courage?".to_string(),
            personality_context: "You are concise.".to_string(),
            memory_context: "You have no memory of previous rounds.".to_string(),
            temperature: 0.3,
            seed: Some(1234),
        }
    }

    #[tokio::test]
    async fn test_llm_responder_builds_system_and_user_messages() {
        let provider = Arc::new(MockLlmProvider::new("  Acting despite fear.  "));
        let responder = LlmResponder::new(provider.clone(), "llama3.1:8b");

        let text = responder.generate(request()).await.expect("should respond");
        assert_eq!(text, "Acting despite fear.");

        let sent = provider
            .last_request
            .lock()
            .expect("lock not poisoned")
            .clone()
            .expect("request recorded");
        assert_eq!(sent.model, "llama3.1:8b");
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.messages[0].role, "system");
        assert!(sent.messages[0].content.contains("You are concise."));
        assert!(sent.messages[0].content.contains("no memory"));
        assert_eq!(sent.messages[1].content, "What is courage?");
        assert_eq!(sent.temperature, Some(0.3));
        assert_eq!(sent.seed, Some(1234));
        assert_eq!(sent.max_tokens, Some(DEFAULT_MAX_TOKENS));
    }

    #[tokio::test]
    async fn test_llm_responder_token_budget_and_unseeded_call() {
        let provider = Arc::new(MockLlmProvider::new("Short."));
        let responder = LlmResponder::new(provider.clone(), "m").with_max_tokens(64);

        let unseeded = ResponderRequest {
            seed: None,
            ..request()
        };
        responder.generate(unseeded).await.expect("should respond");

        let sent = provider
            .last_request
            .lock()
            .expect("lock not poisoned")
            .clone()
            .expect("request recorded");
        assert_eq!(sent.max_tokens, Some(64));
        assert_eq!(sent.seed, None);
        let body = serde_json::to_value(&sent).expect("serializable");
        assert!(body.get("seed").is_none());
    }

    #[tokio::test]
    async fn test_llm_responder_rejects_empty_content() {
        let responder = LlmResponder::new(Arc::new(MockLlmProvider::new("   ")), "m");
        let err = responder.generate(request()).await.expect_err("should fail");
        assert!(matches!(err, ResponderError::Malformed(_)));
    }
}
