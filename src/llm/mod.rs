//! LLM integration for the arena.
//!
//! [`LiteLlmClient`] speaks the OpenAI-compatible chat completion protocol;
//! [`ModelCatalog`] queries an Ollama-style runtime for the models it serves.
//!
//! ```ignore
//! use agent_arena::llm::{LiteLlmClient, LlmProvider, Message, GenerationRequest};
//!
//! let client = LiteLlmClient::new("http://localhost:11434/v1", None, "llama3.1:8b")?;
//! let request = GenerationRequest::new("llama3.1:8b", vec![Message::user("Hello!")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;
pub mod ollama;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
pub use ollama::{catalog_base, HealthReport, ModelCatalog, ModelInfo};
