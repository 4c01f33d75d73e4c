//! Arena contestants: identity, memory and the responder seam.

pub mod agent;
pub mod memory;
pub mod responder;

pub use agent::{Agent, AgentSnapshot, BallotFailure};
pub use memory::{MemoryEntry, MemoryWindow, DEFAULT_MEMORY_WINDOW};
pub use responder::{LlmResponder, Responder, ResponderRequest, Sampling};

use serde::{Deserialize, Serialize};

/// Stable agent identity, unique for the arena's lifetime and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(u64);

impl AgentId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent-{:03}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_display() {
        assert_eq!(AgentId::new(2).to_string(), "agent-002");
        assert_eq!(AgentId::new(1234).to_string(), "agent-1234");
    }

    #[test]
    fn test_agent_id_serializes_as_number() {
        let json = serde_json::to_string(&AgentId::new(7)).expect("serializable");
        assert_eq!(json, "7");
        let back: AgentId = serde_json::from_str("7").expect("deserializable");
        assert_eq!(back, AgentId::new(7));
    }
}
