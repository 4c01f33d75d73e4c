//! Bounded per-agent memory.
//!
//! Each agent keeps its own last N rounds: its answer, its vote, and the
//! anonymous vote-count distribution of that round. Other agents' answers and
//! voter identities are never stored.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::AgentId;

/// Default number of rounds an agent remembers.
pub const DEFAULT_MEMORY_WINDOW: usize = 5;

/// One round as remembered by one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Agent this entry belongs to.
    pub agent_id: AgentId,
    /// Round index.
    pub round: u64,
    /// The shared prompt of that round.
    pub prompt: String,
    /// The agent's own answer (empty on abstention).
    pub answer: String,
    /// Whether the answer was an abstention after a responder failure.
    pub abstained: bool,
    /// The agent the vote went to.
    pub vote_target: AgentId,
    /// Whether the vote was substituted by the fallback.
    pub vote_was_fallback: bool,
    /// Votes this agent received in that round.
    pub votes_received: u32,
    /// All per-agent counts of that round, sorted descending; no identities.
    pub vote_distribution: Vec<u32>,
}

impl MemoryEntry {
    /// Total votes cast in the remembered round.
    pub fn total_votes(&self) -> u32 {
        self.vote_distribution.iter().sum()
    }
}

/// FIFO window of the last `capacity` entries, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWindow {
    capacity: usize,
    entries: VecDeque<MemoryEntry>,
}

impl Default for MemoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WINDOW)
    }
}

impl MemoryWindow {
    /// Creates an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends an entry, evicting the oldest one when full.
    pub(crate) fn record(&mut self, entry: MemoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries, oldest first.
    pub fn view(&self) -> impl Iterator<Item = &MemoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Renders the window as responder context.
    ///
    /// Vote targets are not rendered; the agent only sees that it voted and
    /// how the votes were spread.
    pub fn render_context(&self) -> String {
        if self.entries.is_empty() {
            return "You have no memory of previous rounds.".to_string();
        }

        let mut lines = vec!["Your memory of recent rounds (oldest first):".to_string()];
        for entry in &self.entries {
            let answer = if entry.abstained {
                "(you failed to answer)".to_string()
            } else {
                truncate(&entry.answer, 240)
            };
            lines.push(format!(
                "- Round {}: prompt \"{}\"; your answer: {}; you received {} of {} votes; \
                 distribution {:?}{}",
                entry.round,
                truncate(&entry.prompt, 120),
                answer,
                entry.votes_received,
                entry.total_votes(),
                entry.vote_distribution,
                if entry.vote_was_fallback {
                    "; your ballot was invalid and was replaced"
                } else {
                    ""
                }
            ));
        }
        lines.join("\n")
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
