//! Anonymous ballots and the deterministic fallback vote.
//!
//! A voter sees every other agent's answer under a letter label, in an order
//! shuffled from `(master seed, round, voter)`. Its reply is mapped back to an
//! agent id; anything that does not name a listed label is an
//! [`InvalidVoteError`].

use std::sync::OnceLock;

use rand::prelude::*;
use rand::seq::SliceRandom;
use regex::Regex;

use crate::agents::AgentId;
use crate::error::InvalidVoteError;
use crate::seed::{derive_seed, seeded_rng};

static CANDIDATE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static KEYWORD_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// `Candidate X` anywhere in the reply.
fn candidate_pattern() -> Option<&'static Regex> {
    CANDIDATE_PATTERN
        .get_or_init(|| Regex::new(r"\b(?i:candidate)\s*[:#\-]?\s*\[?([A-Z]{1,2})\b\]?").ok())
        .as_ref()
}

/// A label after a softer keyword, with the word that follows it (if any).
fn keyword_pattern() -> Option<&'static Regex> {
    KEYWORD_PATTERN
        .get_or_init(|| {
            Regex::new(
                r"\b(?i:answer|option|choice|pick|choose|select|vote(?:\s+for)?)(?:\s+is)?\s*[:#\-]?\s*\[?([A-Z]{1,2})\b\]?(\s+[a-z]+)?",
            )
            .ok()
        })
        .as_ref()
}

/// `I` and `A` followed by a lowercase word are English, not labels.
fn reads_as_prose(label: &str, next_word: Option<&str>) -> bool {
    matches!(label, "I" | "A") && next_word.is_some()
}

/// Bijective base-26 label: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn candidate_label(index: usize) -> String {
    let mut n = index + 1;
    let mut label = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

/// One labelled answer on a ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotEntry {
    pub label: String,
    pub agent_id: AgentId,
    pub answer: String,
}

/// The candidate list presented to one voter. Never contains the voter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    voter: AgentId,
    prompt: String,
    entries: Vec<BallotEntry>,
}

impl Ballot {
    /// Builds a ballot in the given order, dropping the voter's own answer.
    pub fn new(voter: AgentId, candidates: Vec<(AgentId, String)>) -> Self {
        let entries = candidates
            .into_iter()
            .filter(|(id, _)| *id != voter)
            .enumerate()
            .map(|(index, (agent_id, answer))| BallotEntry {
                label: candidate_label(index),
                agent_id,
                answer,
            })
            .collect();
        Self {
            voter,
            prompt: String::new(),
            entries,
        }
    }

    /// Builds a ballot whose order is a seeded shuffle for this voter and round.
    pub fn shuffled(
        master_seed: u64,
        round: u64,
        voter: AgentId,
        mut candidates: Vec<(AgentId, String)>,
    ) -> Self {
        candidates.sort_by_key(|(id, _)| *id);
        let mut rng = seeded_rng(derive_seed(master_seed, "ballot", &[round, voter.value()]));
        candidates.shuffle(&mut rng);
        Self::new(voter, candidates)
    }

    /// Sets the round prompt shown above the candidates.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn voter(&self) -> AgentId {
        self.voter
    }

    pub fn entries(&self) -> &[BallotEntry] {
        &self.entries
    }

    /// Candidate ids in sorted order.
    pub fn candidate_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.entries.iter().map(|e| e.agent_id).collect();
        ids.sort();
        ids
    }

    /// Renders the ballot as the voter's user prompt.
    pub fn render(&self) -> String {
        let mut text = String::new();
        if !self.prompt.is_empty() {
            text.push_str(&format!("This round's prompt was:\n{}\n\n", self.prompt));
        }
        text.push_str("The other contestants answered:\n");
        for entry in &self.entries {
            let answer = if entry.answer.trim().is_empty() {
                "(no answer)"
            } else {
                entry.answer.as_str()
            };
            text.push_str(&format!("\n[{}] {}\n", entry.label, answer));
        }
        text.push_str(
            "\nVote for the single best answer. You cannot vote for yourself. \
             Reply with the label only, for example: Candidate A",
        );
        text
    }

    fn lookup(&self, label: &str) -> Option<AgentId> {
        self.entries
            .iter()
            .find(|e| e.label.eq_ignore_ascii_case(label))
            .map(|e| e.agent_id)
    }

    /// Maps a voter's free-text reply to a candidate id.
    ///
    /// Resolution order:
    /// 1. a reply that is just a label (ignoring surrounding punctuation);
    /// 2. `Candidate X` mentions anywhere in the reply, which must all name
    ///    the same label;
    /// 3. the first label after `answer`, `vote for`, `pick` and similar
    ///    keywords that does not read as an English word.
    pub fn resolve(&self, reply: &str) -> Result<AgentId, InvalidVoteError> {
        let bare = reply.trim().trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if !bare.is_empty() && bare.len() <= 2 && bare.chars().all(|c| c.is_ascii_alphabetic()) {
            return self.lookup(bare).ok_or_else(|| self.unknown(bare));
        }

        let mut named: Vec<String> = Vec::new();
        if let Some(re) = candidate_pattern() {
            for caps in re.captures_iter(reply) {
                if let Some(label) = caps.get(1).map(|m| m.as_str().to_string()) {
                    if !named.contains(&label) {
                        named.push(label);
                    }
                }
            }
        }
        match named.len() {
            0 => {}
            1 => return self.lookup(&named[0]).ok_or_else(|| self.unknown(&named[0])),
            _ => {
                return Err(InvalidVoteError::Ambiguous {
                    voter: self.voter.to_string(),
                    labels: named,
                })
            }
        }

        let keyword_label = keyword_pattern().and_then(|re| {
            let mut start = 0;
            while let Some(caps) = re.captures_at(reply, start) {
                let label = caps.get(1)?;
                let next_word = caps.get(2).map(|m| m.as_str().trim());
                if !reads_as_prose(label.as_str(), next_word) {
                    return Some(label.as_str().to_string());
                }
                start = label.end();
            }
            None
        });

        match keyword_label {
            Some(label) => self.lookup(&label).ok_or_else(|| self.unknown(&label)),
            None => Err(InvalidVoteError::Unparseable {
                voter: self.voter.to_string(),
                excerpt: reply.chars().take(80).collect(),
            }),
        }
    }

    fn unknown(&self, label: &str) -> InvalidVoteError {
        InvalidVoteError::UnknownCandidate {
            voter: self.voter.to_string(),
            label: label.to_ascii_uppercase(),
        }
    }
}

/// Picks the substitute target for an unusable ballot.
///
/// Uniform over `legal_targets` (sorted first) with a generator seeded from
/// `(master seed, round, voter)`. Returns `None` only if there is no legal
/// target.
pub fn fallback_target(
    master_seed: u64,
    round: u64,
    voter: AgentId,
    legal_targets: &[AgentId],
) -> Option<AgentId> {
    let mut targets: Vec<AgentId> = legal_targets
        .iter()
        .copied()
        .filter(|id| *id != voter)
        .collect();
    if targets.is_empty() {
        return None;
    }
    targets.sort();
    let mut rng = seeded_rng(derive_seed(master_seed, "fallback", &[round, voter.value()]));
    Some(targets[rng.random_range(0..targets.len())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<(AgentId, String)> {
        (1..=4)
            .map(|i| (AgentId::new(i), format!("answer from {}", i)))
            .collect()
    }

    #[test]
    fn test_candidate_labels() {
        assert_eq!(candidate_label(0), "A");
        assert_eq!(candidate_label(25), "Z");
        assert_eq!(candidate_label(26), "AA");
        assert_eq!(candidate_label(27), "AB");
    }

    #[test]
    fn test_ballot_excludes_voter() {
        let ballot = Ballot::new(AgentId::new(2), candidates());
        assert_eq!(ballot.entries().len(), 3);
        assert!(ballot.entries().iter().all(|e| e.agent_id != AgentId::new(2)));
        assert!(!ballot.render().contains("answer from 2"));
    }

    #[test]
    fn test_shuffle_is_reproducible_per_voter_and_round() {
        let a = Ballot::shuffled(42, 3, AgentId::new(1), candidates());
        let b = Ballot::shuffled(42, 3, AgentId::new(1), candidates());
        assert_eq!(a, b);
        assert_eq!(a.candidate_ids(), vec![AgentId::new(2), AgentId::new(3), AgentId::new(4)]);
    }

    #[test]
    fn test_resolve_bare_and_phrased_labels() {
        let ballot = Ballot::new(AgentId::new(9), candidates());
        assert_eq!(ballot.resolve("B").expect("valid"), AgentId::new(2));
        assert_eq!(ballot.resolve(" **c**. ").expect("valid"), AgentId::new(3));
        assert_eq!(
            ballot.resolve("After thinking, I vote for candidate D because...").expect("valid"),
            AgentId::new(4)
        );
        assert_eq!(ballot.resolve("Answer: [A]").expect("valid"), AgentId::new(1));
        assert_eq!(
            ballot.resolve("The best answer is B.").expect("valid"),
            AgentId::new(2)
        );
    }

    #[test]
    fn test_resolve_errors() {
        let ballot = Ballot::new(AgentId::new(9), candidates());
        assert!(matches!(
            ballot.resolve("Candidate Z"),
            Err(InvalidVoteError::UnknownCandidate { ref label, .. }) if label == "Z"
        ));
        assert!(matches!(
            ballot.resolve("They were all wonderful."),
            Err(InvalidVoteError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_resolve_prefers_candidate_mention_over_pronoun() {
        let many: Vec<(AgentId, String)> = (1..=10)
            .map(|i| (AgentId::new(i), format!("answer from {}", i)))
            .collect();
        let ballot = Ballot::new(AgentId::new(99), many);
        assert_eq!(
            ballot.resolve("Answer: I think candidate B is best").expect("valid"),
            AgentId::new(2)
        );
        assert_eq!(ballot.resolve("My vote: I pick C").expect("valid"), AgentId::new(3));
        assert_eq!(ballot.resolve("Answer: I").expect("valid"), AgentId::new(9));

        let small = Ballot::new(AgentId::new(9), candidates());
        assert_eq!(
            small.resolve("Answer: I think candidate B is best").expect("valid"),
            AgentId::new(2)
        );
        assert_eq!(small.resolve("My vote: I pick C").expect("valid"), AgentId::new(3));
    }

    #[test]
    fn test_resolve_rejects_conflicting_candidates() {
        let ballot = Ballot::new(AgentId::new(9), candidates());
        assert!(matches!(
            ballot.resolve("Candidate A was close, but candidate C is better."),
            Err(InvalidVoteError::Ambiguous { ref labels, .. })
                if labels.len() == 2 && labels[0] == "A" && labels[1] == "C"
        ));
        assert_eq!(
            ballot.resolve("Candidate C. Final answer: candidate C").expect("valid"),
            AgentId::new(3)
        );
        assert!(matches!(
            ballot.resolve("Answer: I would rather not choose."),
            Err(InvalidVoteError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_fallback_target_is_legal_and_reproducible() {
        let legal = vec![AgentId::new(3), AgentId::new(1), AgentId::new(2)];
        for round in 1..30 {
            let target = fallback_target(7, round, AgentId::new(1), &legal).expect("target");
            assert_ne!(target, AgentId::new(1));
            assert_eq!(Some(target), fallback_target(7, round, AgentId::new(1), &legal));
        }
        assert_eq!(fallback_target(7, 1, AgentId::new(1), &[AgentId::new(1)]), None);
    }
}
