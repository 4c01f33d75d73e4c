//! Tallying and elimination ranking.
//!
//! The aggregator receives pre-validated votes. Anything it still finds
//! wrong (a self-vote, an unknown target, a missing or extra voter) is an
//! upstream bug and is reported as an [`InvariantViolation`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use ordered_float::OrderedFloat;

use super::types::{Contender, Ranking, RoundTally, Standing, TieBreak, Vote};
use crate::agents::AgentId;
use crate::error::InvariantViolation;
use crate::seed::derive_seed;

/// Counts votes and orders agents for elimination.
#[derive(Debug, Clone, Copy)]
pub struct VotingAggregator {
    master_seed: u64,
}

impl VotingAggregator {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Tallies one round.
    ///
    /// `votes` maps voter to target. Every alive agent must vote exactly once.
    pub fn tally(
        &self,
        round: u64,
        votes: &BTreeMap<AgentId, AgentId>,
        alive: &BTreeSet<AgentId>,
    ) -> Result<RoundTally, InvariantViolation> {
        let mut counts: BTreeMap<AgentId, u32> = alive.iter().map(|id| (*id, 0)).collect();

        for (voter, target) in votes {
            if !alive.contains(voter) {
                return Err(InvariantViolation::UnknownVoter {
                    round,
                    voter: voter.to_string(),
                });
            }
            if voter == target {
                return Err(InvariantViolation::SelfVote {
                    round,
                    voter: voter.to_string(),
                });
            }
            match counts.get_mut(target) {
                Some(count) => *count += 1,
                None => {
                    return Err(InvariantViolation::UnknownTarget {
                        round,
                        voter: voter.to_string(),
                        target: target.to_string(),
                    })
                }
            }
        }

        if votes.len() != alive.len() {
            return Err(InvariantViolation::VoteCountMismatch {
                round,
                expected: alive.len(),
                actual: votes.len(),
            });
        }

        Ok(RoundTally {
            round,
            counts,
            total_votes: votes.len(),
        })
    }

    /// Tallies a list of [`Vote`]s, rejecting a voter that appears twice.
    pub fn tally_votes(
        &self,
        round: u64,
        votes: &[Vote],
        alive: &BTreeSet<AgentId>,
    ) -> Result<RoundTally, InvariantViolation> {
        let mut by_voter = BTreeMap::new();
        for vote in votes {
            if by_voter.insert(vote.voter, vote.target).is_some() {
                return Err(InvariantViolation::VoteCountMismatch {
                    round,
                    expected: alive.len(),
                    actual: votes.len(),
                });
            }
        }
        self.tally(round, &by_voter, alive)
    }

    /// Orders contenders from most to least eliminable.
    ///
    /// Keys, in order: cumulative score ascending, lifetime average votes per
    /// round ascending, then a draw seeded from the master seed, the round and
    /// the sorted ids of the agents still tied. Agent id is the last resort so
    /// the order is total.
    pub fn rank(
        &self,
        round: u64,
        contenders: &[Contender],
    ) -> Result<Ranking, InvariantViolation> {
        if contenders.is_empty() {
            return Err(InvariantViolation::EmptyRanking { round });
        }

        let mut groups: BTreeMap<(u64, OrderedFloat<f64>), Vec<AgentId>> = BTreeMap::new();
        for c in contenders {
            groups
                .entry((c.score, OrderedFloat(c.historical_average)))
                .or_default()
                .push(c.agent_id);
        }

        let mut order: Vec<Standing> = contenders
            .iter()
            .map(|c| {
                let mut tied = groups
                    .get(&(c.score, OrderedFloat(c.historical_average)))
                    .cloned()
                    .unwrap_or_default();
                tied.sort();
                let mut parts: Vec<u64> = Vec::with_capacity(tied.len() + 2);
                parts.push(round);
                parts.extend(tied.iter().map(|id| id.value()));
                parts.push(c.agent_id.value());

                Standing {
                    agent_id: c.agent_id,
                    score: c.score,
                    historical_average: c.historical_average,
                    draw_key: derive_seed(self.master_seed, "tiebreak", &parts),
                }
            })
            .collect();

        order.sort_by(compare_standings);

        let decided_by = match (order.first(), order.get(1)) {
            (Some(a), Some(b)) if a.score != b.score => TieBreak::None,
            (Some(a), Some(b))
                if OrderedFloat(a.historical_average) != OrderedFloat(b.historical_average) =>
            {
                TieBreak::HistoricalAverage
            }
            (Some(_), Some(_)) => TieBreak::SeededDraw,
            _ => TieBreak::None,
        };

        Ok(Ranking {
            round,
            order,
            decided_by,
        })
    }
}

fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    a.score
        .cmp(&b.score)
        .then_with(|| OrderedFloat(a.historical_average).cmp(&OrderedFloat(b.historical_average)))
        .then_with(|| a.draw_key.cmp(&b.draw_key))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::RangeInclusive<u64>) -> BTreeSet<AgentId> {
        range.map(AgentId::new).collect()
    }

    fn contender(id: u64, score: u64, average: f64) -> Contender {
        Contender {
            agent_id: AgentId::new(id),
            score,
            historical_average: average,
        }
    }

    #[test]
    fn test_tally_counts_every_alive_agent() {
        let alive = ids(1..=4);
        let votes: BTreeMap<_, _> = [(1, 2), (2, 3), (3, 2), (4, 2)]
            .into_iter()
            .map(|(v, t)| (AgentId::new(v), AgentId::new(t)))
            .collect();

        let tally = VotingAggregator::new(1).tally(5, &votes, &alive).expect("valid");
        assert_eq!(tally.count(AgentId::new(2)), 3);
        assert_eq!(tally.count(AgentId::new(3)), 1);
        assert_eq!(tally.count(AgentId::new(1)), 0);
        assert_eq!(tally.counts.len(), 4);
        assert_eq!(tally.sum(), 4);
        assert_eq!(tally.total_votes, 4);
        assert_eq!(tally.distribution(), vec![3, 1, 0, 0]);
    }

    #[test]
    fn test_tally_rejects_self_vote() {
        let alive = ids(1..=3);
        let votes: BTreeMap<_, _> = [(1, 1), (2, 1), (3, 1)]
            .into_iter()
            .map(|(v, t)| (AgentId::new(v), AgentId::new(t)))
            .collect();
        assert!(matches!(
            VotingAggregator::new(1).tally(1, &votes, &alive),
            Err(InvariantViolation::SelfVote { round: 1, .. })
        ));
    }

    #[test]
    fn test_tally_rejects_unknown_target_and_voter() {
        let alive = ids(1..=3);
        let aggregator = VotingAggregator::new(1);

        let votes: BTreeMap<_, _> = [(1, 9), (2, 1), (3, 1)]
            .into_iter()
            .map(|(v, t)| (AgentId::new(v), AgentId::new(t)))
            .collect();
        assert!(matches!(
            aggregator.tally(1, &votes, &alive),
            Err(InvariantViolation::UnknownTarget { .. })
        ));

        let votes: BTreeMap<_, _> = [(1, 2), (2, 1), (3, 1), (7, 1)]
            .into_iter()
            .map(|(v, t)| (AgentId::new(v), AgentId::new(t)))
            .collect();
        assert!(matches!(
            aggregator.tally(1, &votes, &alive),
            Err(InvariantViolation::UnknownVoter { .. })
        ));
    }

    #[test]
    fn test_tally_rejects_missing_vote() {
        let alive = ids(1..=3);
        let votes: BTreeMap<_, _> = [(1, 2), (2, 1)]
            .into_iter()
            .map(|(v, t)| (AgentId::new(v), AgentId::new(t)))
            .collect();
        assert!(matches!(
            VotingAggregator::new(1).tally(2, &votes, &alive),
            Err(InvariantViolation::VoteCountMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn test_tally_votes_rejects_double_vote() {
        let alive = ids(1..=3);
        let vote = |v, t| Vote {
            voter: AgentId::new(v),
            target: AgentId::new(t),
            fallback: false,
        };
        let votes = vec![vote(1, 2), vote(1, 3), vote(2, 1), vote(3, 1)];
        assert!(VotingAggregator::new(1).tally_votes(1, &votes, &alive).is_err());
    }

    #[test]
    fn test_rank_by_score() {
        let ranking = VotingAggregator::new(1)
            .rank(2, &[contender(1, 5, 2.5), contender(2, 1, 0.5), contender(3, 3, 1.5)])
            .expect("ranking");
        assert_eq!(ranking.ids(), vec![AgentId::new(2), AgentId::new(3), AgentId::new(1)]);
        assert_eq!(ranking.decided_by, TieBreak::None);
    }

    #[test]
    fn test_rank_tie_broken_by_average() {
        let ranking = VotingAggregator::new(1)
            .rank(4, &[contender(1, 2, 1.0), contender(2, 2, 0.5), contender(3, 6, 1.5)])
            .expect("ranking");
        assert_eq!(ranking.lowest().map(|s| s.agent_id), Some(AgentId::new(2)));
        assert_eq!(ranking.decided_by, TieBreak::HistoricalAverage);
    }

    #[test]
    fn test_rank_full_tie_uses_seeded_draw() {
        let contenders: Vec<Contender> = (1..=5).map(|id| contender(id, 0, 0.0)).collect();
        let first = VotingAggregator::new(42).rank(1, &contenders).expect("ranking");
        let again = VotingAggregator::new(42).rank(1, &contenders).expect("ranking");
        assert_eq!(first.decided_by, TieBreak::SeededDraw);
        assert_eq!(first.ids(), again.ids());

        let mut reversed = contenders.clone();
        reversed.reverse();
        let shuffled_input = VotingAggregator::new(42).rank(1, &reversed).expect("ranking");
        assert_eq!(first.ids(), shuffled_input.ids());
    }

    #[test]
    fn test_rank_draw_depends_on_seed() {
        let contenders: Vec<Contender> = (1..=8).map(|id| contender(id, 0, 0.0)).collect();
        let orders: BTreeSet<Vec<AgentId>> = (0..10)
            .map(|seed| VotingAggregator::new(seed).rank(1, &contenders).expect("ranking").ids())
            .collect();
        assert!(orders.len() > 1);
    }

    #[test]
    fn test_rank_empty() {
        assert!(matches!(
            VotingAggregator::new(1).rank(3, &[]),
            Err(InvariantViolation::EmptyRanking { round: 3 })
        ));
    }
}
