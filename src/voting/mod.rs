//! Voting: anonymous ballots, tallies and the elimination ranking.

pub mod aggregation;
pub mod ballot;
pub mod types;

pub use aggregation::VotingAggregator;
pub use ballot::{candidate_label, fallback_target, Ballot, BallotEntry};
pub use types::{Contender, Ranking, RoundTally, Standing, TieBreak, Vote};
