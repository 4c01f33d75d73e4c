//! The arena: round state machine, elimination policy and controller.

pub mod controller;
pub mod elimination;
pub mod post_mortem;
pub mod state;

pub use controller::{ArenaController, ArenaSummary, FinalStanding, RoundReport, StopHandle};
pub use elimination::{
    EliminationDecision, EliminationEvent, EliminationOutcome, EliminationPhase, EliminationPolicy,
};
pub use post_mortem::PostMortem;
pub use state::{ArenaState, Round, RoundPhase};
