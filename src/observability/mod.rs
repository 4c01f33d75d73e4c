//! Arena events, sinks and log replay.

pub mod events;
pub mod replay;
pub mod sink;

pub use events::{ArenaEvent, FailurePhase, Recovery, TerminationReason};
pub use replay::{read_events, ReplayEngine, ReplayRoundSummary};
pub use sink::{EventSink, JsonlEventLog, MemoryEventSink, NullEventSink};
