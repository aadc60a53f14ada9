//! Roundtable Consensus Core - Rust Engine
//!
//! Deterministic multi-agent deliberation simulator: a tick-driven state
//! machine that drives a fixed set of agents through
//! Propose -> (Feedback -> Revise)* -> Stake* -> Finalize and picks one
//! winning proposal by conviction-weighted stakes.
//!
//! # Architecture
//!
//! - **config**: protocol and run parameters, validated at construction
//! - **models**: domain types (Proposal, Issue, Action, Signal, State)
//! - **ledger**: Credit Point balances, stakes and conviction tracking
//! - **engine**: phase scheduler, controller and finalization
//! - **sink**: structured event and snapshot observers
//! - **text**: sentence-level delta for revision pricing
//! - **rng**: deterministic random number generation
//! - **automaton**: built-in heuristic agents
//!
//! # Critical Invariants
//!
//! 1. All CP values are i64; no balance ever goes negative
//! 2. All randomness is seeded (same seeds = identical event stream)
//! 3. Validation rejections never abort a run; they emit typed events

// Module declarations
pub mod automaton;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod models;
pub mod rng;
pub mod sink;
pub mod text;

// Re-exports for convenience
pub use config::{ConvictionParams, GlobalConfig, RunConfig};
pub use engine::{
    EngineError, PhaseKind, Roundtable, RunSummary, StateSnapshot,
};
pub use ledger::{CreditEvent, CreditLedger};
pub use models::{
    Action, ActionQueue, Issue, Proposal, Signal, SignalHandler, StakeRecord,
};
pub use rng::RngManager;
pub use sink::{EventSink, EventType, LogEntry, LogLevel, MemorySink, NullSink};
pub use text::sentence_sequence_delta;
