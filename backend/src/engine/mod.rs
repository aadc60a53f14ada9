//! Roundtable engine - phase scheduler, controller and finalization
//!
//! See `engine.rs` for the tick loop and `controller.rs` for action
//! validation and application.

pub(crate) mod controller;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod phases;
pub mod snapshot;

// Re-export main types for convenience
pub use engine::{
    EngineError, FinalizationOutcome, ProposalWeight, Roundtable, RunSummary,
};
pub use phases::{generate_phases, Phase, PhaseKind, PhaseSpec};
pub use snapshot::{config_hash, StateSnapshot};
