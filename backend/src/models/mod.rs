//! Domain models for the roundtable deliberation engine

pub mod action;
pub mod issue;
pub mod proposal;
pub mod signal;
pub mod stake;
pub mod state;

// Re-exports
pub use action::{Action, ActionQueue};
pub use issue::{Feedback, Issue};
pub use proposal::{AuthorKind, Proposal, ProposalKind};
pub use signal::{ConvictionView, Signal, SignalHandler};
pub use stake::{StakeKind, StakeRecord};
pub use state::{ExecutionRecord, RoundtableState};
