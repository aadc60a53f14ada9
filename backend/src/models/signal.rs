//! Phase signals and the agent callback seam
//!
//! Each tick the current phase sends a signal to every participating
//! agent. The agent may enqueue zero or more actions in response and must
//! return without blocking; the engine processes the enqueued actions at
//! the next tick boundary.

use crate::config::ConvictionParams;
use crate::models::action::ActionQueue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accumulated conviction per agent per proposal, as shown to agents
/// during stake rounds.
pub type ConvictionView = BTreeMap<String, BTreeMap<u64, i64>>;

/// The synchronous invitation a phase sends to each agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Signal {
    /// Invitation to submit a proposal
    Propose {
        tick: usize,
        issue_id: String,
        phase_number: usize,
        max_think_ticks: usize,
        proposal_self_stake: i64,
        current_balance: i64,
    },

    /// Invitation to comment on other agents' proposals
    Feedback {
        tick: usize,
        issue_id: String,
        cycle_number: usize,
        max_feedback: usize,
        feedback_stake: i64,
        current_balance: i64,
        current_proposal_id: Option<u64>,
        all_proposals: Vec<u64>,
    },

    /// Invitation to revise the agent's own proposal
    Revise {
        tick: usize,
        issue_id: String,
        cycle_number: usize,
        proposal_self_stake: i64,
        current_balance: i64,
        current_proposal_id: Option<u64>,
        all_proposals: Vec<u64>,
    },

    /// Invitation to stake, switch or unstake in the given round
    Stake {
        tick: usize,
        issue_id: String,
        round_number: usize,
        conviction_params: ConvictionParams,
        current_balance: i64,
        current_proposal_id: Option<u64>,
        all_proposals: Vec<u64>,
        current_conviction: ConvictionView,
    },

    /// Notification that finalization is underway; no action is expected
    Finalize {
        tick: usize,
        issue_id: String,
        phase_number: usize,
    },
}

impl Signal {
    /// Tick at which the signal was sent.
    pub fn tick(&self) -> usize {
        match self {
            Signal::Propose { tick, .. } => *tick,
            Signal::Feedback { tick, .. } => *tick,
            Signal::Revise { tick, .. } => *tick,
            Signal::Stake { tick, .. } => *tick,
            Signal::Finalize { tick, .. } => *tick,
        }
    }
}

/// Agent-side signal handler.
///
/// The engine owns the implementations and calls them synchronously during
/// each phase's `do` step. Implementations read the signal, optionally
/// enqueue actions, and return. They never observe engine state directly.
pub trait SignalHandler {
    /// Stable agent identifier.
    fn agent_id(&self) -> &str;

    /// Handle one phase signal, enqueueing any resulting actions.
    fn on_signal(&mut self, signal: &Signal, queue: &mut ActionQueue);
}
