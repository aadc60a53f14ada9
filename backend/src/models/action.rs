//! Agent actions and the action queue
//!
//! Agents never mutate engine state directly. In response to a phase
//! signal they enqueue actions; the controller drains and validates the
//! queue once per tick, before the phase logic runs.
//!
//! Each action is a tagged variant with a fixed field set. Fields that the
//! protocol validates as "missing" (for example a stake without a target)
//! are modeled as `Option` so the rejection path stays expressible.

use serde::{Deserialize, Serialize};

/// An action submitted by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Submit a new proposal during the Propose phase
    SubmitProposal {
        agent_id: String,
        content: String,
        issue_id: String,
        tick: usize,
    },

    /// Comment on another agent's proposal during a Feedback phase
    Feedback {
        agent_id: String,
        target_proposal_id: u64,
        comment: String,
        issue_id: String,
        tick: usize,
    },

    /// Replace the agent's own proposal with a new version
    Revise {
        agent_id: String,
        new_content: String,
        issue_id: String,
        tick: usize,
    },

    /// Place a voluntary conviction stake
    Stake {
        agent_id: String,
        proposal_id: Option<u64>,
        stake_amount: i64,
        round_number: usize,
        issue_id: String,
        tick: usize,
        choice_reason: String,
    },

    /// Move accumulated conviction from one proposal to another
    SwitchStake {
        agent_id: String,
        source_proposal_id: Option<u64>,
        target_proposal_id: Option<u64>,
        cp_amount: i64,
        issue_id: String,
        tick: usize,
        reason: String,
    },

    /// Withdraw accumulated conviction back to the agent's balance
    Unstake {
        agent_id: String,
        proposal_id: Option<u64>,
        cp_amount: i64,
        issue_id: String,
        tick: usize,
        reason: String,
    },

    /// Declare readiness for the current phase without acting
    SignalReady { agent_id: String },
}

impl Action {
    /// The acting agent.
    pub fn agent_id(&self) -> &str {
        match self {
            Action::SubmitProposal { agent_id, .. } => agent_id,
            Action::Feedback { agent_id, .. } => agent_id,
            Action::Revise { agent_id, .. } => agent_id,
            Action::Stake { agent_id, .. } => agent_id,
            Action::SwitchStake { agent_id, .. } => agent_id,
            Action::Unstake { agent_id, .. } => agent_id,
            Action::SignalReady { agent_id } => agent_id,
        }
    }

    /// Snake-case action type name, as used in rejection events.
    pub fn action_type(&self) -> &'static str {
        match self {
            Action::SubmitProposal { .. } => "submit_proposal",
            Action::Feedback { .. } => "feedback",
            Action::Revise { .. } => "revise",
            Action::Stake { .. } => "stake",
            Action::SwitchStake { .. } => "switch_stake",
            Action::Unstake { .. } => "unstake",
            Action::SignalReady { .. } => "signal_ready",
        }
    }

    /// The issue id carried in the payload, if the variant has one.
    pub fn issue_id(&self) -> Option<&str> {
        match self {
            Action::SubmitProposal { issue_id, .. } => Some(issue_id),
            Action::Feedback { issue_id, .. } => Some(issue_id),
            Action::Revise { issue_id, .. } => Some(issue_id),
            Action::Stake { issue_id, .. } => Some(issue_id),
            Action::SwitchStake { issue_id, .. } => Some(issue_id),
            Action::Unstake { issue_id, .. } => Some(issue_id),
            Action::SignalReady { .. } => None,
        }
    }
}

/// FIFO queue of pending agent actions.
///
/// Owned by the engine and handed to agent callbacks explicitly; there is
/// no process-wide queue.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::models::{Action, ActionQueue};
///
/// let mut queue = ActionQueue::new();
/// queue.submit(Action::SignalReady { agent_id: "Agent_0".to_string() });
/// queue.submit(Action::SignalReady { agent_id: "Agent_1".to_string() });
///
/// let drained = queue.drain();
/// assert_eq!(drained.len(), 2);
/// assert_eq!(drained[0].agent_id(), "Agent_0");
/// assert!(queue.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ActionQueue {
    queue: Vec<Action>,
}

impl ActionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Append an action, preserving submission order.
    pub fn submit(&mut self, action: Action) {
        self.queue.push(action);
    }

    /// Take a snapshot of all pending actions and empty the queue.
    pub fn drain(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.queue)
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
