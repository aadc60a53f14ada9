//! Credit events
//!
//! Append-only record of every balance-affecting outcome in the ledger,
//! plus the zero-amount finalization and influence records appended when
//! the issue is decided. Together with the stake ledger these records are
//! sufficient to audit every CP movement in a run.

use serde::{Deserialize, Serialize};

/// One entry in the ledger's append-only credit event list.
///
/// All amounts are signed from the agent's point of view: burns and
/// revision costs are negative, awards positive, informational records
/// zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CreditEvent {
    /// CP deducted from an agent (feedback stakes, revision costs, and
    /// deductions into the staked bucket)
    Burn {
        tick: usize,
        agent_id: String,
        amount: i64,
        reason: String,
        issue_id: String,
    },

    /// CP granted to an agent (assignment award, unstake returns)
    Credit {
        tick: usize,
        agent_id: String,
        amount: i64,
        reason: String,
        issue_id: String,
    },

    /// A deduction attempt that failed for lack of balance
    InsufficientCredit {
        tick: usize,
        agent_id: String,
        amount: i64,
        reason: String,
        issue_id: String,
    },

    /// Lineage record of an accepted revision (the CP cost itself is
    /// recorded by the matching `Burn`)
    Revision {
        tick: usize,
        agent_id: String,
        cost: i64,
        delta: f64,
        parent_id: u64,
        new_proposal_id: u64,
        revision_number: u32,
        issue_id: String,
    },

    /// The finalization decision (proposal_id is None when no stakes were
    /// found and no winner could be determined)
    Finalization {
        tick: usize,
        proposal_id: Option<u64>,
        effective_weight: f64,
        raw_weight: i64,
        contributor_count: usize,
        issue_id: String,
    },

    /// One agent's contribution to the winning proposal
    Influence {
        tick: usize,
        agent_id: String,
        proposal_id: u64,
        contribution: f64,
        raw_stake: i64,
        multiplier: f64,
        issue_id: String,
    },
}

impl CreditEvent {
    /// Tick at which the event occurred.
    pub fn tick(&self) -> usize {
        match self {
            CreditEvent::Burn { tick, .. } => *tick,
            CreditEvent::Credit { tick, .. } => *tick,
            CreditEvent::InsufficientCredit { tick, .. } => *tick,
            CreditEvent::Revision { tick, .. } => *tick,
            CreditEvent::Finalization { tick, .. } => *tick,
            CreditEvent::Influence { tick, .. } => *tick,
        }
    }

    /// The affected agent, if the event concerns a single agent.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            CreditEvent::Burn { agent_id, .. } => Some(agent_id),
            CreditEvent::Credit { agent_id, .. } => Some(agent_id),
            CreditEvent::InsufficientCredit { agent_id, .. } => Some(agent_id),
            CreditEvent::Revision { agent_id, .. } => Some(agent_id),
            CreditEvent::Finalization { .. } => None,
            CreditEvent::Influence { agent_id, .. } => Some(agent_id),
        }
    }

    /// Signed balance change from the agent's point of view.
    pub fn amount(&self) -> i64 {
        match self {
            CreditEvent::Burn { amount, .. } => -amount,
            CreditEvent::Credit { amount, .. } => *amount,
            CreditEvent::InsufficientCredit { .. } => 0,
            // Informational: the burn that paid for the revision is its
            // own event.
            CreditEvent::Revision { .. } => 0,
            CreditEvent::Finalization { .. } => 0,
            CreditEvent::Influence { .. } => 0,
        }
    }

    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CreditEvent::Burn { .. } => "Burn",
            CreditEvent::Credit { .. } => "Credit",
            CreditEvent::InsufficientCredit { .. } => "InsufficientCredit",
            CreditEvent::Revision { .. } => "Revision",
            CreditEvent::Finalization { .. } => "Finalization",
            CreditEvent::Influence { .. } => "Influence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amounts() {
        let burn = CreditEvent::Burn {
            tick: 1,
            agent_id: "A".to_string(),
            amount: 50,
            reason: "Proposal Self Stake".to_string(),
            issue_id: "I1".to_string(),
        };
        assert_eq!(burn.amount(), -50);

        let credit = CreditEvent::Credit {
            tick: 1,
            agent_id: "A".to_string(),
            amount: 100,
            reason: "Initial credit for consensus run".to_string(),
            issue_id: "I1".to_string(),
        };
        assert_eq!(credit.amount(), 100);
    }

    #[test]
    fn test_finalization_has_no_agent() {
        let event = CreditEvent::Finalization {
            tick: 9,
            proposal_id: Some(1),
            effective_weight: 99.0,
            raw_weight: 50,
            contributor_count: 1,
            issue_id: "I1".to_string(),
        };
        assert_eq!(event.agent_id(), None);
        assert_eq!(event.amount(), 0);
        assert_eq!(event.kind(), "Finalization");
    }
}
