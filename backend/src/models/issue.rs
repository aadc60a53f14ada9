//! Issue model
//!
//! The single deliberation target of an engine instance. Owns the ordered
//! proposal list, the agent-to-proposal assignment map and the append-only
//! feedback log.

use crate::models::proposal::{AuthorKind, Proposal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One feedback entry in the append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Agent that gave the feedback
    pub from: String,
    /// Proposal the feedback targets
    pub target_proposal_id: u64,
    /// Opaque comment text
    pub comment: String,
    /// Tick at which the feedback was accepted
    pub tick: usize,
}

/// The issue under deliberation.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::models::{Issue, Proposal};
///
/// let mut issue = Issue::new("Issue_1", "Pick a venue.", "Annual meetup.");
/// issue.agent_ids = vec!["Agent_0".to_string()];
///
/// issue.add_proposal(Proposal::standard(1, "Use the hall.".to_string(), "Agent_0", "Issue_1", 2));
/// assert_eq!(issue.proposal_for_agent("Agent_0"), Some(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub issue_id: String,
    pub problem_statement: String,
    pub background: String,

    /// Agents assigned to deliberate this issue
    pub agent_ids: Vec<String>,

    /// All proposal versions ever created, in creation order
    pub proposals: Vec<Proposal>,

    /// Each agent's currently backed proposal
    pub agent_to_proposal_id: BTreeMap<String, u64>,

    /// Append-only feedback log
    pub feedback_log: Vec<Feedback>,
}

impl Issue {
    /// Create an empty issue with no assigned agents.
    pub fn new(issue_id: &str, problem_statement: &str, background: &str) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            problem_statement: problem_statement.to_string(),
            background: background.to_string(),
            agent_ids: Vec::new(),
            proposals: Vec::new(),
            agent_to_proposal_id: BTreeMap::new(),
            feedback_log: Vec::new(),
        }
    }

    /// Check whether an agent is assigned to this issue.
    pub fn is_assigned(&self, agent_id: &str) -> bool {
        self.agent_ids.iter().any(|a| a == agent_id)
    }

    /// Append a proposal.
    ///
    /// If the proposal is active and agent-authored, the author is mapped
    /// to it as their current proposal.
    pub fn add_proposal(&mut self, proposal: Proposal) {
        if proposal.active && proposal.author_type == AuthorKind::Agent {
            self.agent_to_proposal_id
                .insert(proposal.author.clone(), proposal.proposal_id);
        }
        self.proposals.push(proposal);
    }

    /// Look up a proposal by id (linear search over all versions).
    pub fn proposal(&self, proposal_id: u64) -> Option<&Proposal> {
        self.proposals.iter().find(|p| p.proposal_id == proposal_id)
    }

    /// Mutable lookup by id.
    pub fn proposal_mut(&mut self, proposal_id: u64) -> Option<&mut Proposal> {
        self.proposals
            .iter_mut()
            .find(|p| p.proposal_id == proposal_id)
    }

    /// Point an agent at a proposal, unconditionally.
    pub fn assign_agent_to_proposal(&mut self, agent_id: &str, proposal_id: u64) {
        self.agent_to_proposal_id
            .insert(agent_id.to_string(), proposal_id);
    }

    /// The proposal an agent currently backs, if any.
    pub fn proposal_for_agent(&self, agent_id: &str) -> Option<u64> {
        self.agent_to_proposal_id.get(agent_id).copied()
    }

    /// The unique active proposal authored by an agent, if any.
    ///
    /// An agent owns at most one lineage, and a lineage has at most one
    /// active version, so at most one proposal can match.
    pub fn find_active_proposal_by_author(&self, agent_id: &str) -> Option<&Proposal> {
        self.proposals
            .iter()
            .find(|p| p.active && p.author_type == AuthorKind::Agent && p.author == agent_id)
    }

    /// Append a feedback entry.
    pub fn add_feedback(&mut self, from: &str, target_proposal_id: u64, comment: &str, tick: usize) {
        self.feedback_log.push(Feedback {
            from: from.to_string(),
            target_proposal_id,
            comment: comment.to_string(),
            tick,
        });
    }

    /// Count all feedback entries given by an agent.
    pub fn count_feedbacks_by(&self, agent_id: &str) -> usize {
        self.feedback_log.iter().filter(|f| f.from == agent_id).count()
    }
}
