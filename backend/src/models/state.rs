//! Roundtable state
//!
//! All mutable deliberation state outside the credit ledger lives in a
//! single `RoundtableState` value owned by the engine. Functions take a
//! reference; there is no shared or global state.
//!
//! # Critical Invariants
//!
//! 1. `tick` and `proposal_counter` are monotonic
//! 2. `proposal_counter` starts at 1; id 0 is reserved for NoAction
//! 3. Readiness flags are reset exactly once per phase transition

use crate::engine::phases::PhaseKind;
use crate::models::issue::Issue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One row of the per-tick execution ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tick: usize,
    pub phase: Option<PhaseKind>,
    pub phase_tick: usize,
    pub agent_readiness: BTreeMap<String, bool>,
}

/// Mutable state of one deliberation run.
#[derive(Debug, Clone)]
pub struct RoundtableState {
    /// Current engine tick (0 before the first tick)
    pub tick: usize,

    /// Phase currently executing, if any
    pub current_phase: Option<PhaseKind>,

    /// Schedule position of the current phase. Transition detection keys
    /// on this rather than the kind, since consecutive stake rounds share
    /// a kind but are distinct phases.
    pub current_phase_number: Option<usize>,

    /// Tick count within the current phase (1-based)
    pub phase_tick: usize,

    /// Engine tick at which the current phase started
    pub phase_start_tick: usize,

    /// Per-agent readiness flags for the current phase
    pub agent_readiness: BTreeMap<String, bool>,

    /// Agents that already submitted a proposal in the Propose phase
    pub proposals_this_phase: BTreeSet<String>,

    /// The issue under deliberation
    pub current_issue: Option<Issue>,

    /// Next proposal id to allocate (monotonic; 0 reserved for NoAction)
    pub proposal_counter: u64,

    /// Per-tick trace of phase progression and readiness
    pub execution_ledger: Vec<ExecutionRecord>,

    /// Set once finalization has run
    pub issue_finalized: bool,

    /// Tick of finalization, if it has run
    pub finalization_tick: Option<usize>,
}

impl RoundtableState {
    /// Create the state for a run over the given issue and agents.
    pub fn new(issue: Issue, agent_ids: &[String]) -> Self {
        Self {
            tick: 0,
            current_phase: None,
            current_phase_number: None,
            phase_tick: 0,
            phase_start_tick: 0,
            agent_readiness: agent_ids.iter().map(|a| (a.clone(), false)).collect(),
            proposals_this_phase: BTreeSet::new(),
            current_issue: Some(issue),
            proposal_counter: 1,
            execution_ledger: Vec::new(),
            issue_finalized: false,
            finalization_tick: None,
        }
    }

    /// Allocate the next sequential proposal id.
    pub fn next_proposal_id(&mut self) -> u64 {
        let id = self.proposal_counter;
        self.proposal_counter += 1;
        id
    }

    /// Mark an agent ready for the current phase.
    ///
    /// Signaling an agent that is already ready (or unknown) is a no-op.
    pub fn mark_ready(&mut self, agent_id: &str) {
        if let Some(flag) = self.agent_readiness.get_mut(agent_id) {
            *flag = true;
        }
    }

    /// Reset every readiness flag to false.
    pub fn reset_readiness(&mut self) {
        for flag in self.agent_readiness.values_mut() {
            *flag = false;
        }
    }

    /// Check whether every agent has signaled readiness.
    pub fn all_agents_ready(&self) -> bool {
        self.agent_readiness.values().all(|r| *r)
    }

    /// Agents that have not signaled readiness yet, in sorted order.
    pub fn unready_agents(&self) -> Vec<String> {
        self.agent_readiness
            .iter()
            .filter(|(_, ready)| !**ready)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The agent ids participating in this run, in sorted order.
    pub fn agent_ids(&self) -> Vec<String> {
        self.agent_readiness.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_agents(agents: &[&str]) -> RoundtableState {
        let issue = Issue::new("I1", "problem", "background");
        let ids: Vec<String> = agents.iter().map(|a| a.to_string()).collect();
        RoundtableState::new(issue, &ids)
    }

    #[test]
    fn test_proposal_ids_are_monotonic_from_one() {
        let mut state = state_with_agents(&["A"]);
        assert_eq!(state.next_proposal_id(), 1);
        assert_eq!(state.next_proposal_id(), 2);
        assert_eq!(state.next_proposal_id(), 3);
    }

    #[test]
    fn test_readiness_round_trip() {
        let mut state = state_with_agents(&["A", "B"]);
        assert!(!state.all_agents_ready());

        state.mark_ready("A");
        assert_eq!(state.unready_agents(), vec!["B".to_string()]);

        state.mark_ready("B");
        assert!(state.all_agents_ready());

        state.reset_readiness();
        assert_eq!(state.unready_agents().len(), 2);
    }

    #[test]
    fn test_mark_ready_is_idempotent_and_ignores_unknown() {
        let mut state = state_with_agents(&["A"]);
        state.mark_ready("A");
        state.mark_ready("A");
        state.mark_ready("nobody");

        assert!(state.all_agents_ready());
        assert_eq!(state.agent_readiness.len(), 1);
    }
}
