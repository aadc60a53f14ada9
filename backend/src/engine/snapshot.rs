//! Per-tick state snapshots
//!
//! At the end of every tick the engine serializes its complete state and
//! hands it to the sink. Snapshots make runs auditable after the fact and
//! let an observer reconstruct any intermediate state without replaying.
//!
//! The embedded config hash ties a snapshot stream to the exact
//! configuration that produced it: two streams with equal hashes and
//! equal seeds must be identical.

use crate::engine::phases::PhaseKind;
use crate::ledger::{CreditEvent, CreditLedger};
use crate::models::proposal::Proposal;
use crate::models::stake::StakeRecord;
use crate::models::state::{ExecutionRecord, RoundtableState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Complete engine state at the end of one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tick: usize,
    pub phase: Option<PhaseKind>,
    pub phase_tick: usize,

    /// Spendable balances per agent
    pub agent_balances: BTreeMap<String, i64>,

    /// CP locked in the staked bucket per agent
    pub agent_staked: BTreeMap<String, i64>,

    /// Readiness flags per agent
    pub agent_readiness: BTreeMap<String, bool>,

    /// Currently backed proposal per agent
    pub agent_proposal_ids: BTreeMap<String, u64>,

    /// All proposal versions
    pub proposals: Vec<Proposal>,

    /// The append-only stake ledger
    pub stake_records: Vec<StakeRecord>,

    /// The append-only credit event list
    pub credit_events: Vec<CreditEvent>,

    /// Per-tick phase progression trace
    pub execution_ledger: Vec<ExecutionRecord>,

    pub proposal_counter: u64,
    pub issue_finalized: bool,
    pub finalization_tick: Option<usize>,

    /// SHA-256 over the serialized run configuration
    pub config_hash: String,
}

impl StateSnapshot {
    /// Capture the current engine state.
    pub fn capture(state: &RoundtableState, ledger: &CreditLedger, config_hash: &str) -> Self {
        let (proposals, agent_proposal_ids) = state
            .current_issue
            .as_ref()
            .map(|issue| (issue.proposals.clone(), issue.agent_to_proposal_id.clone()))
            .unwrap_or_default();

        let agent_staked = state
            .agent_ids()
            .into_iter()
            .map(|id| {
                let staked = ledger.staked_of(&id);
                (id, staked)
            })
            .collect();

        Self {
            tick: state.tick,
            phase: state.current_phase,
            phase_tick: state.phase_tick,
            agent_balances: ledger.all_balances().clone(),
            agent_staked,
            agent_readiness: state.agent_readiness.clone(),
            agent_proposal_ids,
            proposals,
            stake_records: ledger.stake_ledger().to_vec(),
            credit_events: ledger.events().to_vec(),
            execution_ledger: state.execution_ledger.clone(),
            proposal_counter: state.proposal_counter,
            issue_finalized: state.issue_finalized,
            finalization_tick: state.finalization_tick,
            config_hash: config_hash.to_string(),
        }
    }
}

/// SHA-256 hex digest of a serializable configuration.
pub fn config_hash<T: Serialize>(config: &T) -> String {
    let encoded = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
