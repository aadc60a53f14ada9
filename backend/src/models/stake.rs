//! Stake records
//!
//! Every accepted stake appends one record to the ledger's stake list.
//! Records are append-only; a revision rewrites the `proposal_id` of the
//! records that follow the lineage, but never removes them.

use serde::{Deserialize, Serialize};

/// How a stake came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeKind {
    /// Mandatory self-stake placed at proposal submission (or the NoAction
    /// default placed on behalf of inactive agents)
    Initial,
    /// Voluntary stake placed during a stake round
    Voluntary,
}

/// One stake in the append-only stake ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeRecord {
    /// Agent that staked
    pub agent_id: String,
    /// Proposal the stake currently backs (rewritten when the proposal is
    /// revised, so stakes follow the lineage)
    pub proposal_id: u64,
    /// Staked CP amount
    pub cp: i64,
    /// Tick of the stake, updated to the transfer tick on revision
    pub tick: usize,
    /// Initial or voluntary
    pub stake_type: StakeKind,
    /// Issue the stake belongs to
    pub issue_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stake_kind_serializes_lowercase() {
        let json = serde_json::to_string(&StakeKind::Initial).unwrap();
        assert_eq!(json, "\"initial\"");
        let json = serde_json::to_string(&StakeKind::Voluntary).unwrap();
        assert_eq!(json, "\"voluntary\"");
    }
}
