//! Run configuration
//!
//! All protocol parameters are fixed at construction and validated before
//! the engine starts. A `GlobalConfig` describes the protocol (stakes,
//! cycles, conviction curve); a `RunConfig` describes one concrete run
//! (seed, issue, selected agents and their opening balances).

use crate::engine::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conviction growth curve parameters.
///
/// The multiplier applied to a stake grows with the number of consecutive
/// rounds the staker has supported the same proposal.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::config::ConvictionParams;
///
/// let params = ConvictionParams::Exponential {
///     max_multiplier: 2.0,
///     target_fraction: 0.98,
///     target_rounds: 5,
/// };
///
/// assert_eq!(params.multiplier(0), 1.0);
/// assert_eq!(params.multiplier(5), 1.98);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ConvictionParams {
    /// Saturating exponential: reaches `target_fraction` of the maximum
    /// gain after `target_rounds` consecutive rounds
    Exponential {
        max_multiplier: f64,
        target_fraction: f64,
        target_rounds: usize,
    },

    /// Linear fallback: `base + growth * rounds`
    Linear { base: f64, growth: f64 },
}

impl ConvictionParams {
    /// Compute the conviction multiplier for a streak length.
    ///
    /// A streak of zero rounds always yields 1.0. Results are rounded to
    /// three decimals.
    pub fn multiplier(&self, consecutive_rounds: usize) -> f64 {
        let m = match self {
            ConvictionParams::Exponential {
                max_multiplier,
                target_fraction,
                target_rounds,
            } => {
                if consecutive_rounds == 0 {
                    return 1.0;
                }
                let k = -(1.0 - target_fraction).ln() / *target_rounds as f64;
                1.0 + (max_multiplier - 1.0) * (1.0 - (-k * consecutive_rounds as f64).exp())
            }
            ConvictionParams::Linear { base, growth } => base + growth * consecutive_rounds as f64,
        };
        round_to(m, 3)
    }

    fn validate(&self) -> Result<(), EngineError> {
        match self {
            ConvictionParams::Exponential {
                max_multiplier,
                target_fraction,
                target_rounds,
            } => {
                if *max_multiplier <= 1.0 {
                    return Err(EngineError::InvalidConfig(
                        "MaxMultiplier must be > 1".to_string(),
                    ));
                }
                if *target_fraction <= 0.0 || *target_fraction >= 1.0 {
                    return Err(EngineError::InvalidConfig(
                        "TargetFraction must be in (0, 1)".to_string(),
                    ));
                }
                if *target_rounds == 0 {
                    return Err(EngineError::InvalidConfig(
                        "TargetRounds must be >= 1".to_string(),
                    ));
                }
            }
            ConvictionParams::Linear { base, growth } => {
                if *base <= 0.0 || *growth < 0.0 {
                    return Err(EngineError::InvalidConfig(
                        "linear conviction requires base > 0 and growth >= 0".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Protocol parameters shared by every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// CP granted to each assigned agent at engine start
    pub assignment_award: i64,

    /// Maximum accepted feedback entries per agent across the run
    pub max_feedback_per_agent: usize,

    /// CP burned per accepted feedback
    pub feedback_stake: i64,

    /// CP staked on proposal submission; also the base for revision cost
    pub proposal_self_stake: i64,

    /// Number of Feedback -> Revise cycles (1..=4)
    pub revision_cycles: usize,

    /// Number of conviction-building stake rounds after the first (5..=10)
    pub staking_rounds: usize,

    /// Conviction growth curve
    pub conviction_params: ConvictionParams,

    /// Maximum accepted feedback comment length in bytes
    pub feedback_comment_max_length: usize,

    /// Think ticks granted to each phase before timeout handling
    pub max_think_ticks: usize,
}

impl GlobalConfig {
    /// Standard protocol parameters with the given cycle counts.
    ///
    /// Uses the exponential conviction curve with `target_rounds` tied to
    /// the staking round count.
    pub fn standard(revision_cycles: usize, staking_rounds: usize) -> Self {
        Self {
            assignment_award: 100,
            max_feedback_per_agent: 3,
            feedback_stake: 5,
            proposal_self_stake: 50,
            revision_cycles,
            staking_rounds,
            conviction_params: ConvictionParams::Exponential {
                max_multiplier: 2.0,
                target_fraction: 0.98,
                target_rounds: staking_rounds,
            },
            feedback_comment_max_length: 500,
            max_think_ticks: 3,
        }
    }

    /// Validate all parameter ranges.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.assignment_award < 1 {
            return Err(EngineError::InvalidConfig(
                "assignment_award must be >= 1".to_string(),
            ));
        }
        if self.max_feedback_per_agent < 1 {
            return Err(EngineError::InvalidConfig(
                "max_feedback_per_agent must be >= 1".to_string(),
            ));
        }
        if self.feedback_stake < 1 {
            return Err(EngineError::InvalidConfig(
                "feedback_stake must be >= 1".to_string(),
            ));
        }
        if self.proposal_self_stake < 1 {
            return Err(EngineError::InvalidConfig(
                "proposal_self_stake must be >= 1".to_string(),
            ));
        }
        if !(1..=4).contains(&self.revision_cycles) {
            return Err(EngineError::InvalidConfig(
                "revision_cycles must be in [1, 4]".to_string(),
            ));
        }
        if !(5..=10).contains(&self.staking_rounds) {
            return Err(EngineError::InvalidConfig(
                "staking_rounds must be in [5, 10]".to_string(),
            ));
        }
        if self.max_think_ticks == 0 {
            return Err(EngineError::InvalidConfig(
                "max_think_ticks must be >= 1".to_string(),
            ));
        }
        self.conviction_params.validate()
    }
}

/// Per-run configuration: the issue, the selected agents and their
/// opening balances, and the seed recorded for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub seed: u64,
    pub issue_id: String,
    pub agent_ids: Vec<String>,
    pub initial_balances: BTreeMap<String, i64>,
}

impl RunConfig {
    /// Build a run config; balances default to zero for agents without an
    /// explicit entry.
    pub fn new(seed: u64, issue_id: &str, balances: &[(&str, i64)]) -> Self {
        Self {
            seed,
            issue_id: issue_id.to_string(),
            agent_ids: balances.iter().map(|(id, _)| id.to_string()).collect(),
            initial_balances: balances
                .iter()
                .map(|(id, b)| (id.to_string(), *b))
                .collect(),
        }
    }

    /// Validate agent selection.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.agent_ids.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one agent must be selected".to_string(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for id in &self.agent_ids {
            if !seen.insert(id) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate agent id: {}",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Opening balance for an agent (zero if unlisted).
    pub fn initial_balance(&self, agent_id: &str) -> i64 {
        self.initial_balances.get(agent_id).copied().unwrap_or(0)
    }
}

/// Round to a fixed number of decimal places.
pub(crate) fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
