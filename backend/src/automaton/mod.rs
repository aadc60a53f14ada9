//! Automaton agents
//!
//! Built-in heuristic agents that drive the protocol without any external
//! decision backend. Every choice is a dice roll on the agent's own
//! seeded RNG against its probability profile, so a pool seed plus a run
//! seed pins down every action of every agent in a run.
//!
//! The engine treats these as ordinary [`SignalHandler`] collaborators;
//! nothing in the protocol depends on them.

use crate::models::action::{Action, ActionQueue};
use crate::models::signal::{Signal, SignalHandler};
use crate::rng::RngManager;

/// Per-agent behavior probabilities (percentages).
#[derive(Debug, Clone)]
pub struct AgentProfile {
    /// Chance to submit a proposal in the Propose phase
    pub proposal_likelihood: u32,
    /// Chance to comment during a Feedback phase
    pub feedback_likelihood: u32,
    /// Chance to revise the own proposal during a Revise phase
    pub revision_likelihood: u32,
    /// Share of the current balance staked per stake round
    pub stake_fraction: u32,
    /// Chance to switch part of the accumulated conviction
    pub switch_likelihood: u32,
    /// Chance to withdraw part of the accumulated conviction
    pub unstake_likelihood: u32,
}

/// One agent in the selection pool.
#[derive(Debug, Clone)]
pub struct PoolAgent {
    pub agent_id: String,
    pub initial_balance: i64,
    pub seed: u64,
    pub profile: AgentProfile,
}

impl PoolAgent {
    /// Instantiate the live actor for a run.
    pub fn to_actor(&self) -> AgentActor {
        AgentActor::new(&self.agent_id, self.seed, self.profile.clone())
    }
}

/// Seeded pool of candidate agents.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::automaton::AgentPool;
///
/// let pool = AgentPool::generate(1113, 12);
/// assert_eq!(pool.len(), 12);
///
/// let picked = pool.select(5, 1719);
/// assert_eq!(picked.len(), 5);
///
/// // Same seeds, same pool, same selection.
/// let again = AgentPool::generate(1113, 12).select(5, 1719);
/// let ids: Vec<_> = picked.iter().map(|a| a.agent_id.clone()).collect();
/// let ids2: Vec<_> = again.iter().map(|a| a.agent_id.clone()).collect();
/// assert_eq!(ids, ids2);
/// ```
#[derive(Debug, Clone)]
pub struct AgentPool {
    agents: Vec<PoolAgent>,
}

impl AgentPool {
    /// Generate a pool of `size` agents from a seed.
    ///
    /// Balances and profiles vary per agent but are fully determined by
    /// the pool seed.
    pub fn generate(pool_seed: u64, size: usize) -> Self {
        let mut rng = RngManager::new(pool_seed);
        let agents = (0..size)
            .map(|i| PoolAgent {
                agent_id: format!("Agent_{}", i),
                initial_balance: rng.range(0, 300),
                seed: pool_seed.wrapping_add(i as u64 + 1),
                profile: AgentProfile {
                    proposal_likelihood: rng.range(1, 100) as u32,
                    feedback_likelihood: rng.range(30, 90) as u32,
                    revision_likelihood: rng.range(20, 80) as u32,
                    stake_fraction: rng.range(10, 60) as u32,
                    switch_likelihood: rng.range(0, 20) as u32,
                    unstake_likelihood: rng.range(0, 10) as u32,
                },
            })
            .collect();
        Self { agents }
    }

    /// Number of agents in the pool.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All pool agents, in generation order.
    pub fn agents(&self) -> &[PoolAgent] {
        &self.agents
    }

    /// Select `n` distinct agents with a seeded draw.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the pool size.
    pub fn select(&self, n: usize, seed: u64) -> Vec<PoolAgent> {
        let mut rng = RngManager::new(seed);
        rng.sample(&self.agents, n)
    }
}

/// Sentence bank for generated proposal content.
///
/// Plain declarative sentences keep the sentence tokenizer and the
/// revision delta well behaved.
const SENTENCES: &[&str] = &[
    "Allocate the remaining budget to the pilot group.",
    "Rotate coordination duties every cycle.",
    "Publish a written status summary before each session.",
    "Split the work into two independent tracks.",
    "Defer new commitments until the backlog clears.",
    "Consolidate the tooling around a single shared stack.",
    "Run a limited trial before any wider rollout.",
    "Reserve a fixed share of credits for contingencies.",
    "Review the outcome criteria at the midpoint.",
    "Assign a dedicated owner for follow-through.",
];

const COMMENTS: &[&str] = &[
    "The scope seems too broad for one cycle.",
    "Needs a clearer cost estimate.",
    "Strong direction, but the timeline is optimistic.",
    "Consider the downstream effect on the other track.",
    "The contingency share looks too small.",
    "Ownership of the follow-up is unclear.",
];

/// Heuristic agent driven by a seeded RNG.
///
/// The actor decides once per phase: on the first signal of a phase it
/// either enqueues a protocol action or a ready signal; later think-tick
/// signals for the same phase are ignored.
#[derive(Debug, Clone)]
pub struct AgentActor {
    agent_id: String,
    rng: RngManager,
    profile: AgentProfile,
    /// Sentences of the agent's own current proposal text
    sentences: Vec<String>,
    has_authored: bool,
    /// Phase identity last decided on, to act once per phase
    last_decision: Option<(u8, usize)>,
}

impl AgentActor {
    /// Create an actor with its own seeded RNG.
    pub fn new(agent_id: &str, seed: u64, profile: AgentProfile) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            rng: RngManager::new(seed),
            profile,
            sentences: Vec::new(),
            has_authored: false,
            last_decision: None,
        }
    }

    /// Identity key of the phase a signal belongs to.
    fn phase_key(signal: &Signal) -> (u8, usize) {
        match signal {
            Signal::Propose { .. } => (0, 0),
            Signal::Feedback { cycle_number, .. } => (1, *cycle_number),
            Signal::Revise { cycle_number, .. } => (2, *cycle_number),
            Signal::Stake { round_number, .. } => (3, *round_number),
            Signal::Finalize { .. } => (4, 0),
        }
    }

    fn compose_proposal(&mut self) -> String {
        let mut picked = Vec::new();
        for _ in 0..3 {
            picked.push(self.rng.pick(SENTENCES).to_string());
        }
        self.sentences = picked;
        self.sentences.join(" ")
    }

    /// Rework the stored text: swap the final sentence and extend by one.
    /// Keeps the sentence-level delta comfortably inside [0.1, 1.0].
    fn compose_revision(&mut self) -> String {
        let replacement = self.rng.pick(SENTENCES).to_string();
        let addition = self.rng.pick(SENTENCES).to_string();
        if let Some(last) = self.sentences.last_mut() {
            *last = replacement;
        }
        self.sentences.push(addition);
        self.sentences.join(" ")
    }

    fn decide_propose(
        &mut self,
        queue: &mut ActionQueue,
        tick: usize,
        issue_id: &str,
        proposal_self_stake: i64,
        current_balance: i64,
    ) {
        let willing = self.rng.chance(self.profile.proposal_likelihood);
        if willing && current_balance >= proposal_self_stake {
            let content = self.compose_proposal();
            self.has_authored = true;
            queue.submit(Action::SubmitProposal {
                agent_id: self.agent_id.clone(),
                content,
                issue_id: issue_id.to_string(),
                tick,
            });
        } else {
            queue.submit(Action::SignalReady {
                agent_id: self.agent_id.clone(),
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn decide_feedback(
        &mut self,
        queue: &mut ActionQueue,
        tick: usize,
        issue_id: &str,
        feedback_stake: i64,
        current_balance: i64,
        current_proposal_id: Option<u64>,
        all_proposals: &[u64],
    ) {
        let candidates: Vec<u64> = all_proposals
            .iter()
            .copied()
            .filter(|pid| Some(*pid) != current_proposal_id)
            .collect();

        let willing = self.rng.chance(self.profile.feedback_likelihood);
        if willing && !candidates.is_empty() && current_balance >= feedback_stake {
            let target = *self.rng.pick(&candidates);
            let comment = self.rng.pick(COMMENTS).to_string();
            queue.submit(Action::Feedback {
                agent_id: self.agent_id.clone(),
                target_proposal_id: target,
                comment,
                issue_id: issue_id.to_string(),
                tick,
            });
        } else {
            queue.submit(Action::SignalReady {
                agent_id: self.agent_id.clone(),
            });
        }
    }

    fn decide_revise(
        &mut self,
        queue: &mut ActionQueue,
        tick: usize,
        issue_id: &str,
        proposal_self_stake: i64,
        current_balance: i64,
    ) {
        let affordable = current_balance >= proposal_self_stake / 2;
        let willing = self.rng.chance(self.profile.revision_likelihood);
        if self.has_authored && willing && affordable {
            let new_content = self.compose_revision();
            queue.submit(Action::Revise {
                agent_id: self.agent_id.clone(),
                new_content,
                issue_id: issue_id.to_string(),
                tick,
            });
        } else {
            queue.submit(Action::SignalReady {
                agent_id: self.agent_id.clone(),
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn decide_stake(
        &mut self,
        queue: &mut ActionQueue,
        tick: usize,
        issue_id: &str,
        round_number: usize,
        current_balance: i64,
        current_proposal_id: Option<u64>,
        all_proposals: &[u64],
        own_conviction: &[(u64, i64)],
    ) {
        // Occasionally reshuffle an existing position instead of adding.
        if !own_conviction.is_empty() && self.rng.chance(self.profile.unstake_likelihood) {
            let (pid, cp) = *self.rng.pick(own_conviction);
            let amount = (cp / 2).max(1);
            queue.submit(Action::Unstake {
                agent_id: self.agent_id.clone(),
                proposal_id: Some(pid),
                cp_amount: amount,
                issue_id: issue_id.to_string(),
                tick,
                reason: "rebalancing".to_string(),
            });
            return;
        }

        if own_conviction.len() < all_proposals.len()
            && !own_conviction.is_empty()
            && self.rng.chance(self.profile.switch_likelihood)
        {
            let (source, cp) = *self.rng.pick(own_conviction);
            let targets: Vec<u64> = all_proposals
                .iter()
                .copied()
                .filter(|pid| *pid != source)
                .collect();
            if !targets.is_empty() && cp > 1 {
                let target = *self.rng.pick(&targets);
                queue.submit(Action::SwitchStake {
                    agent_id: self.agent_id.clone(),
                    source_proposal_id: Some(source),
                    target_proposal_id: Some(target),
                    cp_amount: (cp / 2).max(1),
                    issue_id: issue_id.to_string(),
                    tick,
                    reason: "strategic_switch".to_string(),
                });
                return;
            }
        }

        let amount = current_balance * self.profile.stake_fraction as i64 / 100;
        if amount >= 1 && !all_proposals.is_empty() {
            // Back the own proposal when there is one, otherwise join an
            // existing lineage.
            let target = current_proposal_id.unwrap_or_else(|| *self.rng.pick(all_proposals));
            let choice_reason = if Some(target) == current_proposal_id {
                "own_proposal"
            } else {
                "joined_existing"
            };
            queue.submit(Action::Stake {
                agent_id: self.agent_id.clone(),
                proposal_id: Some(target),
                stake_amount: amount,
                round_number,
                issue_id: issue_id.to_string(),
                tick,
                choice_reason: choice_reason.to_string(),
            });
        } else {
            queue.submit(Action::SignalReady {
                agent_id: self.agent_id.clone(),
            });
        }
    }
}

impl SignalHandler for AgentActor {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn on_signal(&mut self, signal: &Signal, queue: &mut ActionQueue) {
        let key = Self::phase_key(signal);
        if self.last_decision == Some(key) {
            return;
        }
        self.last_decision = Some(key);

        match signal {
            Signal::Propose {
                tick,
                issue_id,
                proposal_self_stake,
                current_balance,
                ..
            } => self.decide_propose(queue, *tick, issue_id, *proposal_self_stake, *current_balance),

            Signal::Feedback {
                tick,
                issue_id,
                feedback_stake,
                current_balance,
                current_proposal_id,
                all_proposals,
                ..
            } => self.decide_feedback(
                queue,
                *tick,
                issue_id,
                *feedback_stake,
                *current_balance,
                *current_proposal_id,
                all_proposals,
            ),

            Signal::Revise {
                tick,
                issue_id,
                proposal_self_stake,
                current_balance,
                ..
            } => self.decide_revise(queue, *tick, issue_id, *proposal_self_stake, *current_balance),

            Signal::Stake {
                tick,
                issue_id,
                round_number,
                current_balance,
                current_proposal_id,
                all_proposals,
                current_conviction,
                ..
            } => {
                let own: Vec<(u64, i64)> = current_conviction
                    .get(&self.agent_id)
                    .map(|by_proposal| by_proposal.iter().map(|(p, cp)| (*p, *cp)).collect())
                    .unwrap_or_default();
                self.decide_stake(
                    queue,
                    *tick,
                    issue_id,
                    *round_number,
                    *current_balance,
                    *current_proposal_id,
                    all_proposals,
                    &own,
                );
            }

            // Finalization needs no agent input.
            Signal::Finalize { .. } => {}
        }
    }
}
