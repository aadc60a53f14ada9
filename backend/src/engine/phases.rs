//! Phase definitions and per-phase lifecycle
//!
//! A run is an ordered list of phases generated from config:
//!
//! ```text
//! Propose
//! (Feedback(i), Revise(i))  for i in 1..=revision_cycles
//! Stake(1) .. Stake(staking_rounds + 1)
//! Finalize
//! ```
//!
//! Each phase spans up to `max_think_ticks` engine ticks and runs the
//! lifecycle `begin -> do -> finish`: `begin` on the phase's first tick,
//! `do` every tick (signaling agents), `finish` on the tick the think
//! budget is exhausted.

use crate::config::GlobalConfig;
use crate::engine::controller::signal_ready;
use crate::ledger::CreditLedger;
use crate::models::action::ActionQueue;
use crate::models::proposal::Proposal;
use crate::models::signal::{Signal, SignalHandler};
use crate::models::stake::StakeKind;
use crate::models::state::RoundtableState;
use crate::sink::{EventSink, EventType, LogEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;

/// Phase discriminator, used in events and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseKind {
    Propose,
    Feedback,
    Revise,
    Stake,
    Finalize,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Propose => "PROPOSE",
            PhaseKind::Feedback => "FEEDBACK",
            PhaseKind::Revise => "REVISE",
            PhaseKind::Stake => "STAKE",
            PhaseKind::Finalize => "FINALIZE",
        };
        f.write_str(name)
    }
}

/// Per-phase parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseSpec {
    Propose,
    /// Feedback phase of the given revision cycle (1-based)
    Feedback { cycle: usize },
    /// Revise phase of the given revision cycle (1-based)
    Revise { cycle: usize },
    /// Stake round (1-based; round 1 converts initial stakes)
    Stake { round: usize },
    Finalize,
}

/// One phase in the generated schedule.
#[derive(Debug, Clone)]
pub struct Phase {
    pub spec: PhaseSpec,
    pub phase_number: usize,
    pub max_think_ticks: usize,
}

impl Phase {
    /// The phase discriminator.
    pub fn kind(&self) -> PhaseKind {
        match self.spec {
            PhaseSpec::Propose => PhaseKind::Propose,
            PhaseSpec::Feedback { .. } => PhaseKind::Feedback,
            PhaseSpec::Revise { .. } => PhaseKind::Revise,
            PhaseSpec::Stake { .. } => PhaseKind::Stake,
            PhaseSpec::Finalize => PhaseKind::Finalize,
        }
    }
}

/// Generate the phase schedule for a run.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::config::GlobalConfig;
/// use roundtable_consensus_core_rs::engine::phases::{generate_phases, PhaseKind};
///
/// let phases = generate_phases(&GlobalConfig::standard(2, 5));
/// // Propose + 2 * (Feedback, Revise) + 6 stake rounds + Finalize
/// assert_eq!(phases.len(), 12);
/// assert_eq!(phases[0].kind(), PhaseKind::Propose);
/// assert_eq!(phases[11].kind(), PhaseKind::Finalize);
/// ```
pub fn generate_phases(config: &GlobalConfig) -> Vec<Phase> {
    let mut phases = Vec::new();
    let mut number = 0;
    let mut push = |spec: PhaseSpec, phases: &mut Vec<Phase>| {
        phases.push(Phase {
            spec,
            phase_number: number,
            max_think_ticks: config.max_think_ticks,
        });
        number += 1;
    };

    push(PhaseSpec::Propose, &mut phases);
    for cycle in 1..=config.revision_cycles {
        push(PhaseSpec::Feedback { cycle }, &mut phases);
        push(PhaseSpec::Revise { cycle }, &mut phases);
    }
    for round in 1..=config.staking_rounds + 1 {
        push(PhaseSpec::Stake { round }, &mut phases);
    }
    push(PhaseSpec::Finalize, &mut phases);
    phases
}

/// Borrowed engine internals a phase operates on.
pub(crate) struct PhaseCtx<'a> {
    pub global: &'a GlobalConfig,
    pub issue_id: &'a str,
    pub state: &'a mut RoundtableState,
    pub ledger: &'a mut CreditLedger,
    pub queue: &'a mut ActionQueue,
    pub agents: &'a mut [Box<dyn SignalHandler>],
    pub sink: &'a mut dyn EventSink,
}

impl Phase {
    /// Run the lifecycle for the current tick.
    pub(crate) fn execute(&self, ctx: &mut PhaseCtx<'_>) {
        if ctx.state.phase_tick == 1 {
            self.begin(ctx);
        }
        self.run(ctx);
        if ctx.state.phase_tick == self.max_think_ticks {
            self.finish(ctx);
        }
    }

    /// Phase initialization on its first tick.
    fn begin(&self, ctx: &mut PhaseCtx<'_>) {
        ctx.sink.emit(
            LogEntry::new(
                EventType::PhaseBegin,
                format!("{} Phase [{}] beginning", self.kind(), self.phase_number),
            )
            .tick(ctx.state.tick)
            .phase(Some(self.kind()))
            .payload(json!({
                "phase_number": self.phase_number,
                "max_think_ticks": self.max_think_ticks,
                "issue_id": ctx.issue_id,
            })),
        );

        match self.spec {
            PhaseSpec::Propose => self.begin_propose(ctx),
            PhaseSpec::Stake { round: 1 } => self.begin_first_stake_round(ctx),
            _ => {}
        }
    }

    /// Create the system NoAction proposal (id 0) if it does not exist.
    fn begin_propose(&self, ctx: &mut PhaseCtx<'_>) {
        let tick = ctx.state.tick;
        let Some(issue) = ctx.state.current_issue.as_mut() else {
            return;
        };
        if issue.proposal(0).is_some() {
            return;
        }

        issue.add_proposal(Proposal::no_action(ctx.issue_id, tick));
        ctx.sink.emit(
            LogEntry::new(
                EventType::ProposalReceived,
                format!("NoAction proposal #0 created for issue {}", ctx.issue_id),
            )
            .tick(tick)
            .phase(Some(PhaseKind::Propose))
            .payload(json!({
                "proposal_id": 0,
                "agent_id": "system",
                "issue_id": ctx.issue_id,
                "proposal_type": "noaction",
            })),
        );
    }

    /// Convert initial self-stakes into the first round of conviction.
    ///
    /// This is the only point at which initial stakes enter the
    /// conviction table.
    fn begin_first_stake_round(&self, ctx: &mut PhaseCtx<'_>) {
        let tick = ctx.state.tick;
        let initial: Vec<(String, u64, i64)> = ctx
            .ledger
            .stake_ledger()
            .iter()
            .filter(|r| r.stake_type == StakeKind::Initial && r.issue_id == ctx.issue_id)
            .map(|r| (r.agent_id.clone(), r.proposal_id, r.cp))
            .collect();

        for (agent_id, proposal_id, cp) in initial {
            ctx.ledger.update_conviction(
                &agent_id,
                proposal_id,
                cp,
                &ctx.global.conviction_params,
                1,
                tick,
                ctx.issue_id,
                ctx.sink,
            );
            ctx.sink.emit(
                LogEntry::new(
                    EventType::ProposalStakeTransferred,
                    format!(
                        "Transferred initial proposal stake: {} {} CP -> #{} (Round 1)",
                        agent_id, cp, proposal_id
                    ),
                )
                .tick(tick)
                .phase(Some(PhaseKind::Stake))
                .agent(agent_id)
                .payload(json!({
                    "proposal_id": proposal_id,
                    "stake_amount": cp,
                    "issue_id": ctx.issue_id,
                })),
            );
        }
    }

    /// Main phase logic, executed every tick: signal the agents.
    fn run(&self, ctx: &mut PhaseCtx<'_>) {
        match &self.spec {
            PhaseSpec::Propose => self.run_propose(ctx),
            PhaseSpec::Feedback { cycle } => self.run_feedback(ctx, *cycle),
            PhaseSpec::Revise { cycle } => self.run_revise(ctx, *cycle),
            PhaseSpec::Stake { round } => self.run_stake(ctx, *round),
            PhaseSpec::Finalize => self.run_finalize(ctx),
        }
    }

    fn run_propose(&self, ctx: &mut PhaseCtx<'_>) {
        let tick = ctx.state.tick;
        for agent in ctx.agents.iter_mut() {
            let signal = Signal::Propose {
                tick,
                issue_id: ctx.issue_id.to_string(),
                phase_number: self.phase_number,
                max_think_ticks: self.max_think_ticks,
                proposal_self_stake: ctx.global.proposal_self_stake,
                current_balance: ctx.ledger.balance(agent.agent_id()),
            };
            agent.on_signal(&signal, ctx.queue);
        }
    }

    fn run_feedback(&self, ctx: &mut PhaseCtx<'_>, cycle: usize) {
        let tick = ctx.state.tick;
        let all_proposals = backed_proposals(ctx.state);
        // Resolve quota state up front so the signal loop does not hold a
        // borrow on the issue.
        let quota_reached: Vec<(String, bool)> = ctx
            .agents
            .iter()
            .map(|agent| {
                let count = ctx
                    .state
                    .current_issue
                    .as_ref()
                    .map(|issue| issue.count_feedbacks_by(agent.agent_id()))
                    .unwrap_or(0);
                (
                    agent.agent_id().to_string(),
                    count >= ctx.global.max_feedback_per_agent,
                )
            })
            .collect();

        for (agent, (agent_id, reached)) in ctx.agents.iter_mut().zip(quota_reached) {
            if reached {
                ctx.state.mark_ready(&agent_id);
                continue;
            }
            let signal = Signal::Feedback {
                tick,
                issue_id: ctx.issue_id.to_string(),
                cycle_number: cycle,
                max_feedback: ctx.global.max_feedback_per_agent,
                feedback_stake: ctx.global.feedback_stake,
                current_balance: ctx.ledger.balance(&agent_id),
                current_proposal_id: ctx
                    .state
                    .current_issue
                    .as_ref()
                    .and_then(|issue| issue.proposal_for_agent(&agent_id)),
                all_proposals: all_proposals.clone(),
            };
            agent.on_signal(&signal, ctx.queue);
        }
    }

    fn run_revise(&self, ctx: &mut PhaseCtx<'_>, cycle: usize) {
        let tick = ctx.state.tick;
        let all_proposals = backed_proposals(ctx.state);
        for agent in ctx.agents.iter_mut() {
            let signal = Signal::Revise {
                tick,
                issue_id: ctx.issue_id.to_string(),
                cycle_number: cycle,
                proposal_self_stake: ctx.global.proposal_self_stake,
                current_balance: ctx.ledger.balance(agent.agent_id()),
                current_proposal_id: ctx
                    .state
                    .current_issue
                    .as_ref()
                    .and_then(|issue| issue.proposal_for_agent(agent.agent_id())),
                all_proposals: all_proposals.clone(),
            };
            agent.on_signal(&signal, ctx.queue);
        }
    }

    fn run_stake(&self, ctx: &mut PhaseCtx<'_>, round: usize) {
        let tick = ctx.state.tick;

        // From the second round on, positions held without fresh stakes
        // keep building conviction. Streaks advance at most once per
        // round, so re-running on later think ticks is a no-op.
        if round > 1 {
            let built = ctx.ledger.auto_build_conviction(
                &ctx.global.conviction_params,
                round,
                tick,
                ctx.issue_id,
                ctx.sink,
            );
            if built > 0 {
                ctx.sink.emit(
                    LogEntry::new(
                        EventType::ConvictionUpdated,
                        format!(
                            "Auto-built conviction on {} positions for round {}",
                            built, round
                        ),
                    )
                    .tick(tick)
                    .phase(Some(PhaseKind::Stake))
                    .payload(json!({
                        "positions_built": built,
                        "round_number": round,
                        "auto_build": true,
                    })),
                );
            }
        }

        let all_proposals = backed_proposals(ctx.state);
        let conviction = ctx.ledger.conviction_view();
        for agent in ctx.agents.iter_mut() {
            let signal = Signal::Stake {
                tick,
                issue_id: ctx.issue_id.to_string(),
                round_number: round,
                conviction_params: ctx.global.conviction_params.clone(),
                current_balance: ctx.ledger.balance(agent.agent_id()),
                current_proposal_id: ctx
                    .state
                    .current_issue
                    .as_ref()
                    .and_then(|issue| issue.proposal_for_agent(agent.agent_id())),
                all_proposals: all_proposals.clone(),
                current_conviction: conviction.clone(),
            };
            agent.on_signal(&signal, ctx.queue);
        }
    }

    fn run_finalize(&self, ctx: &mut PhaseCtx<'_>) {
        let tick = ctx.state.tick;
        for agent in ctx.agents.iter_mut() {
            let signal = Signal::Finalize {
                tick,
                issue_id: ctx.issue_id.to_string(),
                phase_number: self.phase_number,
            };
            agent.on_signal(&signal, ctx.queue);
        }
        // Finalization needs no agent input.
        let agent_ids = ctx.state.agent_ids();
        for agent_id in agent_ids {
            ctx.state.mark_ready(&agent_id);
        }
    }

    /// Phase cleanup on the tick the think budget is exhausted.
    fn finish(&self, ctx: &mut PhaseCtx<'_>) {
        ctx.sink.emit(
            LogEntry::new(
                EventType::PhaseFinish,
                format!(
                    "{} Phase [{}] finishing at phase tick {}",
                    self.kind(),
                    self.phase_number,
                    ctx.state.phase_tick
                ),
            )
            .tick(ctx.state.tick)
            .phase(Some(self.kind()))
            .payload(json!({
                "phase_number": self.phase_number,
                "phase_tick": ctx.state.phase_tick,
                "issue_id": ctx.issue_id,
            })),
        );

        match self.spec {
            PhaseSpec::Propose => self.finish_propose(ctx),
            PhaseSpec::Feedback { .. } => self.finish_feedback(ctx),
            _ => {}
        }
    }

    /// Timeout handling: stake inactive agents to NoAction so every agent
    /// carries a proposal into later phases.
    fn finish_propose(&self, ctx: &mut PhaseCtx<'_>) {
        let tick = ctx.state.tick;
        let defaulted: Vec<String> = ctx
            .state
            .agent_ids()
            .into_iter()
            .filter(|agent_id| {
                let ready = ctx
                    .state
                    .agent_readiness
                    .get(agent_id)
                    .copied()
                    .unwrap_or(false);
                let assigned = ctx
                    .state
                    .current_issue
                    .as_ref()
                    .and_then(|issue| issue.proposal_for_agent(agent_id))
                    .is_some();
                !ready || !assigned
            })
            .collect();

        for agent_id in defaulted {
            ctx.ledger.stake_to_proposal(
                &agent_id,
                0,
                ctx.global.proposal_self_stake,
                tick,
                ctx.issue_id,
                StakeKind::Initial,
                ctx.sink,
            );
            if let Some(issue) = ctx.state.current_issue.as_mut() {
                issue.assign_agent_to_proposal(&agent_id, 0);
            }
            signal_ready(
                ctx.state,
                ctx.sink,
                &agent_id,
                json!({ "reason": "no_action_proposal" }),
            );
        }
    }

    /// Timeout handling: force every agent ready and report cycle stats.
    fn finish_feedback(&self, ctx: &mut PhaseCtx<'_>) {
        let tick = ctx.state.tick;
        let (total, participants, targets) = ctx
            .state
            .current_issue
            .as_ref()
            .map(|issue| {
                let froms: BTreeSet<&str> =
                    issue.feedback_log.iter().map(|f| f.from.as_str()).collect();
                let tos: BTreeSet<u64> = issue
                    .feedback_log
                    .iter()
                    .map(|f| f.target_proposal_id)
                    .collect();
                (issue.feedback_log.len(), froms.len(), tos.len())
            })
            .unwrap_or((0, 0, 0));

        let agent_ids = ctx.state.agent_ids();
        for agent_id in agent_ids {
            ctx.state.mark_ready(&agent_id);
        }

        ctx.sink.emit(
            LogEntry::new(
                EventType::PhaseTimeout,
                format!(
                    "Feedback Phase [{}] timed out: {} feedbacks from {} agents",
                    self.phase_number, total, participants
                ),
            )
            .tick(tick)
            .phase(Some(PhaseKind::Feedback))
            .payload(json!({
                "phase_number": self.phase_number,
                "feedbacks_submitted": total,
                "agents_participated": participants,
                "target_proposals": targets,
            })),
        );
    }
}

/// Distinct proposal ids currently backed by any agent, sorted.
fn backed_proposals(state: &RoundtableState) -> Vec<u64> {
    state
        .current_issue
        .as_ref()
        .map(|issue| {
            issue
                .agent_to_proposal_id
                .values()
                .copied()
                .collect::<BTreeSet<u64>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_phases_shape() {
        let config = GlobalConfig::standard(3, 6);
        let phases = generate_phases(&config);

        // Propose + 3 * 2 cycle phases + 7 stake rounds + Finalize
        assert_eq!(phases.len(), 1 + 6 + 7 + 1);
        assert_eq!(phases[0].spec, PhaseSpec::Propose);
        assert_eq!(phases[1].spec, PhaseSpec::Feedback { cycle: 1 });
        assert_eq!(phases[2].spec, PhaseSpec::Revise { cycle: 1 });
        assert_eq!(phases[7].spec, PhaseSpec::Stake { round: 1 });
        assert_eq!(phases[13].spec, PhaseSpec::Stake { round: 7 });
        assert_eq!(phases[14].spec, PhaseSpec::Finalize);
    }

    #[test]
    fn test_phase_numbers_are_sequential() {
        let phases = generate_phases(&GlobalConfig::standard(1, 5));
        for (i, phase) in phases.iter().enumerate() {
            assert_eq!(phase.phase_number, i);
        }
    }

    #[test]
    fn test_phase_kind_display() {
        assert_eq!(PhaseKind::Propose.to_string(), "PROPOSE");
        assert_eq!(PhaseKind::Stake.to_string(), "STAKE");
    }
}
