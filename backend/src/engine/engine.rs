//! Roundtable engine - the phase scheduler and tick loop
//!
//! One engine instance drives one issue through the full phase schedule:
//!
//! ```text
//! For each tick t:
//! 1. Drain and process actions enqueued in response to last tick's signals
//! 2. Advance tick; detect phase transitions (reset readiness, phase tick)
//! 3. If all agents are ready and the think budget is spent, advance the
//!    phase index (no execution this tick)
//! 4. Otherwise run the phase lifecycle: begin -> do -> finish
//! 5. Record the execution ledger row and emit the state snapshot
//! ```
//!
//! # Determinism
//!
//! The loop is single-threaded and sequential. All agent randomness is
//! seeded, actions are processed in FIFO submission order, and every map
//! iterated during a tick is ordered. Same config + same seeds = an
//! identical event stream.

use crate::config::{round_to, GlobalConfig, RunConfig};
use crate::engine::controller::Controller;
use crate::engine::phases::{generate_phases, Phase, PhaseCtx, PhaseKind, PhaseSpec};
use crate::engine::snapshot::{config_hash, StateSnapshot};
use crate::ledger::{CreditEvent, CreditLedger};
use crate::models::action::ActionQueue;
use crate::models::issue::Issue;
use crate::models::signal::SignalHandler;
use crate::models::state::{ExecutionRecord, RoundtableState};
use crate::sink::{EventSink, EventType, LogEntry, LogLevel};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Fatal engine errors.
///
/// Validation rejections never surface here; they are emitted as events
/// and the run continues. An `EngineError` means the run cannot proceed.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("no active issue registered")]
    NoActiveIssue,

    #[error("run stalled at tick {0} before completing all phases")]
    Stalled(usize),
}

/// Aggregate weight of one proposal at finalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposalWeight {
    /// Sum of conviction-weighted contributions
    pub effective: f64,
    /// Sum of raw accumulated CP
    pub raw: i64,
    /// Number of distinct contributing agents
    pub contributor_count: usize,
    /// Earliest stake tick, used for tie-breaking
    pub first_stake_tick: usize,
}

/// Outcome of the finalization phase.
#[derive(Debug, Clone)]
pub struct FinalizationOutcome {
    /// Winning proposal, or None when no stakes were found
    pub winner_proposal_id: Option<u64>,
    pub winner_effective_weight: f64,
    pub winner_raw_weight: i64,
    /// All weighted proposals, best first
    pub rankings: Vec<(u64, ProposalWeight)>,
    /// Tick at which finalization ran
    pub tick: usize,
}

/// Summary returned by [`Roundtable::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub issue_id: String,
    pub total_ticks: usize,
    pub phases_executed: Vec<String>,
    pub winner_proposal_id: Option<u64>,
    pub winner_effective_weight: f64,
}

/// The deliberation engine: owns all run state and drives the tick loop.
pub struct Roundtable<S: EventSink> {
    global: GlobalConfig,
    run: RunConfig,
    state: RoundtableState,
    ledger: CreditLedger,
    queue: ActionQueue,
    agents: Vec<Box<dyn SignalHandler>>,
    phases: Vec<Phase>,
    current_phase_index: usize,
    finalization: Option<FinalizationOutcome>,
    sink: S,
    config_hash: String,
}

impl<S: EventSink> Roundtable<S> {
    /// Create an engine for one issue.
    ///
    /// Validates both configs, assigns the selected agents to the issue,
    /// and awards each agent its assignment CP at tick 0.
    pub fn new(
        global: GlobalConfig,
        run: RunConfig,
        mut issue: Issue,
        agents: Vec<Box<dyn SignalHandler>>,
        mut sink: S,
    ) -> Result<Self, EngineError> {
        global.validate()?;
        run.validate()?;

        if issue.issue_id != run.issue_id {
            return Err(EngineError::InvalidConfig(format!(
                "issue id mismatch: issue has {}, run config has {}",
                issue.issue_id, run.issue_id
            )));
        }

        let configured: BTreeSet<&str> = run.agent_ids.iter().map(String::as_str).collect();
        let provided: BTreeSet<&str> = agents.iter().map(|a| a.agent_id()).collect();
        if configured != provided {
            return Err(EngineError::InvalidConfig(
                "agent handlers do not match the configured agent ids".to_string(),
            ));
        }

        issue.agent_ids = run.agent_ids.clone();

        let state = RoundtableState::new(issue, &run.agent_ids);
        let balances: BTreeMap<String, i64> = run
            .agent_ids
            .iter()
            .map(|id| (id.clone(), run.initial_balance(id)))
            .collect();
        let mut ledger = CreditLedger::new(balances, &mut sink);

        for agent_id in &run.agent_ids {
            ledger.credit(
                agent_id,
                global.assignment_award,
                "Initial credit for consensus run",
                0,
                &run.issue_id,
                &mut sink,
            );
        }

        let phases = generate_phases(&global);
        let hash = config_hash(&(&global, &run));

        Ok(Self {
            global,
            run,
            state,
            ledger,
            queue: ActionQueue::new(),
            agents,
            phases,
            current_phase_index: 0,
            finalization: None,
            sink,
            config_hash: hash,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current engine tick.
    pub fn current_tick(&self) -> usize {
        self.state.tick
    }

    /// Run state (read-only).
    pub fn state(&self) -> &RoundtableState {
        &self.state
    }

    /// Credit ledger (read-only).
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// The event sink, typed as constructed.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Finalization outcome, once the issue has been decided.
    pub fn finalization(&self) -> Option<&FinalizationOutcome> {
        self.finalization.as_ref()
    }

    /// The generated phase schedule.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Whether all phases have completed.
    pub fn is_complete(&self) -> bool {
        self.current_phase_index >= self.phases.len()
    }

    // ========================================================================
    // Run loop
    // ========================================================================

    /// Run the deliberation to completion and summarize the outcome.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        if self.state.current_issue.is_none() {
            return Err(EngineError::NoActiveIssue);
        }

        // Generous upper bound: a phase can stall only while some agent
        // withholds readiness, and timeouts bound that per phase.
        let max_ticks = (self.phases.len() + 1) * (self.global.max_think_ticks + 1) * 8;

        while !self.is_complete() {
            self.tick();
            if self.state.tick > max_ticks {
                self.sink.emit(
                    LogEntry::new(
                        EventType::SimulationError,
                        format!("Run stalled at tick {}", self.state.tick),
                    )
                    .tick(self.state.tick)
                    .phase(self.state.current_phase)
                    .payload(json!({
                        "current_phase_index": self.current_phase_index,
                        "unready_agents": self.state.unready_agents(),
                    }))
                    .level(LogLevel::Error),
                );
                return Err(EngineError::Stalled(self.state.tick));
            }
        }

        let phases_executed = self
            .phases
            .iter()
            .map(|p| format!("Phase {}: {}", p.phase_number, p.kind()))
            .collect();

        Ok(RunSummary {
            issue_id: self.run.issue_id.clone(),
            total_ticks: self.state.tick,
            phases_executed,
            winner_proposal_id: self.finalization.as_ref().and_then(|f| f.winner_proposal_id),
            winner_effective_weight: self
                .finalization
                .as_ref()
                .map(|f| f.winner_effective_weight)
                .unwrap_or(0.0),
        })
    }

    /// Execute one engine tick.
    pub fn tick(&mut self) {
        // Actions enqueued in response to the previous tick's signals are
        // applied before any phase logic sees the new tick.
        let actions = self.queue.drain();
        if !actions.is_empty() {
            let mut controller = Controller {
                global: &self.global,
                state: &mut self.state,
                ledger: &mut self.ledger,
                sink: &mut self.sink,
            };
            controller.process(actions);
        }

        self.state.tick += 1;

        let Some(phase) = self.phases.get(self.current_phase_index).cloned() else {
            return;
        };

        if self.state.current_phase_number != Some(phase.phase_number) {
            self.state.current_phase = Some(phase.kind());
            self.state.current_phase_number = Some(phase.phase_number);
            self.state.phase_start_tick = self.state.tick;
            self.state.phase_tick = 1;
            self.state.reset_readiness();
        } else {
            self.state.phase_tick += 1;
        }

        self.sink.emit(
            LogEntry::new(
                EventType::ConsensusTick,
                format!(
                    "Tick {} - Phase {} (Phase Tick {})",
                    self.state.tick,
                    phase.kind(),
                    self.state.phase_tick
                ),
            )
            .tick(self.state.tick)
            .phase(self.state.current_phase)
            .payload(json!({ "phase_tick": self.state.phase_tick }))
            .level(LogLevel::Debug),
        );

        let think_ticks_expired = self.state.phase_tick > phase.max_think_ticks;
        if self.state.all_agents_ready() && think_ticks_expired {
            self.sink.emit(
                LogEntry::new(
                    EventType::PhaseTransition,
                    "All agents ready and think ticks expired - advancing phase",
                )
                .tick(self.state.tick)
                .phase(self.state.current_phase)
                .payload(json!({ "current_phase_index": self.current_phase_index })),
            );
            self.current_phase_index += 1;
        } else {
            let mut ctx = PhaseCtx {
                global: &self.global,
                issue_id: &self.run.issue_id,
                state: &mut self.state,
                ledger: &mut self.ledger,
                queue: &mut self.queue,
                agents: &mut self.agents,
                sink: &mut self.sink,
            };
            phase.execute(&mut ctx);
            // The decision itself is part of the Finalize phase's work
            // and runs exactly once.
            if phase.spec == PhaseSpec::Finalize && !self.state.issue_finalized {
                self.finalize_issue();
            }
        }

        self.state.execution_ledger.push(ExecutionRecord {
            tick: self.state.tick,
            phase: self.state.current_phase,
            phase_tick: self.state.phase_tick,
            agent_readiness: self.state.agent_readiness.clone(),
        });

        let snapshot = StateSnapshot::capture(&self.state, &self.ledger, &self.config_hash);
        self.sink.save_snapshot(snapshot);
        self.sink.emit(
            LogEntry::new(
                EventType::StateSnapshot,
                format!("State snapshot saved for tick {}", self.state.tick),
            )
            .tick(self.state.tick)
            .phase(self.state.current_phase)
            .payload(json!({ "phase_tick": self.state.phase_tick }))
            .level(LogLevel::Debug),
        );
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Decide the issue: rank proposals by aggregate effective conviction
    /// weight and emit the finalization event sequence.
    fn finalize_issue(&mut self) {
        let tick = self.state.tick;
        let issue_id = self.run.issue_id.clone();

        self.sink.emit(
            LogEntry::new(
                EventType::FinalizationStart,
                format!("Starting finalization for issue {} at tick {}", issue_id, tick),
            )
            .tick(tick)
            .phase(Some(PhaseKind::Finalize))
            .payload(json!({ "issue_id": issue_id })),
        );

        let weights = self.aggregate_conviction_weights();

        if weights.is_empty() {
            self.sink.emit(
                LogEntry::new(
                    EventType::FinalizationWarning,
                    "No conviction stakes found for finalization",
                )
                .tick(tick)
                .phase(Some(PhaseKind::Finalize))
                .payload(json!({ "issue_id": issue_id, "reason": "no_stakes_found" }))
                .level(LogLevel::Warning),
            );
            self.emit_decision(None, &ProposalWeight::default(), tick, &issue_id);
            self.finalization = Some(FinalizationOutcome {
                winner_proposal_id: None,
                winner_effective_weight: 0.0,
                winner_raw_weight: 0,
                rankings: Vec::new(),
                tick,
            });
            self.complete_finalization(None, tick, &issue_id);
            return;
        }

        let mut rankings: Vec<(u64, ProposalWeight)> = weights.into_iter().collect();
        rankings.sort_by(rank_order);
        let (winner_id, winner_weight) = rankings[0].clone();

        self.emit_decision(Some(winner_id), &winner_weight, tick, &issue_id);
        self.emit_influence(winner_id, tick, &issue_id);

        self.finalization = Some(FinalizationOutcome {
            winner_proposal_id: Some(winner_id),
            winner_effective_weight: winner_weight.effective,
            winner_raw_weight: winner_weight.raw,
            rankings,
            tick,
        });
        self.complete_finalization(Some(winner_id), tick, &issue_id);
    }

    /// Aggregate effective weights per proposal from the conviction
    /// tables.
    fn aggregate_conviction_weights(&self) -> BTreeMap<u64, ProposalWeight> {
        let mut weights: BTreeMap<u64, ProposalWeight> = BTreeMap::new();
        for (_, proposal_id, entry) in self.ledger.conviction_pairs() {
            let multiplier = self
                .global
                .conviction_params
                .multiplier(entry.consecutive_rounds);
            let effective = round_to(entry.accumulated_cp as f64 * multiplier, 2);

            let weight = weights.entry(proposal_id).or_insert_with(|| ProposalWeight {
                first_stake_tick: self
                    .ledger
                    .first_stake_tick(proposal_id)
                    .unwrap_or(usize::MAX),
                ..ProposalWeight::default()
            });
            weight.effective = round_to(weight.effective + effective, 2);
            weight.raw += entry.accumulated_cp;
            weight.contributor_count += 1;
        }
        weights
    }

    fn emit_decision(
        &mut self,
        winner: Option<u64>,
        weight: &ProposalWeight,
        tick: usize,
        issue_id: &str,
    ) {
        let author = match winner {
            Some(0) => "system".to_string(),
            Some(pid) => self
                .state
                .current_issue
                .as_ref()
                .and_then(|issue| issue.proposal(pid))
                .map(|p| p.author.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            None => "system".to_string(),
        };

        let message = match winner {
            Some(pid) => format!(
                "Proposal {} declared winner with {} CP effective weight",
                pid, weight.effective
            ),
            None => "No winner determined - no conviction stakes found".to_string(),
        };

        self.ledger.record_event(CreditEvent::Finalization {
            tick,
            proposal_id: winner,
            effective_weight: weight.effective,
            raw_weight: weight.raw,
            contributor_count: weight.contributor_count,
            issue_id: issue_id.to_string(),
        });

        self.sink.emit(
            LogEntry::new(EventType::FinalizationDecision, message)
                .tick(tick)
                .phase(Some(PhaseKind::Finalize))
                .agent(author)
                .payload(json!({
                    "proposal_id": winner,
                    "effective_weight": weight.effective,
                    "raw_weight": weight.raw,
                    "contributor_count": weight.contributor_count,
                    "final_tick": tick,
                    "issue_id": issue_id,
                })),
        );
    }

    /// Record each agent's contribution to the winning proposal.
    fn emit_influence(&mut self, winner_id: u64, tick: usize, issue_id: &str) {
        let contributions: Vec<(String, i64, usize)> = self
            .ledger
            .conviction_pairs()
            .into_iter()
            .filter(|(_, pid, _)| *pid == winner_id)
            .map(|(agent_id, _, entry)| {
                (
                    agent_id.to_string(),
                    entry.accumulated_cp,
                    entry.consecutive_rounds,
                )
            })
            .collect();

        for (agent_id, raw_stake, rounds) in contributions {
            let multiplier = self.global.conviction_params.multiplier(rounds);
            let contribution = round_to(raw_stake as f64 * multiplier, 2);

            self.ledger.record_event(CreditEvent::Influence {
                tick,
                agent_id: agent_id.clone(),
                proposal_id: winner_id,
                contribution,
                raw_stake,
                multiplier,
                issue_id: issue_id.to_string(),
            });
            self.sink.emit(
                LogEntry::new(
                    EventType::InfluenceRecorded,
                    format!(
                        "Agent {} contributed {} CP effective weight to winning proposal {}",
                        agent_id, contribution, winner_id
                    ),
                )
                .tick(tick)
                .phase(Some(PhaseKind::Finalize))
                .agent(agent_id)
                .payload(json!({
                    "winning_proposal_id": winner_id,
                    "contribution": contribution,
                    "raw_stake": raw_stake,
                    "multiplier": multiplier,
                    "issue_id": issue_id,
                })),
            );
        }
    }

    fn complete_finalization(&mut self, winner: Option<u64>, tick: usize, issue_id: &str) {
        self.state.issue_finalized = true;
        self.state.finalization_tick = Some(tick);
        self.state.reset_readiness();

        self.sink.emit(
            LogEntry::new(
                EventType::FinalizationComplete,
                format!(
                    "Finalization completed for issue {} - winner: {:?}",
                    issue_id, winner
                ),
            )
            .tick(tick)
            .phase(Some(PhaseKind::Finalize))
            .payload(json!({ "issue_id": issue_id, "winner_proposal_id": winner })),
        );
        self.sink.emit(
            LogEntry::new(
                EventType::IssueFinalized,
                format!("Issue {} finalized at tick {}", issue_id, tick),
            )
            .tick(tick)
            .phase(Some(PhaseKind::Finalize))
            .payload(json!({ "issue_id": issue_id })),
        );
    }
}

/// Ranking order: highest effective weight first, ties broken by
/// earliest first-stake tick, then by lower proposal id.
fn rank_order(a: &(u64, ProposalWeight), b: &(u64, ProposalWeight)) -> std::cmp::Ordering {
    b.1.effective
        .partial_cmp(&a.1.effective)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(a.1.first_stake_tick.cmp(&b.1.first_stake_tick))
        .then(a.0.cmp(&b.0))
}
