//! Credit ledger
//!
//! Single source of truth for Credit Points: agent balances, the
//! recoverable staked bucket, the append-only stake ledger, and the
//! conviction tables that weight stakes at finalization.
//!
//! # Critical Invariants
//!
//! 1. A deduction never drives a balance negative; predicate operations
//!    return `false` instead of failing partially
//! 2. Stake and credit-event lists are append-only and preserve order
//! 3. An agent has a live streak (`consecutive_rounds > 0`) on at most
//!    one proposal at a time
//! 4. A streak advances at most once per stake round, whether by a
//!    voluntary stake or by the per-round auto-build
//!
//! Every state-changing outcome emits exactly one structured event to the
//! sink passed into the operation.

pub mod event;

pub use event::CreditEvent;

use crate::config::{round_to, ConvictionParams};
use crate::models::stake::{StakeKind, StakeRecord};
use crate::sink::{EventSink, EventType, LogEntry, LogLevel};
use serde_json::json;
use std::collections::BTreeMap;

/// Conviction counters for one (agent, proposal) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvictionEntry {
    /// CP accumulated toward the proposal in the current hold period
    pub accumulated_cp: i64,
    /// Streak length; resets to zero on switch or unstake
    pub consecutive_rounds: usize,
    /// Total rounds ever held; never resets
    pub total_rounds_held: usize,
    /// Last stake round in which the streak advanced
    last_counted_round: Option<usize>,
}

/// Result of a conviction update.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvictionUpdate {
    pub raw_stake: i64,
    pub multiplier: f64,
    pub effective_weight: f64,
    pub total_conviction: i64,
    pub consecutive_rounds: usize,
    /// Proposal the agent abandoned, if this update switched support
    pub switched_from: Option<u64>,
}

/// CP balances, stakes and conviction tracking for one run.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::ledger::CreditLedger;
/// use roundtable_consensus_core_rs::sink::NullSink;
/// use std::collections::BTreeMap;
///
/// let mut sink = NullSink::new();
/// let balances: BTreeMap<String, i64> = [("Agent_0".to_string(), 0)].into();
/// let mut ledger = CreditLedger::new(balances, &mut sink);
///
/// ledger.credit("Agent_0", 100, "award", 0, "Issue_1", &mut sink);
/// assert_eq!(ledger.balance("Agent_0"), 100);
///
/// assert!(ledger.try_deduct("Agent_0", 30, "fee", 1, "Issue_1", &mut sink));
/// assert!(!ledger.try_deduct("Agent_0", 500, "fee", 1, "Issue_1", &mut sink));
/// assert_eq!(ledger.balance("Agent_0"), 70);
/// ```
#[derive(Debug, Clone)]
pub struct CreditLedger {
    /// Spendable CP per agent
    balances: BTreeMap<String, i64>,

    /// CP locked in stakes, recoverable until finalize
    staked: BTreeMap<String, i64>,

    /// Append-only stake ledger
    stake_ledger: Vec<StakeRecord>,

    /// Append-only credit event list
    events: Vec<CreditEvent>,

    /// agent -> proposal -> conviction counters, created lazily
    conviction: BTreeMap<String, BTreeMap<u64, ConvictionEntry>>,

    /// Earliest tick at which any stake referenced a proposal; carried
    /// across revisions so the finalization tie-break survives lineage
    /// rewrites
    first_stake_tick: BTreeMap<u64, usize>,
}

impl CreditLedger {
    /// Create a ledger with the given opening balances.
    pub fn new(initial_balances: BTreeMap<String, i64>, sink: &mut dyn EventSink) -> Self {
        let total: i64 = initial_balances.values().sum();
        sink.emit(
            LogEntry::new(
                EventType::LedgerInit,
                format!(
                    "Credit ledger initialized with {} agents and {} total CP",
                    initial_balances.len(),
                    total
                ),
            )
            .payload(json!({
                "total_agents": initial_balances.len(),
                "total_credits": total,
            }))
            .level(LogLevel::Debug),
        );
        Self {
            balances: initial_balances,
            staked: BTreeMap::new(),
            stake_ledger: Vec::new(),
            events: Vec::new(),
            conviction: BTreeMap::new(),
            first_stake_tick: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Balances
    // ========================================================================

    /// Spendable balance of an agent (zero for unknown agents).
    pub fn balance(&self, agent_id: &str) -> i64 {
        self.balances.get(agent_id).copied().unwrap_or(0)
    }

    /// All spendable balances.
    pub fn all_balances(&self) -> &BTreeMap<String, i64> {
        &self.balances
    }

    /// CP an agent currently holds in the staked bucket.
    pub fn staked_of(&self, agent_id: &str) -> i64 {
        self.staked.get(agent_id).copied().unwrap_or(0)
    }

    /// Total CP across all staked buckets.
    pub fn total_staked(&self) -> i64 {
        self.staked.values().sum()
    }

    /// Grant CP unconditionally.
    pub fn credit(
        &mut self,
        agent_id: &str,
        amount: i64,
        reason: &str,
        tick: usize,
        issue_id: &str,
        sink: &mut dyn EventSink,
    ) {
        let new_balance = self.balance(agent_id) + amount;
        self.balances.insert(agent_id.to_string(), new_balance);
        self.events.push(CreditEvent::Credit {
            tick,
            agent_id: agent_id.to_string(),
            amount,
            reason: reason.to_string(),
            issue_id: issue_id.to_string(),
        });
        sink.emit(
            LogEntry::new(
                EventType::CreditAward,
                format!("Credit awarded: {} +{} CP ({})", agent_id, amount, reason),
            )
            .tick(tick)
            .agent(agent_id)
            .payload(json!({
                "amount": amount,
                "reason": reason,
                "issue_id": issue_id,
                "new_balance": new_balance,
            })),
        );
    }

    /// Atomically deduct CP iff the balance covers the amount.
    ///
    /// Used for burns that are gone for good (feedback stakes, revision
    /// costs). Emits `Burn` on success and `InsufficientCredit` on
    /// failure; never mutates on failure.
    pub fn try_deduct(
        &mut self,
        agent_id: &str,
        amount: i64,
        reason: &str,
        tick: usize,
        issue_id: &str,
        sink: &mut dyn EventSink,
    ) -> bool {
        self.debit_checked(agent_id, amount, reason, tick, issue_id, sink)
    }

    /// Deduct into the staked bucket iff the balance covers the amount.
    ///
    /// The CP stays attributed to the agent and is recoverable through
    /// unstaking until the issue finalizes.
    pub fn stake_credits(
        &mut self,
        agent_id: &str,
        amount: i64,
        reason: &str,
        tick: usize,
        issue_id: &str,
        sink: &mut dyn EventSink,
    ) -> bool {
        if !self.debit_checked(agent_id, amount, reason, tick, issue_id, sink) {
            return false;
        }
        *self.staked.entry(agent_id.to_string()).or_insert(0) += amount;
        true
    }

    /// Shared deduction path: balance check, balance mutation, events.
    fn debit_checked(
        &mut self,
        agent_id: &str,
        amount: i64,
        reason: &str,
        tick: usize,
        issue_id: &str,
        sink: &mut dyn EventSink,
    ) -> bool {
        let balance = self.balance(agent_id);
        if balance < amount {
            self.events.push(CreditEvent::InsufficientCredit {
                tick,
                agent_id: agent_id.to_string(),
                amount,
                reason: reason.to_string(),
                issue_id: issue_id.to_string(),
            });
            sink.emit(
                LogEntry::new(
                    EventType::InsufficientCredit,
                    format!(
                        "Insufficient credit: {} attempted {} CP but has {} CP",
                        agent_id, amount, balance
                    ),
                )
                .tick(tick)
                .agent(agent_id)
                .payload(json!({
                    "amount": amount,
                    "reason": reason,
                    "issue_id": issue_id,
                    "current_balance": balance,
                }))
                .level(LogLevel::Warning),
            );
            return false;
        }

        let new_balance = balance - amount;
        self.balances.insert(agent_id.to_string(), new_balance);
        self.events.push(CreditEvent::Burn {
            tick,
            agent_id: agent_id.to_string(),
            amount,
            reason: reason.to_string(),
            issue_id: issue_id.to_string(),
        });
        sink.emit(
            LogEntry::new(
                EventType::CreditBurn,
                format!("Credit deducted: {} -{} CP ({})", agent_id, amount, reason),
            )
            .tick(tick)
            .agent(agent_id)
            .payload(json!({
                "amount": amount,
                "reason": reason,
                "issue_id": issue_id,
                "new_balance": new_balance,
            })),
        );
        true
    }

    // ========================================================================
    // Stake ledger
    // ========================================================================

    /// Stake CP on a proposal: deduct into the staked bucket and append a
    /// stake record.
    ///
    /// On deduction failure no record is appended.
    #[allow(clippy::too_many_arguments)]
    pub fn stake_to_proposal(
        &mut self,
        agent_id: &str,
        proposal_id: u64,
        amount: i64,
        tick: usize,
        issue_id: &str,
        stake_type: StakeKind,
        sink: &mut dyn EventSink,
    ) -> bool {
        let reason = match stake_type {
            StakeKind::Initial => "Proposal Self Stake".to_string(),
            StakeKind::Voluntary => "Voluntary Stake".to_string(),
        };
        if !self.stake_credits(agent_id, amount, &reason, tick, issue_id, sink) {
            return false;
        }

        self.stake_ledger.push(StakeRecord {
            agent_id: agent_id.to_string(),
            proposal_id,
            cp: amount,
            tick,
            stake_type,
            issue_id: issue_id.to_string(),
        });
        self.first_stake_tick.entry(proposal_id).or_insert(tick);

        sink.emit(
            LogEntry::new(
                EventType::StakeRecorded,
                format!(
                    "Stake recorded: {} staked {} CP on #{}",
                    agent_id, amount, proposal_id
                ),
            )
            .tick(tick)
            .agent(agent_id)
            .payload(json!({
                "proposal_id": proposal_id,
                "amount": amount,
                "issue_id": issue_id,
                "stake_type": stake_type,
            })),
        );
        true
    }

    /// Rewrite every stake record on `old_proposal_id` to
    /// `new_proposal_id`, updating record ticks to the transfer tick.
    ///
    /// Used when a proposal is revised: all stakes, the author's and
    /// supporters' alike, follow the lineage. The proposal's earliest
    /// stake tick is carried over so the finalization tie-break still
    /// sees the original timing. Returns true iff at least one record
    /// moved.
    pub fn transfer_stake(
        &mut self,
        old_proposal_id: u64,
        new_proposal_id: u64,
        tick: usize,
        issue_id: &str,
        sink: &mut dyn EventSink,
    ) -> bool {
        let mut moved = Vec::new();
        for record in self
            .stake_ledger
            .iter_mut()
            .filter(|r| r.proposal_id == old_proposal_id)
        {
            record.proposal_id = new_proposal_id;
            record.tick = tick;
            moved.push((record.agent_id.clone(), record.cp));
        }
        if moved.is_empty() {
            return false;
        }

        if let Some(first) = self.first_stake_tick.get(&old_proposal_id).copied() {
            let entry = self
                .first_stake_tick
                .entry(new_proposal_id)
                .or_insert(first);
            *entry = (*entry).min(first);
        }

        for (agent_id, cp) in moved {
            sink.emit(
                LogEntry::new(
                    EventType::StakeTransferred,
                    format!(
                        "Transferred stake of {} CP from #{} to #{} (agent: {})",
                        cp, old_proposal_id, new_proposal_id, agent_id
                    ),
                )
                .tick(tick)
                .agent(agent_id)
                .payload(json!({
                    "old_proposal_id": old_proposal_id,
                    "new_proposal_id": new_proposal_id,
                    "amount": cp,
                    "issue_id": issue_id,
                })),
            );
        }
        true
    }

    /// All stake records, in append order.
    pub fn stake_ledger(&self) -> &[StakeRecord] {
        &self.stake_ledger
    }

    /// Stake records placed by an agent.
    pub fn stakes_by_agent(&self, agent_id: &str) -> Vec<&StakeRecord> {
        self.stake_ledger
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .collect()
    }

    /// Stake records currently backing a proposal.
    pub fn stakes_on_proposal(&self, proposal_id: u64) -> Vec<&StakeRecord> {
        self.stake_ledger
            .iter()
            .filter(|r| r.proposal_id == proposal_id)
            .collect()
    }

    /// Total CP currently recorded on a proposal.
    pub fn total_stake_on_proposal(&self, proposal_id: u64) -> i64 {
        self.stakes_on_proposal(proposal_id)
            .iter()
            .map(|r| r.cp)
            .sum()
    }

    /// Earliest tick at which any stake referenced a proposal.
    pub fn first_stake_tick(&self, proposal_id: u64) -> Option<usize> {
        self.first_stake_tick.get(&proposal_id).copied()
    }

    // ========================================================================
    // Conviction
    // ========================================================================

    /// The proposal an agent currently has a live streak on, if any.
    pub fn current_support(&self, agent_id: &str) -> Option<u64> {
        self.conviction.get(agent_id).and_then(|by_proposal| {
            by_proposal
                .iter()
                .find(|(_, e)| e.consecutive_rounds > 0)
                .map(|(pid, _)| *pid)
        })
    }

    /// Accumulated conviction CP for an agent on a proposal.
    pub fn conviction_on(&self, agent_id: &str, proposal_id: u64) -> i64 {
        self.entry(agent_id, proposal_id)
            .map(|e| e.accumulated_cp)
            .unwrap_or(0)
    }

    /// Streak length for an agent on a proposal.
    pub fn consecutive_rounds(&self, agent_id: &str, proposal_id: u64) -> usize {
        self.entry(agent_id, proposal_id)
            .map(|e| e.consecutive_rounds)
            .unwrap_or(0)
    }

    /// Total rounds an agent has ever held a proposal.
    pub fn total_rounds_held(&self, agent_id: &str, proposal_id: u64) -> usize {
        self.entry(agent_id, proposal_id)
            .map(|e| e.total_rounds_held)
            .unwrap_or(0)
    }

    /// Check whether an agent can move or withdraw `amount` CP of
    /// conviction from a proposal.
    pub fn has_sufficient_conviction(
        &self,
        agent_id: &str,
        proposal_id: u64,
        amount: i64,
    ) -> bool {
        self.conviction_on(agent_id, proposal_id) >= amount
    }

    /// All (agent, proposal, entry) triples with accumulated CP, in
    /// deterministic sorted order.
    pub fn conviction_pairs(&self) -> Vec<(&str, u64, &ConvictionEntry)> {
        let mut pairs = Vec::new();
        for (agent_id, by_proposal) in &self.conviction {
            for (proposal_id, entry) in by_proposal {
                if entry.accumulated_cp > 0 {
                    pairs.push((agent_id.as_str(), *proposal_id, entry));
                }
            }
        }
        pairs
    }

    /// Accumulated conviction per agent per proposal, for agent signals.
    pub fn conviction_view(&self) -> BTreeMap<String, BTreeMap<u64, i64>> {
        let mut view = BTreeMap::new();
        for (agent_id, by_proposal) in &self.conviction {
            let active: BTreeMap<u64, i64> = by_proposal
                .iter()
                .filter(|(_, e)| e.accumulated_cp > 0)
                .map(|(pid, e)| (*pid, e.accumulated_cp))
                .collect();
            if !active.is_empty() {
                view.insert(agent_id.clone(), active);
            }
        }
        view
    }

    /// Register a stake round for an (agent, proposal) pair.
    ///
    /// Switching support away from a previously held proposal zeroes that
    /// proposal's streak (the switching penalty) without clearing its
    /// accumulated CP. The streak on the staked proposal advances at most
    /// once per stake round, so a voluntary stake and the per-round
    /// auto-build never double-count a round. Accumulated CP grows by
    /// `stake_amount` unconditionally.
    #[allow(clippy::too_many_arguments)]
    pub fn update_conviction(
        &mut self,
        agent_id: &str,
        proposal_id: u64,
        stake_amount: i64,
        params: &ConvictionParams,
        round: usize,
        tick: usize,
        issue_id: &str,
        sink: &mut dyn EventSink,
    ) -> ConvictionUpdate {
        let current = self
            .current_support(agent_id)
            .filter(|pid| *pid != proposal_id);

        if let Some(previous) = current {
            let prev_entry = self.entry_mut(agent_id, previous);
            prev_entry.consecutive_rounds = 0;
            prev_entry.last_counted_round = None;
            let rounds_held = prev_entry.total_rounds_held;
            sink.emit(
                LogEntry::new(
                    EventType::ConvictionSwitched,
                    format!(
                        "Agent {} switched conviction from #{} to #{}",
                        agent_id, previous, proposal_id
                    ),
                )
                .tick(tick)
                .agent(agent_id)
                .payload(json!({
                    "from_proposal_id": previous,
                    "to_proposal_id": proposal_id,
                    "stake_amount": stake_amount,
                    "issue_id": issue_id,
                    "previous_rounds_held": rounds_held,
                })),
            );
        }

        let entry = self.entry_mut(agent_id, proposal_id);
        entry.accumulated_cp += stake_amount;
        if entry.last_counted_round != Some(round) {
            entry.consecutive_rounds += 1;
            entry.total_rounds_held += 1;
            entry.last_counted_round = Some(round);
        }

        let consecutive_rounds = entry.consecutive_rounds;
        let total_conviction = entry.accumulated_cp;
        let rounds_held = entry.total_rounds_held;
        let multiplier = params.multiplier(consecutive_rounds);
        let effective_weight = round_to(stake_amount as f64 * multiplier, 2);

        sink.emit(
            LogEntry::new(
                EventType::ConvictionUpdated,
                format!(
                    "Conviction updated: {} -> #{}: {} CP x {} = {} effective weight",
                    agent_id, proposal_id, stake_amount, multiplier, effective_weight
                ),
            )
            .tick(tick)
            .agent(agent_id)
            .payload(json!({
                "proposal_id": proposal_id,
                "raw_stake": stake_amount,
                "multiplier": multiplier,
                "effective_weight": effective_weight,
                "total_conviction": total_conviction,
                "consecutive_rounds": consecutive_rounds,
                "rounds_held": rounds_held,
                "round_number": round,
                "issue_id": issue_id,
            })),
        );

        ConvictionUpdate {
            raw_stake: stake_amount,
            multiplier,
            effective_weight,
            total_conviction,
            consecutive_rounds,
            switched_from: current,
        }
    }

    /// Advance every live streak by one round without adding CP.
    ///
    /// Called once per stake round after the first, so positions held
    /// without fresh stakes keep building conviction. Pairs whose streak
    /// already advanced this round are left untouched. Returns the number
    /// of pairs advanced.
    pub fn auto_build_conviction(
        &mut self,
        params: &ConvictionParams,
        round: usize,
        tick: usize,
        issue_id: &str,
        sink: &mut dyn EventSink,
    ) -> usize {
        let held: Vec<(String, u64)> = self
            .conviction
            .iter()
            .flat_map(|(agent_id, by_proposal)| {
                by_proposal
                    .iter()
                    .filter(|(_, e)| {
                        e.consecutive_rounds > 0 && e.last_counted_round != Some(round)
                    })
                    .map(move |(pid, _)| (agent_id.clone(), *pid))
            })
            .collect();

        let built = held.len();
        for (agent_id, proposal_id) in held {
            self.update_conviction(
                &agent_id,
                proposal_id,
                0,
                params,
                round,
                tick,
                issue_id,
                sink,
            );
        }
        built
    }

    /// Move accumulated conviction from one proposal to another.
    ///
    /// Both proposals' streaks reset: the source pays the switching
    /// penalty and the target starts fresh on its next stake. Returns
    /// false (without mutating) if the source conviction is insufficient.
    #[allow(clippy::too_many_arguments)]
    pub fn switch_conviction(
        &mut self,
        agent_id: &str,
        source_proposal_id: u64,
        target_proposal_id: u64,
        cp_amount: i64,
        tick: usize,
        issue_id: &str,
        reason: &str,
        sink: &mut dyn EventSink,
    ) -> bool {
        if !self.has_sufficient_conviction(agent_id, source_proposal_id, cp_amount) {
            return false;
        }

        let source = self.entry_mut(agent_id, source_proposal_id);
        source.accumulated_cp -= cp_amount;
        source.consecutive_rounds = 0;
        source.last_counted_round = None;

        let target = self.entry_mut(agent_id, target_proposal_id);
        target.accumulated_cp += cp_amount;
        target.consecutive_rounds = 0;
        target.last_counted_round = None;

        self.first_stake_tick
            .entry(target_proposal_id)
            .or_insert(tick);

        sink.emit(
            LogEntry::new(
                EventType::ConvictionSwitched,
                format!(
                    "Switch: {} moved {} CP from #{} to #{} ({})",
                    agent_id, cp_amount, source_proposal_id, target_proposal_id, reason
                ),
            )
            .tick(tick)
            .agent(agent_id)
            .payload(json!({
                "source_proposal_id": source_proposal_id,
                "target_proposal_id": target_proposal_id,
                "cp_amount": cp_amount,
                "reason": reason,
                "issue_id": issue_id,
            })),
        );
        true
    }

    /// Withdraw accumulated conviction back to the agent's balance.
    ///
    /// Requires sufficient accumulated CP on the proposal; resets the
    /// proposal's streak. Returns false (without mutating) otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn unstake_from_proposal(
        &mut self,
        agent_id: &str,
        proposal_id: u64,
        cp_amount: i64,
        tick: usize,
        issue_id: &str,
        reason: &str,
        sink: &mut dyn EventSink,
    ) -> bool {
        if !self.has_sufficient_conviction(agent_id, proposal_id, cp_amount) {
            return false;
        }

        let entry = self.entry_mut(agent_id, proposal_id);
        entry.accumulated_cp -= cp_amount;
        entry.consecutive_rounds = 0;
        entry.last_counted_round = None;

        let staked = self.staked.entry(agent_id.to_string()).or_insert(0);
        *staked = (*staked - cp_amount).max(0);

        self.credit(agent_id, cp_amount, reason, tick, issue_id, sink);
        true
    }

    // ========================================================================
    // Credit events
    // ========================================================================

    /// All credit events, in append order.
    pub fn events(&self) -> &[CreditEvent] {
        &self.events
    }

    /// Append an informational credit event (revision lineage,
    /// finalization, influence).
    pub fn record_event(&mut self, event: CreditEvent) {
        self.events.push(event);
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn entry(&self, agent_id: &str, proposal_id: u64) -> Option<&ConvictionEntry> {
        self.conviction
            .get(agent_id)
            .and_then(|by_proposal| by_proposal.get(&proposal_id))
    }

    fn entry_mut(&mut self, agent_id: &str, proposal_id: u64) -> &mut ConvictionEntry {
        self.conviction
            .entry(agent_id.to_string())
            .or_default()
            .entry(proposal_id)
            .or_default()
    }
}
