//! Action validation and application
//!
//! The controller drains the action queue once per tick, before the phase
//! logic runs, and applies each action against the issue store and the
//! credit ledger. Every rejection emits a typed `*_REJECTED` event with a
//! structured reason code and drops the action; no handler mutates state
//! before its preconditions have all passed.

use crate::config::GlobalConfig;
use crate::ledger::{CreditEvent, CreditLedger};
use crate::models::action::Action;
use crate::models::proposal::Proposal;
use crate::models::stake::StakeKind;
use crate::models::state::RoundtableState;
use crate::sink::{EventSink, EventType, LogEntry, LogLevel};
use crate::text::sentence_sequence_delta;
use serde_json::{json, Value};

/// Mark an agent ready and record the event.
///
/// Marking an already-ready agent again is a no-op on state; the event is
/// still recorded so the stream shows who signaled when.
pub(crate) fn signal_ready(
    state: &mut RoundtableState,
    sink: &mut dyn EventSink,
    agent_id: &str,
    payload: Value,
) {
    sink.emit(
        LogEntry::new(
            EventType::AgentReady,
            format!("Agent {} marked as ready", agent_id),
        )
        .tick(state.tick)
        .phase(state.current_phase)
        .agent(agent_id)
        .payload(payload),
    );
    state.mark_ready(agent_id);
}

/// Per-tick action processor borrowing the engine internals.
pub(crate) struct Controller<'a> {
    pub global: &'a GlobalConfig,
    pub state: &'a mut RoundtableState,
    pub ledger: &'a mut CreditLedger,
    pub sink: &'a mut dyn EventSink,
}

impl<'a> Controller<'a> {
    /// Process a drained batch of actions in FIFO order.
    pub fn process(&mut self, actions: Vec<Action>) {
        for action in actions {
            // Readiness signals need no issue validation.
            if let Action::SignalReady { agent_id } = &action {
                signal_ready(
                    self.state,
                    self.sink,
                    agent_id,
                    json!({ "reason": "active_ready_signal" }),
                );
                continue;
            }

            if !self.validate_common(&action) {
                continue;
            }

            match action {
                Action::SubmitProposal {
                    agent_id, content, ..
                } => self.receive_proposal(&agent_id, content),
                Action::Feedback {
                    agent_id,
                    target_proposal_id,
                    comment,
                    ..
                } => self.receive_feedback(&agent_id, target_proposal_id, &comment),
                Action::Revise {
                    agent_id,
                    new_content,
                    ..
                } => self.receive_revision(&agent_id, new_content),
                Action::Stake {
                    agent_id,
                    proposal_id,
                    stake_amount,
                    round_number,
                    choice_reason,
                    ..
                } => self.receive_stake(
                    &agent_id,
                    proposal_id,
                    stake_amount,
                    round_number,
                    &choice_reason,
                ),
                Action::SwitchStake {
                    agent_id,
                    source_proposal_id,
                    target_proposal_id,
                    cp_amount,
                    reason,
                    ..
                } => self.receive_switch(
                    &agent_id,
                    source_proposal_id,
                    target_proposal_id,
                    cp_amount,
                    &reason,
                ),
                Action::Unstake {
                    agent_id,
                    proposal_id,
                    cp_amount,
                    reason,
                    ..
                } => self.receive_unstake(&agent_id, proposal_id, cp_amount, &reason),
                Action::SignalReady { .. } => unreachable!("handled above"),
            }
        }
    }

    /// Validation common to every action except `signal_ready`: an active
    /// issue exists, the payload issue id matches it, and the acting
    /// agent is assigned to it.
    fn validate_common(&mut self, action: &Action) -> bool {
        let agent_id = action.agent_id().to_string();
        let action_type = action.action_type();

        let Some(issue) = self.state.current_issue.as_ref() else {
            self.reject(action_type, &agent_id, "no_active_issue", Value::Null);
            return false;
        };
        let expected = issue.issue_id.clone();
        let assigned = issue.is_assigned(&agent_id);

        if let Some(issue_id) = action.issue_id() {
            if issue_id != expected {
                let received = issue_id.to_string();
                self.reject(
                    action_type,
                    &agent_id,
                    "wrong_issue",
                    json!({
                        "received_issue_id": received,
                        "expected_issue_id": expected,
                    }),
                );
                return false;
            }
        }

        if !assigned {
            self.reject(
                action_type,
                &agent_id,
                "not_assigned",
                json!({ "issue_id": expected }),
            );
            return false;
        }
        true
    }

    /// Emit the typed rejection event for an action.
    fn reject(&mut self, action_type: &str, agent_id: &str, reason: &str, extra: Value) {
        let event_type = match action_type {
            "feedback" => EventType::FeedbackRejected,
            "revise" => EventType::RevisionRejected,
            "stake" => EventType::StakeRejected,
            "switch_stake" => EventType::SwitchRejected,
            "unstake" => EventType::UnstakeRejected,
            _ => EventType::ProposalRejected,
        };

        let mut payload = json!({ "reason": reason });
        if let Value::Object(extra) = extra {
            let map = payload.as_object_mut().expect("payload is an object");
            for (k, v) in extra {
                map.insert(k, v);
            }
        }

        self.sink.emit(
            LogEntry::new(
                event_type,
                format!("Rejected {} from {}: {}", action_type, agent_id, reason),
            )
            .tick(self.state.tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(payload)
            .level(LogLevel::Warning),
        );
    }

    // ========================================================================
    // submit_proposal
    // ========================================================================

    fn receive_proposal(&mut self, agent_id: &str, content: String) {
        let tick = self.state.tick;
        let issue_id = self.issue_id();

        self.sink.emit(
            LogEntry::new(
                EventType::ProposalReceived,
                format!("Received proposal from {} for issue {}", agent_id, issue_id),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({ "issue_id": issue_id })),
        );

        if self.state.proposals_this_phase.contains(agent_id) {
            self.reject("submit_proposal", agent_id, "already_submitted", Value::Null);
            return;
        }

        if self.ledger.balance(agent_id) < self.global.proposal_self_stake {
            self.reject(
                "submit_proposal",
                agent_id,
                "insufficient_cp_for_stake",
                Value::Null,
            );
            return;
        }

        let proposal_id = self.state.next_proposal_id();
        let proposal = Proposal::standard(proposal_id, content, agent_id, &issue_id, tick);
        if let Some(issue) = self.state.current_issue.as_mut() {
            issue.add_proposal(proposal);
        }

        self.ledger.stake_to_proposal(
            agent_id,
            proposal_id,
            self.global.proposal_self_stake,
            tick,
            &issue_id,
            StakeKind::Initial,
            self.sink,
        );

        self.state.proposals_this_phase.insert(agent_id.to_string());
        signal_ready(
            self.state,
            self.sink,
            agent_id,
            json!({ "reason": "proposal_accepted" }),
        );

        self.sink.emit(
            LogEntry::new(
                EventType::ProposalAccepted,
                format!(
                    "Proposal accepted from {}: #{} for issue {} at tick {}",
                    agent_id, proposal_id, issue_id, tick
                ),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({
                "proposal_id": proposal_id,
                "issue_id": issue_id,
            })),
        );
    }

    // ========================================================================
    // feedback
    // ========================================================================

    fn receive_feedback(&mut self, agent_id: &str, target_proposal_id: u64, comment: &str) {
        let tick = self.state.tick;
        let issue_id = self.issue_id();

        let own_target = self
            .issue()
            .map(|issue| issue.proposal_for_agent(agent_id) == Some(target_proposal_id))
            .unwrap_or(false);
        if own_target {
            self.reject(
                "feedback",
                agent_id,
                "self_feedback",
                json!({ "target_proposal_id": target_proposal_id }),
            );
            return;
        }

        let given = self
            .issue()
            .map(|issue| issue.count_feedbacks_by(agent_id))
            .unwrap_or(0);
        if given >= self.global.max_feedback_per_agent {
            self.reject(
                "feedback",
                agent_id,
                "feedback_quota_exceeded",
                json!({ "max_feedback_per_agent": self.global.max_feedback_per_agent }),
            );
            return;
        }

        if self.ledger.balance(agent_id) < self.global.feedback_stake {
            self.reject(
                "feedback",
                agent_id,
                "insufficient_cp_for_stake",
                json!({ "target_proposal_id": target_proposal_id }),
            );
            return;
        }

        if comment.len() > self.global.feedback_comment_max_length {
            self.reject(
                "feedback",
                agent_id,
                "comment_too_long",
                json!({
                    "comment_length": comment.len(),
                    "max_length": self.global.feedback_comment_max_length,
                }),
            );
            return;
        }

        if !self.ledger.try_deduct(
            agent_id,
            self.global.feedback_stake,
            "Feedback Stake",
            tick,
            &issue_id,
            self.sink,
        ) {
            self.reject("feedback", agent_id, "insufficient_cp", Value::Null);
            return;
        }

        if let Some(issue) = self.state.current_issue.as_mut() {
            issue.add_feedback(agent_id, target_proposal_id, comment, tick);
        }

        self.sink.emit(
            LogEntry::new(
                EventType::FeedbackAccepted,
                format!("Feedback from {} -> #{}", agent_id, target_proposal_id),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({
                "target_proposal_id": target_proposal_id,
                "issue_id": issue_id,
            })),
        );

        signal_ready(
            self.state,
            self.sink,
            agent_id,
            json!({ "reason": "feedback_accepted" }),
        );
    }

    // ========================================================================
    // revise
    // ========================================================================

    fn receive_revision(&mut self, agent_id: &str, new_content: String) {
        let tick = self.state.tick;
        let issue_id = self.issue_id();

        let proposal_id = self
            .issue()
            .and_then(|issue| issue.proposal_for_agent(agent_id));

        self.sink.emit(
            LogEntry::new(
                EventType::RevisionReceived,
                format!("Received revision from {}: {:?}", agent_id, proposal_id),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({
                "proposal_id": proposal_id,
                "issue_id": issue_id,
            })),
        );

        let Some(proposal_id) = proposal_id else {
            self.reject("revise", agent_id, "no_proposal_to_revise", Value::Null);
            return;
        };

        let Some((old_content, old_author)) = self.issue().and_then(|issue| {
            issue
                .proposal(proposal_id)
                .filter(|p| p.active)
                .map(|p| (p.content.clone(), p.author.clone()))
        }) else {
            self.reject(
                "revise",
                agent_id,
                "active_proposal_not_found",
                json!({ "proposal_id": proposal_id }),
            );
            return;
        };

        if old_author != agent_id {
            self.reject(
                "revise",
                agent_id,
                "not_proposal_author",
                json!({
                    "proposal_id": proposal_id,
                    "actual_author": old_author,
                }),
            );
            return;
        }

        let delta = sentence_sequence_delta(&old_content, &new_content);
        if !(0.1..=1.0).contains(&delta) {
            self.reject(
                "revise",
                agent_id,
                "invalid_calculated_delta",
                json!({ "calculated_delta": delta }),
            );
            return;
        }

        let cost = (self.global.proposal_self_stake as f64 * delta).floor() as i64;
        if !self.ledger.try_deduct(
            agent_id,
            cost,
            &format!("Revision cost (delta={:.3})", delta),
            tick,
            &issue_id,
            self.sink,
        ) {
            self.reject(
                "revise",
                agent_id,
                "insufficient_cp",
                json!({ "cost": cost }),
            );
            return;
        }

        let new_proposal_id = self.state.next_proposal_id();
        let mut revision_number = 0;
        if let Some(issue) = self.state.current_issue.as_mut() {
            let old = issue
                .proposal_mut(proposal_id)
                .expect("active proposal checked above");
            old.active = false;
            let new_proposal = old.revised(new_proposal_id, new_content, tick);
            revision_number = new_proposal.revision_number;
            issue.add_proposal(new_proposal);
        }

        let transferred =
            self.ledger
                .transfer_stake(proposal_id, new_proposal_id, tick, &issue_id, self.sink);
        if !transferred {
            self.sink.emit(
                LogEntry::new(
                    EventType::RevisionWarning,
                    format!(
                        "No stake found to transfer from #{} to #{}",
                        proposal_id, new_proposal_id
                    ),
                )
                .tick(tick)
                .phase(self.state.current_phase)
                .agent(agent_id)
                .payload(json!({
                    "reason": "no_stake_to_transfer",
                    "proposal_id": proposal_id,
                    "new_proposal_id": new_proposal_id,
                }))
                .level(LogLevel::Warning),
            );
        }

        self.ledger.record_event(CreditEvent::Revision {
            tick,
            agent_id: agent_id.to_string(),
            cost,
            delta,
            parent_id: proposal_id,
            new_proposal_id,
            revision_number,
            issue_id: issue_id.clone(),
        });

        signal_ready(
            self.state,
            self.sink,
            agent_id,
            json!({ "reason": "revision_accepted" }),
        );

        self.sink.emit(
            LogEntry::new(
                EventType::RevisionAccepted,
                format!(
                    "Revision accepted from {}: #{} -> #{} (delta={:.3}, cost={} CP, rev{})",
                    agent_id, proposal_id, new_proposal_id, delta, cost, revision_number
                ),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({
                "parent_id": proposal_id,
                "new_proposal_id": new_proposal_id,
                "delta": delta,
                "cost": cost,
                "revision_number": revision_number,
                "issue_id": issue_id,
            })),
        );
    }

    // ========================================================================
    // stake
    // ========================================================================

    fn receive_stake(
        &mut self,
        agent_id: &str,
        proposal_id: Option<u64>,
        stake_amount: i64,
        round_number: usize,
        choice_reason: &str,
    ) {
        let tick = self.state.tick;
        let issue_id = self.issue_id();

        if stake_amount <= 0 {
            self.reject(
                "stake",
                agent_id,
                "invalid_amount",
                json!({ "stake_amount": stake_amount, "proposal_id": proposal_id }),
            );
            return;
        }
        let Some(proposal_id) = proposal_id else {
            self.reject("stake", agent_id, "missing_proposal_id", Value::Null);
            return;
        };

        self.sink.emit(
            LogEntry::new(
                EventType::StakeReceived,
                format!(
                    "Received stake from {}: {} CP -> #{} (Round {})",
                    agent_id, stake_amount, proposal_id, round_number
                ),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({
                "proposal_id": proposal_id,
                "stake_amount": stake_amount,
                "round_number": round_number,
                "choice_reason": choice_reason,
                "issue_id": issue_id,
            })),
        );

        // Self-staking is only valid on the agent's own latest version;
        // staking an obsolete version of one's own proposal is rejected.
        let own_version = self
            .issue()
            .and_then(|issue| issue.proposal(proposal_id))
            .is_some_and(|p| p.author == agent_id);
        let latest_authored = self
            .issue()
            .and_then(|issue| issue.find_active_proposal_by_author(agent_id))
            .map(|p| p.proposal_id);
        if own_version && latest_authored.is_some_and(|l| l != proposal_id) {
            self.reject(
                "stake",
                agent_id,
                "not_latest_proposal",
                json!({
                    "proposal_id": proposal_id,
                    "latest_proposal_id": latest_authored,
                }),
            );
            return;
        }

        let staked = self.ledger.stake_to_proposal(
            agent_id,
            proposal_id,
            stake_amount,
            tick,
            &issue_id,
            StakeKind::Voluntary,
            self.sink,
        );

        if staked {
            self.ledger.update_conviction(
                agent_id,
                proposal_id,
                stake_amount,
                &self.global.conviction_params,
                round_number,
                tick,
                &issue_id,
                self.sink,
            );
        } else {
            self.reject(
                "stake",
                agent_id,
                "insufficient_cp_for_stake",
                json!({
                    "stake_amount": stake_amount,
                    "current_balance": self.ledger.balance(agent_id),
                }),
            );
        }

        // Ready regardless of outcome: the agent has used its move.
        signal_ready(
            self.state,
            self.sink,
            agent_id,
            json!({ "reason": "stake_received" }),
        );
    }

    // ========================================================================
    // switch_stake
    // ========================================================================

    fn receive_switch(
        &mut self,
        agent_id: &str,
        source_proposal_id: Option<u64>,
        target_proposal_id: Option<u64>,
        cp_amount: i64,
        reason: &str,
    ) {
        let tick = self.state.tick;
        let issue_id = self.issue_id();

        self.sink.emit(
            LogEntry::new(
                EventType::SwitchReceived,
                format!(
                    "Received switch from {}: {} CP from {:?} -> {:?} ({})",
                    agent_id, cp_amount, source_proposal_id, target_proposal_id, reason
                ),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({
                "source_proposal_id": source_proposal_id,
                "target_proposal_id": target_proposal_id,
                "cp_amount": cp_amount,
                "issue_id": issue_id,
                "reason": reason,
            })),
        );

        let (Some(source), Some(target)) = (source_proposal_id, target_proposal_id) else {
            self.reject("switch_stake", agent_id, "missing_proposal_ids", Value::Null);
            return;
        };

        if source == target {
            self.reject(
                "switch_stake",
                agent_id,
                "same_proposal",
                json!({ "proposal_id": source }),
            );
            return;
        }

        if cp_amount <= 0 {
            self.reject(
                "switch_stake",
                agent_id,
                "invalid_amount",
                json!({ "cp_amount": cp_amount }),
            );
            return;
        }

        if !self
            .ledger
            .has_sufficient_conviction(agent_id, source, cp_amount)
        {
            self.reject(
                "switch_stake",
                agent_id,
                "insufficient_conviction",
                json!({
                    "source_proposal_id": source,
                    "requested_amount": cp_amount,
                }),
            );
            return;
        }

        let switched = self.ledger.switch_conviction(
            agent_id, source, target, cp_amount, tick, &issue_id, reason, self.sink,
        );

        if switched {
            self.sink.emit(
                LogEntry::new(
                    EventType::SwitchRecorded,
                    format!(
                        "Switch recorded: {} moved {} CP from #{} -> #{} ({})",
                        agent_id, cp_amount, source, target, reason
                    ),
                )
                .tick(tick)
                .phase(self.state.current_phase)
                .agent(agent_id)
                .payload(json!({
                    "source_proposal_id": source,
                    "target_proposal_id": target,
                    "cp_amount": cp_amount,
                    "reason": reason,
                    "issue_id": issue_id,
                })),
            );
        } else {
            self.reject(
                "switch_stake",
                agent_id,
                "switch_failed",
                json!({
                    "source_proposal_id": source,
                    "target_proposal_id": target,
                    "cp_amount": cp_amount,
                }),
            );
        }

        signal_ready(
            self.state,
            self.sink,
            agent_id,
            json!({ "reason": "switch_processed" }),
        );
    }

    // ========================================================================
    // unstake
    // ========================================================================

    fn receive_unstake(
        &mut self,
        agent_id: &str,
        proposal_id: Option<u64>,
        cp_amount: i64,
        reason: &str,
    ) {
        let tick = self.state.tick;
        let issue_id = self.issue_id();

        self.sink.emit(
            LogEntry::new(
                EventType::UnstakeReceived,
                format!(
                    "Received unstake from {}: {} CP from {:?} ({})",
                    agent_id, cp_amount, proposal_id, reason
                ),
            )
            .tick(tick)
            .phase(self.state.current_phase)
            .agent(agent_id)
            .payload(json!({
                "proposal_id": proposal_id,
                "cp_amount": cp_amount,
                "issue_id": issue_id,
                "reason": reason,
            })),
        );

        let Some(proposal_id) = proposal_id else {
            self.reject("unstake", agent_id, "missing_proposal_id", Value::Null);
            return;
        };

        if cp_amount <= 0 {
            self.reject(
                "unstake",
                agent_id,
                "invalid_amount",
                json!({ "cp_amount": cp_amount }),
            );
            return;
        }

        let unstaked = self.ledger.unstake_from_proposal(
            agent_id,
            proposal_id,
            cp_amount,
            tick,
            &issue_id,
            reason,
            self.sink,
        );

        if unstaked {
            self.sink.emit(
                LogEntry::new(
                    EventType::UnstakeRecorded,
                    format!(
                        "Unstake recorded: {} withdrew {} CP from #{} ({})",
                        agent_id, cp_amount, proposal_id, reason
                    ),
                )
                .tick(tick)
                .phase(self.state.current_phase)
                .agent(agent_id)
                .payload(json!({
                    "proposal_id": proposal_id,
                    "cp_amount": cp_amount,
                    "reason": reason,
                    "issue_id": issue_id,
                })),
            );
        } else {
            self.reject(
                "unstake",
                agent_id,
                "unstake_failed",
                json!({
                    "proposal_id": proposal_id,
                    "cp_amount": cp_amount,
                }),
            );
        }

        signal_ready(
            self.state,
            self.sink,
            agent_id,
            json!({ "reason": "unstake_processed" }),
        );
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn issue(&self) -> Option<&crate::models::issue::Issue> {
        self.state.current_issue.as_ref()
    }

    fn issue_id(&self) -> String {
        self.issue()
            .map(|issue| issue.issue_id.clone())
            .unwrap_or_default()
    }
}
