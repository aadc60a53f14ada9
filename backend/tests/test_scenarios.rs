//! End-to-end protocol scenarios with scripted agents.

mod common;

use common::{engine_with, test_config, ScriptedAgent, Step};
use roundtable_consensus_core_rs::models::{Action, Signal};
use roundtable_consensus_core_rs::sink::EventType;
use roundtable_consensus_core_rs::GlobalConfig;

// ============================================================================
// Scenario helpers
// ============================================================================

/// Agent that submits one proposal with the given content, then stays
/// passive.
fn proposer(id: &str, content: &str) -> ScriptedAgent {
    let agent_id = id.to_string();
    let content = content.to_string();
    ScriptedAgent::new(id, move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: content.clone(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        _ => Step::Ready,
    })
}

// ============================================================================
// S1: single agent, no action
// ============================================================================

#[test]
fn test_single_inactive_agent_defaults_to_no_action() {
    let mut engine = engine_with(
        test_config(),
        "Issue_S1",
        vec![ScriptedAgent::passive("Agent_A")],
        &[("Agent_A", 0)],
    );

    let summary = engine.run().expect("run completes");

    // The agent was staked to NoAction on the Propose timeout.
    assert_eq!(engine.ledger().balance("Agent_A"), 50);
    assert_eq!(engine.ledger().staked_of("Agent_A"), 50);
    let records = engine.ledger().stake_ledger();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].proposal_id, 0);
    assert_eq!(records[0].cp, 50);

    let issue = engine.state().current_issue.as_ref().unwrap();
    assert_eq!(issue.proposal_for_agent("Agent_A"), Some(0));

    // NoAction wins by default.
    assert_eq!(summary.winner_proposal_id, Some(0));
    assert!(engine.state().issue_finalized);

    // The initial stake entered conviction at the first stake round and
    // auto-built through the remaining five.
    assert_eq!(engine.ledger().conviction_on("Agent_A", 0), 50);
    assert_eq!(engine.ledger().consecutive_rounds("Agent_A", 0), 6);
}

// ============================================================================
// S6: insufficient CP cascade
// ============================================================================

#[test]
fn test_feedback_cascade_stops_at_insufficient_cp() {
    // Balance 15 covers exactly three feedback stakes of 5. The quota is
    // raised so the fourth attempt fails on CP, not on the quota.
    let mut config = test_config();
    config.assignment_award = 10;
    config.max_feedback_per_agent = 5;

    let feedbacker_id = "Agent_F".to_string();
    let feedbacker = ScriptedAgent::new("Agent_F", move |signal| match signal {
        Signal::Feedback {
            tick,
            issue_id,
            all_proposals,
            current_proposal_id,
            ..
        } => {
            let target = all_proposals
                .iter()
                .copied()
                .find(|pid| Some(*pid) != *current_proposal_id)
                .expect("another proposal exists");
            let actions = (0..4)
                .map(|i| Action::Feedback {
                    agent_id: feedbacker_id.clone(),
                    target_proposal_id: target,
                    comment: format!("Concern number {}.", i + 1),
                    issue_id: issue_id.clone(),
                    tick: *tick,
                })
                .collect();
            Step::Act(actions)
        }
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        config,
        "Issue_S6",
        vec![feedbacker, proposer("Agent_G", "Adopt the plan. Fund it. Review it.")],
        &[("Agent_F", 5), ("Agent_G", 40)],
    );
    engine.run().expect("run completes");

    // Three accepted, fourth rejected for CP with no burn.
    let issue = engine.state().current_issue.as_ref().unwrap();
    assert_eq!(issue.count_feedbacks_by("Agent_F"), 3);
    assert_eq!(engine.ledger().balance("Agent_F"), 0);

    let rejections = engine.sink().entries_of_type(EventType::FeedbackRejected);
    assert_eq!(rejections.len(), 1);
    assert_eq!(
        rejections[0].payload["reason"].as_str(),
        Some("insufficient_cp_for_stake")
    );

    // No burn accompanied the rejection: exactly three feedback burns.
    let feedback_burns = engine
        .ledger()
        .events()
        .iter()
        .filter(|e| {
            matches!(
                e,
                roundtable_consensus_core_rs::CreditEvent::Burn { reason, .. }
                    if reason == "Feedback Stake"
            )
        })
        .count();
    assert_eq!(feedback_burns, 3);
}

// ============================================================================
// Submission validation
// ============================================================================

#[test]
fn test_duplicate_submission_is_rejected() {
    let agent_id = "Agent_A".to_string();
    let double_proposer = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => {
            let submit = |content: &str| Action::SubmitProposal {
                agent_id: agent_id.clone(),
                content: content.to_string(),
                issue_id: issue_id.clone(),
                tick: *tick,
            };
            Step::Act(vec![
                submit("First idea. With detail. And a close."),
                submit("Second idea. With detail. And a close."),
            ])
        }
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        test_config(),
        "Issue_dup",
        vec![double_proposer],
        &[("Agent_A", 100)],
    );
    engine.run().expect("run completes");

    let rejected = engine.sink().entries_of_type(EventType::ProposalRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(
        rejected[0].payload["reason"].as_str(),
        Some("already_submitted")
    );

    // Only one standard proposal exists besides NoAction.
    let issue = engine.state().current_issue.as_ref().unwrap();
    assert_eq!(issue.proposals.len(), 2);
}

#[test]
fn test_unassigned_agent_is_rejected() {
    let smuggler = ScriptedAgent::new("Agent_A", |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![
            Action::SubmitProposal {
                agent_id: "Agent_Z".to_string(),
                content: "Not my table. Still trying. Anyway.".to_string(),
                issue_id: issue_id.clone(),
                tick: *tick,
            },
            Action::SignalReady {
                agent_id: "Agent_A".to_string(),
            },
        ]),
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        test_config(),
        "Issue_unassigned",
        vec![smuggler],
        &[("Agent_A", 100)],
    );
    engine.run().expect("run completes");

    let rejected = engine.sink().entries_of_type(EventType::ProposalRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].payload["reason"].as_str(), Some("not_assigned"));
    assert_eq!(rejected[0].agent_id.as_deref(), Some("Agent_Z"));
}

#[test]
fn test_wrong_issue_is_rejected() {
    let agent_id = "Agent_A".to_string();
    let confused = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, .. } => Step::Act(vec![
            Action::SubmitProposal {
                agent_id: agent_id.clone(),
                content: "A plan. For the wrong table. Entirely.".to_string(),
                issue_id: "Issue_other".to_string(),
                tick: *tick,
            },
            Action::SignalReady {
                agent_id: agent_id.clone(),
            },
        ]),
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        test_config(),
        "Issue_right",
        vec![confused],
        &[("Agent_A", 100)],
    );
    engine.run().expect("run completes");

    let rejected = engine.sink().entries_of_type(EventType::ProposalRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].payload["reason"].as_str(), Some("wrong_issue"));
}

// ============================================================================
// Self-feedback guard
// ============================================================================

#[test]
fn test_self_feedback_is_rejected() {
    let agent_id = "Agent_A".to_string();
    let self_critic = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: "My plan. My detail. My close.".to_string(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Feedback {
            tick,
            issue_id,
            current_proposal_id,
            ..
        } => Step::Act(vec![
            Action::Feedback {
                agent_id: agent_id.clone(),
                target_proposal_id: current_proposal_id.expect("agent has a proposal"),
                comment: "Excellent work, me.".to_string(),
                issue_id: issue_id.clone(),
                tick: *tick,
            },
            Action::SignalReady {
                agent_id: agent_id.clone(),
            },
        ]),
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        test_config(),
        "Issue_selffb",
        vec![self_critic],
        &[("Agent_A", 100)],
    );
    engine.run().expect("run completes");

    let rejected = engine.sink().entries_of_type(EventType::FeedbackRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].payload["reason"].as_str(), Some("self_feedback"));

    let issue = engine.state().current_issue.as_ref().unwrap();
    assert!(issue.feedback_log.is_empty());
}

// ============================================================================
// Feedback quota
// ============================================================================

#[test]
fn test_feedback_quota_is_enforced() {
    let config = test_config();
    assert_eq!(config.max_feedback_per_agent, 3);

    let agent_id = "Agent_F".to_string();
    let chatty = ScriptedAgent::new("Agent_F", move |signal| match signal {
        Signal::Feedback {
            tick,
            issue_id,
            all_proposals,
            current_proposal_id,
            ..
        } => {
            let target = all_proposals
                .iter()
                .copied()
                .find(|pid| Some(*pid) != *current_proposal_id)
                .expect("another proposal exists");
            let actions = (0..5)
                .map(|i| Action::Feedback {
                    agent_id: agent_id.clone(),
                    target_proposal_id: target,
                    comment: format!("Point {}.", i),
                    issue_id: issue_id.clone(),
                    tick: *tick,
                })
                .collect();
            Step::Act(actions)
        }
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        config,
        "Issue_quota",
        vec![chatty, proposer("Agent_G", "One. Two. Three.")],
        &[("Agent_F", 100), ("Agent_G", 0)],
    );
    engine.run().expect("run completes");

    let issue = engine.state().current_issue.as_ref().unwrap();
    assert_eq!(issue.count_feedbacks_by("Agent_F"), 3);

    let rejections = engine.sink().entries_of_type(EventType::FeedbackRejected);
    assert_eq!(rejections.len(), 2);
    assert!(rejections
        .iter()
        .all(|r| r.payload["reason"].as_str() == Some("feedback_quota_exceeded")));
}

// ============================================================================
// Comment length cap
// ============================================================================

#[test]
fn test_overlong_comment_is_rejected() {
    let mut config = test_config();
    config.feedback_comment_max_length = 40;

    let agent_id = "Agent_F".to_string();
    let rambler = ScriptedAgent::new("Agent_F", move |signal| match signal {
        Signal::Feedback {
            tick,
            issue_id,
            all_proposals,
            current_proposal_id,
            ..
        } => {
            let target = all_proposals
                .iter()
                .copied()
                .find(|pid| Some(*pid) != *current_proposal_id)
                .expect("another proposal exists");
            Step::Act(vec![
                Action::Feedback {
                    agent_id: agent_id.clone(),
                    target_proposal_id: target,
                    comment: "x".repeat(200),
                    issue_id: issue_id.clone(),
                    tick: *tick,
                },
                Action::SignalReady {
                    agent_id: agent_id.clone(),
                },
            ])
        }
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        config,
        "Issue_comment",
        vec![rambler, proposer("Agent_G", "One. Two. Three.")],
        &[("Agent_F", 100), ("Agent_G", 0)],
    );
    engine.run().expect("run completes");

    let rejections = engine.sink().entries_of_type(EventType::FeedbackRejected);
    assert_eq!(rejections.len(), 1);
    assert_eq!(
        rejections[0].payload["reason"].as_str(),
        Some("comment_too_long")
    );

    // Rejected before any deduction: opening 100 + award 100, minus only
    // the NoAction default stake.
    assert_eq!(engine.ledger().balance("Agent_F"), 150);
}

// ============================================================================
// Config validation at construction
// ============================================================================

#[test]
fn test_invalid_config_is_rejected_at_construction() {
    use roundtable_consensus_core_rs::models::SignalHandler;
    use roundtable_consensus_core_rs::sink::MemorySink;
    use roundtable_consensus_core_rs::{EngineError, Issue, Roundtable, RunConfig};

    let mut config = GlobalConfig::standard(1, 5);
    config.staking_rounds = 99;

    let run = RunConfig::new(1, "I1", &[("Agent_A", 0)]);
    let issue = Issue::new("I1", "p", "b");
    let agents: Vec<Box<dyn SignalHandler>> =
        vec![Box::new(ScriptedAgent::passive("Agent_A"))];

    let result = Roundtable::new(config, run, issue, agents, MemorySink::new());
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}
