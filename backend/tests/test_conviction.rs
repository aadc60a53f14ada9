//! Conviction accumulation, switching and unstaking through full runs.

mod common;

use common::{engine_with, test_config, ScriptedAgent, Step};
use roundtable_consensus_core_rs::models::{Action, Signal};
use roundtable_consensus_core_rs::sink::EventType;
use roundtable_consensus_core_rs::CreditEvent;

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
// S2: five consecutive stake rounds reach the target multiplier
// ============================================================================

#[test]
fn test_consecutive_staking_reaches_target_multiplier() {
    // A authors proposal 1; B stakes 10 CP on it in each of the five
    // final stake rounds (2..=6 of a 6-round schedule).
    let backer_id = "Agent_B".to_string();
    let backer = ScriptedAgent::new("Agent_B", move |signal| match signal {
        Signal::Stake {
            tick,
            issue_id,
            round_number,
            ..
        } if *round_number >= 2 => Step::Act(vec![Action::Stake {
            agent_id: backer_id.clone(),
            proposal_id: Some(1),
            stake_amount: 10,
            round_number: *round_number,
            issue_id: issue_id.clone(),
            tick: *tick,
            choice_reason: "conviction_build".to_string(),
        }]),
        _ => Step::Ready,
    });

    let config = test_config();
    let params = config.conviction_params.clone();
    let mut engine = engine_with(
        config,
        "Issue_S2",
        vec![
            proposer("Agent_A", "Fund the pilot. Staff it. Review it."),
            backer,
        ],
        &[("Agent_A", 0), ("Agent_B", 0)],
    );
    let summary = engine.run().expect("run completes");

    // Five consecutive rounds on proposal 1.
    assert_eq!(engine.ledger().consecutive_rounds("Agent_B", 1), 5);
    assert_eq!(engine.ledger().conviction_on("Agent_B", 1), 50);
    assert_eq!(params.multiplier(5), 1.98);

    // B switched away from the NoAction default it was staked to.
    assert_eq!(engine.ledger().consecutive_rounds("Agent_B", 0), 0);
    assert_eq!(engine.ledger().conviction_on("Agent_B", 0), 50);

    // Proposal 1 wins; B's influence is 50 x 1.98 = 99.0.
    assert_eq!(summary.winner_proposal_id, Some(1));
    let influence: Vec<&CreditEvent> = engine
        .ledger()
        .events()
        .iter()
        .filter(|e| matches!(e, CreditEvent::Influence { .. }))
        .collect();
    let b_influence = influence
        .iter()
        .find_map(|e| match e {
            CreditEvent::Influence {
                agent_id,
                contribution,
                raw_stake,
                multiplier,
                ..
            } if agent_id == "Agent_B" => Some((*contribution, *raw_stake, *multiplier)),
            _ => None,
        })
        .expect("B contributed to the winner");
    assert_eq!(b_influence, (99.0, 50, 1.98));

    // A's initial self-stake held for all six rounds.
    assert_eq!(engine.ledger().consecutive_rounds("Agent_A", 1), 6);
    let a_influence = influence
        .iter()
        .find_map(|e| match e {
            CreditEvent::Influence {
                agent_id,
                contribution,
                multiplier,
                ..
            } if agent_id == "Agent_A" => Some((*contribution, *multiplier)),
            _ => None,
        })
        .expect("A contributed to the winner");
    assert_eq!(a_influence.1, 1.991);
    assert_eq!(a_influence.0, 99.55);
}

// ============================================================================
// Switching
// ============================================================================

#[test]
fn test_switch_moves_conviction_and_resets_streaks() {
    // A stakes 10 on its own proposal in rounds 1-3, then moves 20 CP to
    // the NoAction proposal in round 4.
    let agent_id = "Agent_A".to_string();
    let switcher = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: "Own plan. Some detail. A close.".to_string(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Stake {
            tick,
            issue_id,
            round_number,
            ..
        } => match round_number {
            1..=3 => Step::Act(vec![Action::Stake {
                agent_id: agent_id.clone(),
                proposal_id: Some(1),
                stake_amount: 10,
                round_number: *round_number,
                issue_id: issue_id.clone(),
                tick: *tick,
                choice_reason: "own_proposal".to_string(),
            }]),
            4 => Step::Act(vec![Action::SwitchStake {
                agent_id: agent_id.clone(),
                source_proposal_id: Some(1),
                target_proposal_id: Some(0),
                cp_amount: 20,
                issue_id: issue_id.clone(),
                tick: *tick,
                reason: "hedging".to_string(),
            }]),
            _ => Step::Ready,
        },
        _ => Step::Ready,
    });

    let mut engine = engine_with(test_config(), "Issue_switch", vec![switcher], &[("Agent_A", 0)]);
    engine.run().expect("run completes");

    // 50 initial + 30 staked - 20 switched away.
    assert_eq!(engine.ledger().conviction_on("Agent_A", 1), 60);
    assert_eq!(engine.ledger().conviction_on("Agent_A", 0), 20);

    // Both streaks reset by the switch and never rebuilt (no later
    // stake, and auto-build only extends live streaks).
    assert_eq!(engine.ledger().consecutive_rounds("Agent_A", 1), 0);
    assert_eq!(engine.ledger().consecutive_rounds("Agent_A", 0), 0);

    let recorded = engine.sink().entries_of_type(EventType::SwitchRecorded);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].payload["cp_amount"].as_i64(), Some(20));
}

#[test]
fn test_switch_to_same_proposal_is_rejected() {
    let agent_id = "Agent_A".to_string();
    let confused = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: "Own plan. Some detail. A close.".to_string(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Stake {
            tick,
            issue_id,
            round_number: 2,
            ..
        } => Step::Act(vec![
            Action::SwitchStake {
                agent_id: agent_id.clone(),
                source_proposal_id: Some(1),
                target_proposal_id: Some(1),
                cp_amount: 10,
                issue_id: issue_id.clone(),
                tick: *tick,
                reason: "confused".to_string(),
            },
            Action::SignalReady {
                agent_id: agent_id.clone(),
            },
        ]),
        _ => Step::Ready,
    });

    let mut engine = engine_with(test_config(), "Issue_same", vec![confused], &[("Agent_A", 0)]);
    engine.run().expect("run completes");

    let rejected = engine.sink().entries_of_type(EventType::SwitchRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].payload["reason"].as_str(), Some("same_proposal"));
    assert_eq!(engine.ledger().conviction_on("Agent_A", 1), 50);
}

// ============================================================================
// Unstaking
// ============================================================================

#[test]
fn test_unstake_returns_cp_and_resets_streak() {
    let agent_id = "Agent_A".to_string();
    let hedger = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: "Own plan. Some detail. A close.".to_string(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Stake {
            tick,
            issue_id,
            round_number,
            ..
        } => match round_number {
            1 => Step::Act(vec![Action::Stake {
                agent_id: agent_id.clone(),
                proposal_id: Some(1),
                stake_amount: 20,
                round_number: 1,
                issue_id: issue_id.clone(),
                tick: *tick,
                choice_reason: "own_proposal".to_string(),
            }]),
            2 => Step::Act(vec![Action::Unstake {
                agent_id: agent_id.clone(),
                proposal_id: Some(1),
                cp_amount: 15,
                issue_id: issue_id.clone(),
                tick: *tick,
                reason: "liquidity".to_string(),
            }]),
            3 => Step::Act(vec![
                Action::Unstake {
                    agent_id: agent_id.clone(),
                    proposal_id: Some(1),
                    cp_amount: 500,
                    issue_id: issue_id.clone(),
                    tick: *tick,
                    reason: "greedy".to_string(),
                },
                Action::SignalReady {
                    agent_id: agent_id.clone(),
                },
            ]),
            _ => Step::Ready,
        },
        _ => Step::Ready,
    });

    let mut engine = engine_with(test_config(), "Issue_unstake", vec![hedger], &[("Agent_A", 0)]);
    engine.run().expect("run completes");

    // 100 award - 50 initial - 20 stake + 15 unstaked.
    assert_eq!(engine.ledger().balance("Agent_A"), 45);
    assert_eq!(engine.ledger().staked_of("Agent_A"), 55);
    assert_eq!(engine.ledger().conviction_on("Agent_A", 1), 55);
    assert_eq!(engine.ledger().consecutive_rounds("Agent_A", 1), 0);

    let recorded = engine.sink().entries_of_type(EventType::UnstakeRecorded);
    assert_eq!(recorded.len(), 1);

    let rejected = engine.sink().entries_of_type(EventType::UnstakeRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].payload["reason"].as_str(), Some("unstake_failed"));
}

// ============================================================================
// Self-stake on an obsolete version
// ============================================================================

#[test]
fn test_stake_on_obsolete_own_version_is_rejected() {
    // A revises in the revise cycle, then tries to self-stake on the
    // superseded version id.
    let agent_id = "Agent_A".to_string();
    let nostalgic = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: "First. Second. Third. Fourth.".to_string(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Revise { tick, issue_id, .. } => Step::Act(vec![Action::Revise {
            agent_id: agent_id.clone(),
            new_content: "First. Second. Third. Other. More. Again.".to_string(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Stake {
            tick,
            issue_id,
            round_number: 1,
            current_proposal_id,
            ..
        } => {
            // The agent's mapping follows the revision to id 2; force the
            // stale id 1 through anyway.
            assert_eq!(*current_proposal_id, Some(2));
            Step::Act(vec![
                Action::Stake {
                    agent_id: agent_id.clone(),
                    proposal_id: Some(1),
                    stake_amount: 10,
                    round_number: 1,
                    issue_id: issue_id.clone(),
                    tick: *tick,
                    choice_reason: "stale".to_string(),
                },
                Action::SignalReady {
                    agent_id: agent_id.clone(),
                },
            ])
        }
        _ => Step::Ready,
    });

    let mut engine = engine_with(
        test_config(),
        "Issue_stale",
        vec![nostalgic],
        &[("Agent_A", 0)],
    );
    engine.run().expect("run completes");

    // The stale stake did not go through; only the transferred initial
    // stake backs the lineage.
    let rejected = engine.sink().entries_of_type(EventType::StakeRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(
        rejected[0].payload["reason"].as_str(),
        Some("not_latest_proposal")
    );
    assert_eq!(engine.ledger().conviction_on("Agent_A", 1), 0);
    assert_eq!(engine.ledger().total_stake_on_proposal(1), 0);
    assert_eq!(engine.ledger().total_stake_on_proposal(2), 50);
}
