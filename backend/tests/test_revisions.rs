//! Revision pricing, versioning and stake transfer.

mod common;

use common::{engine_with, test_config, ScriptedAgent, Step};
use roundtable_consensus_core_rs::models::{Action, Signal};
use roundtable_consensus_core_rs::sink::EventType;
use roundtable_consensus_core_rs::CreditEvent;

const OLD_CONTENT: &str = "Keep the hall. Hire two staff. Cap the budget. Review in May.";
// Shares three of four old sentences, adds three new: 3 matches of 10
// sentences total, ratio 0.6, delta 0.4.
const NEW_CONTENT: &str =
    "Keep the hall. Hire two staff. Cap the budget. Add a reserve. Name an owner. Report monthly.";

fn revising_author(id: &str, old: &str, new: &str) -> ScriptedAgent {
    let agent_id = id.to_string();
    let old = old.to_string();
    let new = new.to_string();
    ScriptedAgent::new(id, move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: old.clone(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Revise { tick, issue_id, .. } => Step::Act(vec![Action::Revise {
            agent_id: agent_id.clone(),
            new_content: new.clone(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        _ => Step::Ready,
    })
}

// ============================================================================
// S3: a delta-0.4 revision burns floor(50 * 0.4) = 20 CP
// ============================================================================

#[test]
fn test_revision_creates_new_version_and_transfers_stakes() {
    let mut engine = engine_with(
        test_config(),
        "Issue_S3",
        vec![revising_author("Agent_A", OLD_CONTENT, NEW_CONTENT)],
        &[("Agent_A", 0)],
    );
    let summary = engine.run().expect("run completes");

    // 100 award - 50 self-stake - 20 revision cost.
    assert_eq!(engine.ledger().balance("Agent_A"), 30);

    let issue = engine.state().current_issue.as_ref().unwrap();
    let old = issue.proposal(1).expect("original version exists");
    let new = issue.proposal(2).expect("revision exists");

    assert!(!old.active);
    assert!(new.active);
    assert_eq!(new.parent_id, Some(1));
    assert_eq!(new.revision_number, 2);
    assert_eq!(new.author, "Agent_A");
    assert_eq!(issue.proposal_for_agent("Agent_A"), Some(2));

    // All stake follows the lineage; nothing references the old id.
    assert_eq!(engine.ledger().total_stake_on_proposal(1), 0);
    assert_eq!(engine.ledger().total_stake_on_proposal(2), 50);

    // The lineage record carries delta and cost.
    let revision = engine
        .ledger()
        .events()
        .iter()
        .find_map(|e| match e {
            CreditEvent::Revision {
                cost,
                delta,
                parent_id,
                new_proposal_id,
                revision_number,
                ..
            } => Some((*cost, *delta, *parent_id, *new_proposal_id, *revision_number)),
            _ => None,
        })
        .expect("revision event recorded");
    assert_eq!(revision, (20, 0.4, 1, 2, 2));

    // The revised lineage carries the conviction and wins.
    assert_eq!(summary.winner_proposal_id, Some(2));
}

// ============================================================================
// Delta bounds
// ============================================================================

#[test]
fn test_identical_revision_is_rejected_for_delta() {
    let agent_id = "Agent_A".to_string();
    let stubborn = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Propose { tick, issue_id, .. } => Step::Act(vec![Action::SubmitProposal {
            agent_id: agent_id.clone(),
            content: OLD_CONTENT.to_string(),
            issue_id: issue_id.clone(),
            tick: *tick,
        }]),
        Signal::Revise { tick, issue_id, .. } => Step::Act(vec![
            Action::Revise {
                agent_id: agent_id.clone(),
                new_content: OLD_CONTENT.to_string(),
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
        "Issue_nochange",
        vec![stubborn],
        &[("Agent_A", 0)],
    );
    engine.run().expect("run completes");

    let rejected = engine.sink().entries_of_type(EventType::RevisionRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(
        rejected[0].payload["reason"].as_str(),
        Some("invalid_calculated_delta")
    );

    // Nothing changed: one version, still active, no burn beyond the
    // self-stake.
    let issue = engine.state().current_issue.as_ref().unwrap();
    assert_eq!(issue.proposals.len(), 2); // NoAction + the proposal
    assert!(issue.proposal(1).unwrap().active);
    assert_eq!(engine.ledger().balance("Agent_A"), 50);
}

#[test]
fn test_revision_without_proposal_is_rejected() {
    let agent_id = "Agent_A".to_string();
    let impostor = ScriptedAgent::new("Agent_A", move |signal| match signal {
        Signal::Revise { tick, issue_id, .. } => Step::Act(vec![
            Action::Revise {
                agent_id: agent_id.clone(),
                new_content: "Something new. Entirely. Unrooted.".to_string(),
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
        "Issue_norev",
        vec![impostor],
        &[("Agent_A", 0)],
    );
    engine.run().expect("run completes");

    let rejected = engine.sink().entries_of_type(EventType::RevisionRejected);
    assert_eq!(rejected.len(), 1);
    // The agent is backed by NoAction (id 0), which it does not author.
    assert_eq!(
        rejected[0].payload["reason"].as_str(),
        Some("not_proposal_author")
    );
}

// ============================================================================
// Monotonic ids and lineage invariants
// ============================================================================

#[test]
fn test_ids_are_monotonic_and_one_version_active_per_lineage() {
    let mut engine = engine_with(
        test_config(),
        "Issue_lineage",
        vec![
            revising_author("Agent_A", OLD_CONTENT, NEW_CONTENT),
            revising_author(
                "Agent_B",
                "Trim scope. Ship early. Iterate.",
                "Trim scope. Ship early. Collect data. Iterate twice.",
            ),
        ],
        &[("Agent_A", 0), ("Agent_B", 0)],
    );
    engine.run().expect("run completes");

    let issue = engine.state().current_issue.as_ref().unwrap();

    // Creation order equals id order (NoAction 0 first).
    let ids: Vec<u64> = issue.proposals.iter().map(|p| p.proposal_id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    // Exactly one active version per authored lineage.
    for author in ["Agent_A", "Agent_B"] {
        let active: Vec<_> = issue
            .proposals
            .iter()
            .filter(|p| p.author == author && p.active)
            .collect();
        assert_eq!(active.len(), 1, "author {} has one active version", author);
        assert_eq!(active[0].revision_number, 2);
    }
}
