//! Shared test helpers: scripted agents with fully predetermined behavior.

#![allow(dead_code)]

use roundtable_consensus_core_rs::models::{Action, ActionQueue, Signal, SignalHandler};
use roundtable_consensus_core_rs::sink::MemorySink;
use roundtable_consensus_core_rs::{GlobalConfig, Issue, Roundtable, RunConfig};

/// What a scripted agent does with one signal.
pub enum Step {
    /// Enqueue these actions and consider the phase handled
    Act(Vec<Action>),
    /// Enqueue a ready signal and consider the phase handled
    Ready,
    /// Do nothing this tick; the script is asked again next tick
    Defer,
}

type Script = Box<dyn FnMut(&Signal) -> Step>;

/// Agent whose every move is spelled out by the test.
///
/// The script is consulted once per phase (unless it defers), which
/// mirrors how the heuristic agents decide.
pub struct ScriptedAgent {
    id: String,
    script: Script,
    last_key: Option<(u8, usize)>,
}

impl ScriptedAgent {
    pub fn new(id: &str, script: impl FnMut(&Signal) -> Step + 'static) -> Self {
        Self {
            id: id.to_string(),
            script: Box::new(script),
            last_key: None,
        }
    }

    /// Agent that only ever signals readiness.
    pub fn passive(id: &str) -> Self {
        Self::new(id, |_| Step::Ready)
    }

    fn phase_key(signal: &Signal) -> (u8, usize) {
        match signal {
            Signal::Propose { .. } => (0, 0),
            Signal::Feedback { cycle_number, .. } => (1, *cycle_number),
            Signal::Revise { cycle_number, .. } => (2, *cycle_number),
            Signal::Stake { round_number, .. } => (3, *round_number),
            Signal::Finalize { .. } => (4, 0),
        }
    }
}

impl SignalHandler for ScriptedAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn on_signal(&mut self, signal: &Signal, queue: &mut ActionQueue) {
        if matches!(signal, Signal::Finalize { .. }) {
            return;
        }
        let key = Self::phase_key(signal);
        if self.last_key == Some(key) {
            return;
        }
        match (self.script)(signal) {
            Step::Defer => {}
            Step::Ready => {
                self.last_key = Some(key);
                queue.submit(Action::SignalReady {
                    agent_id: self.id.clone(),
                });
            }
            Step::Act(actions) => {
                self.last_key = Some(key);
                for action in actions {
                    queue.submit(action);
                }
            }
        }
    }
}

/// Build an engine over scripted agents with a memory sink.
///
/// Balances are pre-award opening balances; every agent also receives
/// the configured assignment award at tick 0.
pub fn engine_with(
    global: GlobalConfig,
    issue_id: &str,
    agents: Vec<ScriptedAgent>,
    balances: &[(&str, i64)],
) -> Roundtable<MemorySink> {
    let run = RunConfig::new(7, issue_id, balances);
    let issue = Issue::new(issue_id, "test problem", "test background");
    let handlers: Vec<Box<dyn SignalHandler>> = agents
        .into_iter()
        .map(|a| Box::new(a) as Box<dyn SignalHandler>)
        .collect();
    Roundtable::new(global, run, issue, handlers, MemorySink::new())
        .expect("engine construction must succeed")
}

/// Standard test protocol config: 1 revision cycle, 5 staking rounds,
/// the literal stakes from the protocol defaults.
pub fn test_config() -> GlobalConfig {
    GlobalConfig::standard(1, 5)
}
