//! Structured event emission
//!
//! The engine is observable only through an abstract sink: every state
//! change emits one structured `LogEntry`, and every tick ends with a full
//! `StateSnapshot`. Sinks are pure observers with zero influence on
//! protocol behavior, which keeps runs byte-for-byte replayable no matter
//! where the events go.
//!
//! Two in-crate implementations are provided: `MemorySink` (records
//! everything, used by tests and for post-run analysis) and `NullSink`
//! (discards everything). File-backed sinks live with their runners.

use crate::engine::phases::PhaseKind;
use crate::engine::snapshot::StateSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Credit management
    LedgerInit,
    CreditBurn,
    InsufficientCredit,
    CreditAward,
    StakeRecorded,
    StakeTransferred,
    ConvictionSwitched,
    ConvictionUpdated,

    // Simulation lifecycle
    SimulationStart,
    SimulationComplete,
    SimulationError,
    ScenarioStart,
    ScenarioComplete,

    // Consensus engine
    PhaseBegin,
    PhaseFinish,
    PhaseTransition,
    PhaseTimeout,
    ConsensusTick,
    ProposalStakeTransferred,
    StateSnapshot,

    // Finalization
    FinalizationStart,
    FinalizationWarning,
    FinalizationComplete,
    FinalizationDecision,
    InfluenceRecorded,
    IssueFinalized,

    // Proposals
    ProposalReceived,
    ProposalAccepted,
    ProposalRejected,

    // Feedback
    FeedbackAccepted,
    FeedbackRejected,

    // Revisions
    RevisionReceived,
    RevisionAccepted,
    RevisionRejected,
    RevisionWarning,

    // Staking
    StakeReceived,
    StakeRejected,

    // Switching
    SwitchReceived,
    SwitchRecorded,
    SwitchRejected,

    // Unstaking
    UnstakeReceived,
    UnstakeRecorded,
    UnstakeRejected,

    // Agent actions
    AgentReady,
}

/// Severity attached to a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One structured event record.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::sink::{EventType, LogEntry, LogLevel};
/// use serde_json::json;
///
/// let entry = LogEntry::new(EventType::AgentReady, "Agent_0 marked as ready")
///     .tick(4)
///     .agent("Agent_0")
///     .payload(json!({ "reason": "proposal_accepted" }));
///
/// assert_eq!(entry.event_type, EventType::AgentReady);
/// assert_eq!(entry.level, LogLevel::Info);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: Option<usize>,
    pub phase: Option<PhaseKind>,
    pub event_type: EventType,
    pub agent_id: Option<String>,
    pub payload: Value,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    /// Create an entry at INFO level with an empty payload.
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            tick: None,
            phase: None,
            event_type,
            agent_id: None,
            payload: Value::Null,
            message: message.into(),
            level: LogLevel::Info,
        }
    }

    /// Attach the engine tick.
    pub fn tick(mut self, tick: usize) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Attach the current phase.
    pub fn phase(mut self, phase: Option<PhaseKind>) -> Self {
        self.phase = phase;
        self
    }

    /// Attach the acting agent.
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Attach a structured payload.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Override the severity.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Observer interface for engine output.
pub trait EventSink {
    /// Record one structured event.
    fn emit(&mut self, entry: LogEntry);

    /// Record the end-of-tick state snapshot.
    fn save_snapshot(&mut self, snapshot: StateSnapshot);
}

/// Sink that records everything in memory.
///
/// Provides the query helpers the tests lean on.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::sink::{EventSink, EventType, LogEntry, MemorySink};
///
/// let mut sink = MemorySink::new();
/// sink.emit(LogEntry::new(EventType::ConsensusTick, "tick 1").tick(1));
/// sink.emit(LogEntry::new(EventType::AgentReady, "ready").tick(1).agent("A"));
///
/// assert_eq!(sink.entries().len(), 2);
/// assert_eq!(sink.entries_of_type(EventType::AgentReady).len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Vec<LogEntry>,
    snapshots: Vec<StateSnapshot>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, in emission order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries of a given type, in emission order.
    pub fn entries_of_type(&self, event_type: EventType) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Entries attributed to a given agent.
    pub fn entries_for_agent(&self, agent_id: &str) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.agent_id.as_deref() == Some(agent_id))
            .collect()
    }

    /// Entries recorded at a given tick.
    pub fn entries_at_tick(&self, tick: usize) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.tick == Some(tick))
            .collect()
    }

    /// All saved snapshots, one per tick.
    pub fn snapshots(&self) -> &[StateSnapshot] {
        &self.snapshots
    }

    /// The most recent snapshot, if any tick has completed.
    pub fn last_snapshot(&self) -> Option<&StateSnapshot> {
        self.snapshots.last()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    fn save_snapshot(&mut self, snapshot: StateSnapshot) {
        self.snapshots.push(snapshot);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl NullSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for NullSink {
    fn emit(&mut self, _entry: LogEntry) {}

    fn save_snapshot(&mut self, _snapshot: StateSnapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_queries() {
        let mut sink = MemorySink::new();
        sink.emit(LogEntry::new(EventType::ConsensusTick, "t1").tick(1));
        sink.emit(
            LogEntry::new(EventType::AgentReady, "ready")
                .tick(1)
                .agent("A"),
        );
        sink.emit(
            LogEntry::new(EventType::AgentReady, "ready")
                .tick(2)
                .agent("B"),
        );

        assert_eq!(sink.entries_at_tick(1).len(), 2);
        assert_eq!(sink.entries_of_type(EventType::AgentReady).len(), 2);
        assert_eq!(sink.entries_for_agent("B").len(), 1);
    }

    #[test]
    fn test_event_type_serializes_snake_case() {
        let json = serde_json::to_string(&EventType::FinalizationDecision).unwrap();
        assert_eq!(json, "\"finalization_decision\"");
    }

    #[test]
    fn test_default_level_is_info() {
        let entry = LogEntry::new(EventType::ConsensusTick, "t");
        assert_eq!(entry.level, LogLevel::Info);
        let entry = entry.level(LogLevel::Warning);
        assert_eq!(entry.level, LogLevel::Warning);
    }
}
