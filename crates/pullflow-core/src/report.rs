//! Execution report emitted by the runtime once a run goes idle.
//!
//! Carries the monitor's view of the run alongside provenance (plan hash,
//! engine version, timestamps) so runs can be compared after the fact.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;
use crate::id::ExecutionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub Uuid);

/// Snapshot of a monitor ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub answers: i64,
    pub frontiers: i64,
    pub created: u64,
    pub destroyed: u64,
    pub forks: u64,
    pub joins: u64,
    pub finished_sources: u64,
    pub peak_answers: i64,
    pub peak_frontiers: i64,
    pub events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub id: ReportId,

    pub execution: ExecutionId,

    /// Stable hash of the plan driving the run, if it was started from one.
    pub plan_hash: Option<Hash256>,

    pub engine_version: String,

    /// Answers collected by the terminal sink.
    pub answers: usize,

    /// Whether the monitor proved that no further answer can arrive.
    pub terminated: bool,

    /// Signals dispatched across all contexts.
    pub steps: u64,

    pub ledger: LedgerSnapshot,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl ExecutionReport {
    pub fn new(execution: ExecutionId, plan_hash: Option<Hash256>, started_ms: u64) -> Self {
        Self {
            id: ReportId(Uuid::new_v4()),
            execution,
            plan_hash,
            engine_version: crate::VERSION.to_string(),
            answers: 0,
            terminated: false,
            steps: 0,
            ledger: LedgerSnapshot::default(),
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(
        mut self,
        finished_ms: u64,
        answers: usize,
        terminated: bool,
        steps: u64,
        ledger: LedgerSnapshot,
    ) -> Self {
        self.finished_ms = finished_ms;
        self.answers = answers;
        self.terminated = terminated;
        self.steps = steps;
        self.ledger = ledger;
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}
