//! Runtime: run executions to idle and emit an ExecutionReport.
//!
//! - `resolve` wires `Compound -> Sink` for a plan in a fresh context, runs
//!   it, and closes the context again.
//! - `run` drives an execution the caller wired by hand through
//!   `scheduler_mut`.
//! - Either way the report carries the monitor's verdict and ledger, and
//!   the ledger is released afterwards.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use pullflow_core::config::EngineConfig;
use pullflow_core::hash::{hash_serde, Hash256};
use pullflow_core::id::{ExecutionId, NodeRef};
use pullflow_core::packet::Packet;
use pullflow_core::plan::Plan;
use pullflow_core::report::ExecutionReport;
use pullflow_monitor::{JournalEntry, MonitorError};
use pullflow_reactive::{AnswerHandle, MergeFn, ReactiveError, SpawnFn};

use crate::metrics::emit_span;
use crate::scheduler::Scheduler;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("node {node} failed: {source}")]
    Collaborator {
        node: NodeRef,
        #[source]
        source: ReactiveError,
    },
    #[error("could not wire execution: {0}")]
    Build(#[source] ReactiveError),
    #[error("invalid execution: {0}")]
    Invalid(String),
    #[error("step budget of {0} signals exhausted")]
    StepBudget(u64),
    #[error("monitor: {0}")]
    Monitor(#[from] MonitorError),
    #[error("no termination verdict within {0} ms")]
    Timeout(u64),
    #[error("hashing error: {0}")]
    Hash(String),
}

/// Answers collected by the root sink plus the run's report.
#[derive(Debug)]
pub struct Resolution<P> {
    pub answers: Vec<P>,
    pub report: ExecutionReport,
    /// Monitor events in arrival order; empty unless `record_events` is set.
    pub journal: Vec<JournalEntry>,
}

/// Engine owns the scheduler (and through it the monitor) and hands out
/// execution ids.
pub struct Engine<P: Packet> {
    scheduler: Scheduler<P>,
    next_execution: u64,
}

impl<P: Packet> Engine<P> {
    pub fn new(cfg: EngineConfig) -> Result<Self, ExecError> {
        cfg.validate()
            .map_err(|e| ExecError::Invalid(e.to_string()))?;
        Ok(Self {
            scheduler: Scheduler::new(cfg),
            next_execution: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        self.scheduler.config()
    }

    pub fn scheduler(&self) -> &Scheduler<P> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<P> {
        &mut self.scheduler
    }

    pub fn next_execution(&mut self) -> ExecutionId {
        let id = ExecutionId::new(self.next_execution);
        self.next_execution += 1;
        id
    }

    /// Streaming join of `plan`'s steps, seeded with `initial`.
    pub fn resolve(
        &mut self,
        plan: &Plan,
        initial: P,
        spawn: SpawnFn<P>,
        merge: MergeFn<P>,
    ) -> Result<Resolution<P>, ExecError> {
        let plan_hash = hash_serde(plan).map_err(|e| ExecError::Hash(e.to_string()))?;
        let execution = self.next_execution();
        let limit = self.config().answer_limit;

        let context = self.scheduler.add_context();
        let wired = {
            let ctx = self
                .scheduler
                .context_mut(context)
                .ok_or_else(|| ExecError::Invalid(format!("{context} is not open")))?;
            let mut b = ctx.builder(execution);
            b.compound(plan, initial, spawn, merge)
                .map(|root| b.sink(root, limit).1)
        };
        let answers = match wired {
            Ok(answers) => answers,
            Err(e) => {
                self.scheduler.close_context(context);
                return Err(ExecError::Build(e));
            }
        };

        let resolution = self.execute(execution, &answers, Some(plan_hash));
        self.scheduler.close_context(context);
        resolution
    }

    /// Run an execution wired through `scheduler_mut` until every context
    /// is idle.
    pub fn run(
        &mut self,
        execution: ExecutionId,
        answers: &AnswerHandle<P>,
    ) -> Result<Resolution<P>, ExecError> {
        self.execute(execution, answers, None)
    }

    /// Run to idle and report. The execution's ledger and verdict are
    /// released whether or not the run succeeded.
    fn execute(
        &mut self,
        execution: ExecutionId,
        answers: &AnswerHandle<P>,
        plan_hash: Option<Hash256>,
    ) -> Result<Resolution<P>, ExecError> {
        let outcome = self.drive(execution, answers, plan_hash);
        let journal = self
            .scheduler
            .release(execution)
            .map(|ledger| ledger.journal().to_vec())
            .unwrap_or_default();
        if outcome.is_err() {
            self.scheduler.take_failures(execution);
        }
        outcome.map(|(answers, report)| Resolution {
            answers,
            report,
            journal,
        })
    }

    fn drive(
        &mut self,
        execution: ExecutionId,
        answers: &AnswerHandle<P>,
        plan_hash: Option<Hash256>,
    ) -> Result<(Vec<P>, ExecutionReport), ExecError> {
        let started_ms = now_millis();
        let stats = self.scheduler.run_until_idle()?;

        if let Some(failure) = self.scheduler.take_failures(execution).into_iter().next() {
            return Err(ExecError::Collaborator {
                node: failure.node,
                source: failure.error,
            });
        }

        let terminated = self.scheduler.verdict(execution).is_some();
        let ledger = self.scheduler.monitor().snapshot(execution)?;
        let answers = answers.snapshot();

        emit_span(
            "execution",
            &[
                ("execution", execution.to_string()),
                ("answers", answers.len().to_string()),
                ("terminated", terminated.to_string()),
                ("steps", stats.steps.to_string()),
            ],
        );
        #[cfg(feature = "tracing")]
        tracing::info!(
            %execution,
            answers = answers.len(),
            terminated,
            steps = stats.steps,
            "execution idle"
        );

        let report = ExecutionReport::new(execution, plan_hash, started_ms).finish(
            now_millis(),
            answers.len(),
            terminated,
            stats.steps,
            ledger,
        );
        Ok((answers, report))
    }
}

// --- helpers ---

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
