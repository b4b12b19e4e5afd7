//! Context schedulers.
//!
//! `Scheduler` runs every context on the calling thread, one bounded turn per
//! context per round, and settles all outboxes between rounds. The
//! `AsyncScheduler` gives each context its own tokio task, a mailbox in a
//! shared routing table, and a channel to a single monitor task.
//!
//! Both keep the one ordering the monitor depends on: a context's events
//! reach the monitor no later than the signals it sent after them.

pub use sync_impl::*;

#[cfg(feature = "async-scheduler")]
pub use async_impl::*;

/// Deterministic round-robin scheduler (default, no tokio dependency)
mod sync_impl {
    use std::collections::{BTreeMap, BTreeSet};

    use pullflow_core::config::EngineConfig;
    use pullflow_core::event::MonitorEvent;
    use pullflow_core::id::{ContextId, ExecutionId, NodeRef};
    use pullflow_core::packet::Packet;
    use pullflow_monitor::{Ledger, Monitor, Termination};
    use pullflow_reactive::{Context, NodeFailure, Outbound};
    use serde::Serialize;

    use crate::runtime::ExecError;

    pub(crate) type MonitorBatch = Vec<(ExecutionId, NodeRef, MonitorEvent)>;

    /// What one `run_until_idle` call did.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
    pub struct RunStats {
        pub steps: u64,
        pub rounds: u64,
        /// Signals moved between contexts.
        pub delivered: u64,
        /// Signals addressed to a closed or unknown context.
        pub dropped: u64,
        /// Executions that received their verdict during this call.
        pub terminated: Vec<ExecutionId>,
    }

    pub struct Scheduler<P: Packet> {
        cfg: EngineConfig,
        contexts: BTreeMap<ContextId, Context<P>>,
        closed: BTreeSet<ContextId>,
        next_context: u64,
        monitor: Monitor,
        verdicts: Vec<Termination>,
        failures: Vec<NodeFailure>,
    }

    impl<P: Packet> Scheduler<P> {
        pub fn new(cfg: EngineConfig) -> Self {
            let monitor = Monitor::from_config(&cfg);
            Self {
                cfg,
                contexts: BTreeMap::new(),
                closed: BTreeSet::new(),
                next_context: 0,
                monitor,
                verdicts: Vec::new(),
                failures: Vec::new(),
            }
        }

        pub fn config(&self) -> &EngineConfig {
            &self.cfg
        }

        pub fn add_context(&mut self) -> ContextId {
            let id = ContextId::new(self.next_context);
            self.next_context += 1;
            self.contexts.insert(id, Context::new(id));
            id
        }

        pub fn context(&self, id: ContextId) -> Option<&Context<P>> {
            self.contexts.get(&id)
        }

        pub fn context_mut(&mut self, id: ContextId) -> Option<&mut Context<P>> {
            self.contexts.get_mut(&id)
        }

        /// Open contexts in id order. Handy for wiring one pipeline across
        /// several contexts at once.
        pub fn contexts_mut(&mut self) -> impl Iterator<Item = &mut Context<P>> + '_ {
            self.contexts.values_mut()
        }

        pub fn context_ids(&self) -> impl Iterator<Item = ContextId> + '_ {
            self.contexts.keys().copied()
        }

        pub fn is_closed(&self, id: ContextId) -> bool {
            self.closed.contains(&id)
        }

        /// Close a context. Signals still addressed to it are dropped.
        pub fn close_context(&mut self, id: ContextId) -> Option<Context<P>> {
            let mut ctx = self.contexts.remove(&id)?;
            self.closed.insert(id);
            self.failures.extend(ctx.take_failures());

            #[cfg(feature = "tracing")]
            tracing::debug!(context = %id, nodes = ctx.len(), "context closed");

            Some(ctx)
        }

        pub fn monitor(&self) -> &Monitor {
            &self.monitor
        }

        pub fn verdict(&self, execution: ExecutionId) -> Option<&Termination> {
            self.verdicts.iter().find(|t| t.execution == execution)
        }

        /// Forget an execution's ledger and verdict.
        pub fn release(&mut self, execution: ExecutionId) -> Option<Ledger> {
            self.verdicts.retain(|t| t.execution != execution);
            self.monitor.release(execution)
        }

        /// Nodes of `execution` that were retired after a failed collaborator.
        pub fn take_failures(&mut self, execution: ExecutionId) -> Vec<NodeFailure> {
            let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.failures)
                .into_iter()
                .partition(|f| f.execution == execution);
            self.failures = rest;
            mine
        }

        /// Run rounds until no context has work left.
        pub fn run_until_idle(&mut self) -> Result<RunStats, ExecError> {
            let mut stats = RunStats::default();
            let per_turn = self.cfg.max_steps_per_turn.max(1);
            let limit = self.cfg.max_total_steps;

            loop {
                self.settle(&mut stats)?;
                if !self.contexts.values().any(Context::has_work) {
                    break;
                }
                stats.rounds += 1;

                for ctx in self.contexts.values_mut() {
                    if !ctx.has_work() {
                        continue;
                    }
                    let budget = match limit {
                        Some(limit) => {
                            let left = limit.saturating_sub(stats.steps);
                            if left == 0 {
                                return Err(ExecError::StepBudget(limit));
                            }
                            per_turn.min(usize::try_from(left).unwrap_or(usize::MAX))
                        }
                        None => per_turn,
                    };
                    stats.steps += ctx.run_turn(budget) as u64;
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(
                steps = stats.steps,
                rounds = stats.rounds,
                delivered = stats.delivered,
                dropped = stats.dropped,
                "scheduler idle"
            );
            Ok(stats)
        }

        /// Drain every outbox: monitor events as one batch, then signals into
        /// their target contexts in emission order.
        fn settle(&mut self, stats: &mut RunStats) -> Result<(), ExecError> {
            let mut batch: MonitorBatch = Vec::new();
            let mut mail = Vec::new();
            for ctx in self.contexts.values_mut() {
                for out in ctx.take_outbox() {
                    match out {
                        Outbound::Monitor {
                            execution,
                            node,
                            event,
                        } => batch.push((execution, node, event)),
                        Outbound::Signal(env) => mail.push(env),
                    }
                }
                self.failures.extend(ctx.take_failures());
            }

            for done in self.monitor.apply_batch(batch)? {
                #[cfg(feature = "tracing")]
                tracing::info!(execution = %done.execution, root = %done.root, "termination verdict");
                stats.terminated.push(done.execution);
                self.verdicts.push(done);
            }

            for env in mail {
                match self.contexts.get_mut(&env.target.context) {
                    Some(ctx) => {
                        ctx.enqueue(env);
                        stats.delivered += 1;
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(target_node = %env.target, "signal for a closed context dropped");
                        stats.dropped += 1;
                    }
                }
            }
            Ok(())
        }
    }

}

/// Task-per-context scheduler (requires the async-scheduler feature)
#[cfg(feature = "async-scheduler")]
mod async_impl {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{mpsc, oneshot, watch};

    use pullflow_core::config::EngineConfig;
    use pullflow_core::id::{ContextId, ExecutionId};
    use pullflow_core::packet::Packet;
    use pullflow_monitor::{Monitor, MonitorError, Termination};
    use pullflow_reactive::{Context, Envelope, NodeFailure, Outbound};

    use super::sync_impl::MonitorBatch;
    use crate::runtime::ExecError;

    /// Mailbox of every context, keyed by id.
    type Routes<P> = Arc<HashMap<ContextId, mpsc::UnboundedSender<Envelope<P>>>>;

    type Verdict = Result<Termination, MonitorError>;

    #[derive(Debug)]
    pub struct AsyncOutcome {
        pub termination: Termination,
        pub steps: u64,
        /// Signals addressed to a context that is not part of the run.
        pub dropped: u64,
        pub failures: Vec<NodeFailure>,
    }

    struct ContextReport {
        steps: u64,
        dropped: u64,
        failures: Vec<NodeFailure>,
    }

    /// Contexts are wired up front through `context_mut`; `run` then moves
    /// each onto its own task and waits for the monitor's verdict.
    pub struct AsyncScheduler<P: Packet> {
        cfg: EngineConfig,
        contexts: Vec<Context<P>>,
        next_context: u64,
    }

    impl<P: Packet> AsyncScheduler<P> {
        pub fn new(cfg: EngineConfig) -> Self {
            Self {
                cfg,
                contexts: Vec::new(),
                next_context: 0,
            }
        }

        pub fn add_context(&mut self) -> ContextId {
            let id = ContextId::new(self.next_context);
            self.next_context += 1;
            self.contexts.push(Context::new(id));
            id
        }

        pub fn context_mut(&mut self, id: ContextId) -> Option<&mut Context<P>> {
            self.contexts.iter_mut().find(|c| c.id() == id)
        }

        pub fn contexts_mut(&mut self) -> impl Iterator<Item = &mut Context<P>> + '_ {
            self.contexts.iter_mut()
        }

        /// Drive every context until `execution` terminates, fails, or the
        /// configured timeout elapses.
        pub async fn run(self, execution: ExecutionId) -> Result<AsyncOutcome, ExecError> {
            let Self {
                cfg, mut contexts, ..
            } = self;
            let mut monitor = Monitor::from_config(&cfg);

            // Wiring done before the run is judged as a single batch.
            let mut initial: MonitorBatch = Vec::new();
            let mut mail = Vec::new();
            let mut failures = Vec::new();
            for ctx in &mut contexts {
                for out in ctx.take_outbox() {
                    match out {
                        Outbound::Monitor {
                            execution,
                            node,
                            event,
                        } => initial.push((execution, node, event)),
                        Outbound::Signal(env) => mail.push(env),
                    }
                }
                failures.extend(ctx.take_failures());
            }
            let early = monitor
                .apply_batch(initial)?
                .into_iter()
                .find(|t| t.execution == execution);
            if let Some(termination) = early {
                return Ok(AsyncOutcome {
                    termination,
                    steps: 0,
                    dropped: 0,
                    failures,
                });
            }

            let mut senders = HashMap::new();
            let mut inboxes = Vec::with_capacity(contexts.len());
            for ctx in contexts {
                let (tx, rx) = mpsc::unbounded_channel();
                senders.insert(ctx.id(), tx);
                inboxes.push((ctx, rx));
            }
            let mut dropped = 0;
            for env in mail {
                match senders.get(&env.target.context) {
                    Some(tx) => {
                        let _ = tx.send(env);
                    }
                    None => dropped += 1,
                }
            }
            let routes: Routes<P> = Arc::new(senders);

            let (monitor_tx, monitor_rx) = mpsc::unbounded_channel::<MonitorBatch>();
            let (verdict_tx, verdict_rx) = oneshot::channel::<Verdict>();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let monitor_task = tokio::spawn(watch_monitor(monitor, monitor_rx, execution, verdict_tx));

            let budget = cfg.max_steps_per_turn.max(1);
            let handles: Vec<_> = inboxes
                .into_iter()
                .map(|(ctx, inbox)| {
                    tokio::spawn(drive_context(
                        ctx,
                        inbox,
                        Arc::clone(&routes),
                        monitor_tx.clone(),
                        shutdown_rx.clone(),
                        budget,
                    ))
                })
                .collect();
            drop(monitor_tx);
            drop(routes);

            let limit = Duration::from_millis(cfg.termination_timeout_ms);
            let outcome = tokio::time::timeout(limit, verdict_rx).await;
            let _ = shutdown_tx.send(true);

            let mut steps = 0;
            for handle in handles {
                let report = handle
                    .await
                    .map_err(|e| ExecError::Invalid(format!("context task: {e}")))?;
                steps += report.steps;
                dropped += report.dropped;
                failures.extend(report.failures);
            }
            monitor_task
                .await
                .map_err(|e| ExecError::Invalid(format!("monitor task: {e}")))?;

            let termination = match outcome {
                Ok(Ok(verdict)) => verdict?,
                Ok(Err(_)) => {
                    return Err(stalled(
                        execution,
                        failures,
                        ExecError::Invalid("monitor stopped before a verdict".into()),
                    ))
                }
                Err(_) => {
                    return Err(stalled(
                        execution,
                        failures,
                        ExecError::Timeout(cfg.termination_timeout_ms),
                    ))
                }
            };

            #[cfg(feature = "tracing")]
            tracing::info!(%execution, steps, dropped, "async run terminated");

            Ok(AsyncOutcome {
                termination,
                steps,
                dropped,
                failures,
            })
        }
    }

    /// A run without a verdict is blamed on the first failed node, if any.
    fn stalled(execution: ExecutionId, failures: Vec<NodeFailure>, otherwise: ExecError) -> ExecError {
        match failures.into_iter().find(|f| f.execution == execution) {
            Some(f) => ExecError::Collaborator {
                node: f.node,
                source: f.error,
            },
            None => otherwise,
        }
    }

    async fn watch_monitor(
        mut monitor: Monitor,
        mut batches: mpsc::UnboundedReceiver<MonitorBatch>,
        execution: ExecutionId,
        verdict: oneshot::Sender<Verdict>,
    ) -> Monitor {
        let mut verdict = Some(verdict);
        while let Some(batch) = batches.recv().await {
            let applied = monitor.apply_batch(batch);
            let Some(tx) = verdict.take() else {
                if let Err(_e) = &applied {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_e, "monitor event after the verdict");
                }
                continue;
            };
            match applied {
                Ok(done) => match done.into_iter().find(|t| t.execution == execution) {
                    Some(t) => {
                        let _ = tx.send(Ok(t));
                    }
                    None => verdict = Some(tx),
                },
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        }
        monitor
    }

    async fn drive_context<P: Packet>(
        mut ctx: Context<P>,
        mut inbox: mpsc::UnboundedReceiver<Envelope<P>>,
        routes: Routes<P>,
        monitor: mpsc::UnboundedSender<MonitorBatch>,
        mut shutdown: watch::Receiver<bool>,
        budget: usize,
    ) -> ContextReport {
        let mut dropped = 0;
        loop {
            while let Ok(env) = inbox.try_recv() {
                ctx.enqueue(env);
            }
            if ctx.has_work() {
                ctx.run_turn(budget);
                dropped += flush(&mut ctx, &routes, &monitor);
                if *shutdown.borrow() {
                    break;
                }
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                env = inbox.recv() => match env {
                    Some(env) => ctx.enqueue(env),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        ContextReport {
            steps: ctx.steps(),
            dropped,
            failures: ctx.take_failures(),
        }
    }

    /// Events ahead of a signal are sent to the monitor before the signal
    /// leaves, so whatever the receiver reports lands after them.
    fn flush<P: Packet>(
        ctx: &mut Context<P>,
        routes: &Routes<P>,
        monitor: &mpsc::UnboundedSender<MonitorBatch>,
    ) -> u64 {
        let mut dropped = 0;
        let mut batch: MonitorBatch = Vec::new();
        for out in ctx.take_outbox() {
            match out {
                Outbound::Monitor {
                    execution,
                    node,
                    event,
                } => batch.push((execution, node, event)),
                Outbound::Signal(env) => {
                    if !batch.is_empty() {
                        let _ = monitor.send(std::mem::take(&mut batch));
                    }
                    match routes.get(&env.target.context) {
                        Some(tx) => {
                            let _ = tx.send(env);
                        }
                        None => dropped += 1,
                    }
                }
            }
        }
        if !batch.is_empty() {
            let _ = monitor.send(batch);
        }
        dropped
    }
}
