//! The monitor: routes events to per-execution ledgers and issues the
//! termination verdict exactly once.

use std::collections::HashMap;

use pullflow_core::config::EngineConfig;
use pullflow_core::event::MonitorEvent;
use pullflow_core::id::{ExecutionId, NodeRef};
use pullflow_core::report::LedgerSnapshot;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ledger::{JournalEntry, Ledger};

/// Verdict for one execution: no answer will ever reach `root` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    pub execution: ExecutionId,
    pub root: NodeRef,
    pub ledger: LedgerSnapshot,
}

#[derive(Debug, Default)]
pub struct Monitor {
    ledgers: HashMap<ExecutionId, Ledger>,
    record_events: bool,
}

impl Monitor {
    pub fn new(record_events: bool) -> Self {
        Self {
            ledgers: HashMap::new(),
            record_events,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(cfg.record_events)
    }

    /// Apply one event. Returns the termination verdict the first time the
    /// execution becomes quiescent; events after that are rejected.
    pub fn apply(
        &mut self,
        execution: ExecutionId,
        node: NodeRef,
        event: MonitorEvent,
    ) -> Result<Option<Termination>> {
        self.record(execution, node, event)?;
        Ok(self.settle(execution))
    }

    /// Apply a batch of events, judging quiescence only once the whole batch
    /// is in. A context's wiring may close a path before it reports the fork
    /// that opened it; inside one batch that dip is never mistaken for the end.
    pub fn apply_batch<I>(&mut self, events: I) -> Result<Vec<Termination>>
    where
        I: IntoIterator<Item = (ExecutionId, NodeRef, MonitorEvent)>,
    {
        let mut touched: Vec<ExecutionId> = Vec::new();
        for (execution, node, event) in events {
            self.record(execution, node, event)?;
            if !touched.contains(&execution) {
                touched.push(execution);
            }
        }
        Ok(touched
            .into_iter()
            .filter_map(|execution| self.settle(execution))
            .collect())
    }

    fn record(&mut self, execution: ExecutionId, node: NodeRef, event: MonitorEvent) -> Result<()> {
        let record = self.record_events;
        let ledger = self
            .ledgers
            .entry(execution)
            .or_insert_with(|| Ledger::new(record));

        if ledger.is_terminated() {
            return Err(Error::LateEvent {
                execution,
                node,
                event,
            });
        }
        if let (MonitorEvent::RegisterRoot, Some(existing)) = (event, ledger.root()) {
            return Err(Error::DuplicateRoot {
                execution,
                existing,
                node,
            });
        }

        ledger.apply(node, event);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            %execution,
            %node,
            %event,
            answers = ledger.answers(),
            frontiers = ledger.frontiers(),
            "monitor event"
        );
        Ok(())
    }

    fn settle(&mut self, execution: ExecutionId) -> Option<Termination> {
        let ledger = self.ledgers.get_mut(&execution)?;
        if ledger.is_terminated() || !ledger.is_quiescent() {
            return None;
        }
        ledger.mark_terminated();
        let root = ledger.root()?;

        #[cfg(feature = "tracing")]
        tracing::info!(%execution, %root, "execution terminated");

        Some(Termination {
            execution,
            root,
            ledger: ledger.snapshot(),
        })
    }

    pub fn ledger(&self, execution: ExecutionId) -> Option<&Ledger> {
        self.ledgers.get(&execution)
    }

    pub fn snapshot(&self, execution: ExecutionId) -> Result<LedgerSnapshot> {
        self.ledgers
            .get(&execution)
            .map(Ledger::snapshot)
            .ok_or(Error::UnknownExecution(execution))
    }

    pub fn is_terminated(&self, execution: ExecutionId) -> bool {
        self.ledgers
            .get(&execution)
            .map(Ledger::is_terminated)
            .unwrap_or(false)
    }

    pub fn journal(&self, execution: ExecutionId) -> &[JournalEntry] {
        self.ledgers
            .get(&execution)
            .map(Ledger::journal)
            .unwrap_or(&[])
    }

    /// Drop the ledger of a finished execution.
    pub fn release(&mut self, execution: ExecutionId) -> Option<Ledger> {
        self.ledgers.remove(&execution)
    }

    pub fn executions(&self) -> impl Iterator<Item = ExecutionId> + '_ {
        self.ledgers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pullflow_core::id::{ContextId, NodeId};

    const EXEC: ExecutionId = ExecutionId::new(1);

    fn node(n: u64) -> NodeRef {
        NodeRef::new(ContextId::new(0), NodeId::new(n))
    }

    #[test]
    fn terminates_once_balanced() {
        let mut m = Monitor::new(false);
        let sink = node(10);
        let src = node(1);

        assert_eq!(m.apply(EXEC, sink, MonitorEvent::RegisterRoot).unwrap(), None);
        assert_eq!(m.apply(EXEC, src, MonitorEvent::Create { n: 1 }).unwrap(), None);
        assert_eq!(m.apply(EXEC, src, MonitorEvent::Finish).unwrap(), None);
        let verdict = m
            .apply(EXEC, sink, MonitorEvent::Destroy)
            .unwrap()
            .expect("terminated");
        assert_eq!(verdict.root, sink);
        assert_eq!(verdict.ledger.created, 1);
        assert!(m.is_terminated(EXEC));
    }

    #[test]
    fn late_event_is_rejected() {
        let mut m = Monitor::new(false);
        m.apply(EXEC, node(2), MonitorEvent::RegisterRoot).unwrap();
        m.apply(EXEC, node(1), MonitorEvent::Finish)
            .unwrap()
            .expect("terminated");
        let err = m.apply(EXEC, node(1), MonitorEvent::Create { n: 1 }).unwrap_err();
        assert!(matches!(err, Error::LateEvent { .. }));
    }

    #[test]
    fn no_verdict_before_root() {
        let mut m = Monitor::new(false);
        m.apply(EXEC, node(1), MonitorEvent::Create { n: 1 }).unwrap();
        assert_eq!(m.apply(EXEC, node(2), MonitorEvent::Destroy).unwrap(), None);
        assert!(!m.is_terminated(EXEC));
    }

    #[test]
    fn second_root_is_rejected() {
        let mut m = Monitor::new(false);
        m.apply(EXEC, node(2), MonitorEvent::RegisterRoot).unwrap();
        m.apply(EXEC, node(2), MonitorEvent::Fork { n: 1 }).unwrap();
        let err = m.apply(EXEC, node(3), MonitorEvent::RegisterRoot).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoot { .. }));
    }

    #[test]
    fn batch_hides_transient_dips() {
        let mut m = Monitor::new(false);
        // a diamond wired before its fork was reported
        let batch = vec![
            (EXEC, node(9), MonitorEvent::RegisterRoot),
            (EXEC, node(3), MonitorEvent::Join),
            (EXEC, node(4), MonitorEvent::Fork { n: 1 }),
        ];
        assert!(m.apply_batch(batch).unwrap().is_empty());
        assert_eq!(m.ledger(EXEC).unwrap().frontiers(), 1);

        let done = m
            .apply_batch(vec![(EXEC, node(1), MonitorEvent::Finish)])
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].root, node(9));
    }

    #[test]
    fn executions_are_independent() {
        let other = ExecutionId::new(2);
        let mut m = Monitor::new(true);
        m.apply(EXEC, node(1), MonitorEvent::RegisterRoot).unwrap();
        m.apply(other, node(5), MonitorEvent::RegisterRoot).unwrap();
        assert!(m.apply(EXEC, node(2), MonitorEvent::Finish).unwrap().is_some());
        assert!(!m.is_terminated(other));
        assert_eq!(m.journal(EXEC).len(), 2);
        assert_eq!(m.journal(other).len(), 1);
        assert!(m.snapshot(ExecutionId::new(99)).is_err());
        assert!(m.release(EXEC).is_some());
        assert_eq!(m.executions().count(), 1);
    }
}
