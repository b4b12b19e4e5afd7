//! Per-execution accounting.

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::report::LedgerSnapshot;
use serde::{Deserialize, Serialize};

use crate::tracking::PeakTracker;

/// One recorded event, kept only when journaling is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub node: NodeRef,
    pub event: MonitorEvent,
}

/// Running balance for a single execution.
///
/// `answers` counts logical answers created but not yet consumed by the root
/// or destroyed. `frontiers` counts open demand paths: the root opens one,
/// forks add, joins and exhausted sources close.
#[derive(Debug, Default)]
pub struct Ledger {
    root: Option<NodeRef>,
    answers: i64,
    frontiers: i64,
    created: u64,
    destroyed: u64,
    forks: u64,
    joins: u64,
    finished_sources: u64,
    events: u64,
    peak_answers: PeakTracker,
    peak_frontiers: PeakTracker,
    terminated: bool,
    journal: Option<Vec<JournalEntry>>,
}

impl Ledger {
    pub fn new(record_events: bool) -> Self {
        Self {
            journal: record_events.then(Vec::new),
            ..Self::default()
        }
    }

    pub(crate) fn apply(&mut self, node: NodeRef, event: MonitorEvent) {
        self.events += 1;
        match event {
            MonitorEvent::RegisterRoot => {
                self.root = Some(node);
                self.frontiers += 1;
                self.peak_frontiers.record(self.frontiers);
            }
            MonitorEvent::Create { n } => {
                self.created += n;
                self.answers += n as i64;
                self.peak_answers.record(self.answers);
            }
            MonitorEvent::Destroy => {
                self.destroyed += 1;
                self.answers -= 1;
            }
            MonitorEvent::Fork { n } => {
                self.forks += n;
                self.frontiers += n as i64;
                self.peak_frontiers.record(self.frontiers);
            }
            MonitorEvent::Join => {
                self.joins += 1;
                self.frontiers -= 1;
            }
            MonitorEvent::Finish => {
                self.finished_sources += 1;
                self.frontiers -= 1;
            }
        }
        #[cfg(feature = "tracing")]
        if self.answers < 0 {
            tracing::warn!(
                %node,
                %event,
                answers = self.answers,
                frontiers = self.frontiers,
                "negative answer balance"
            );
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry { node, event });
        }
    }

    /// True when nothing can arrive at the root any more.
    pub fn is_quiescent(&self) -> bool {
        self.root.is_some() && self.answers == 0 && self.frontiers == 0
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn root(&self) -> Option<NodeRef> {
        self.root
    }

    pub fn answers(&self) -> i64 {
        self.answers
    }

    pub fn frontiers(&self) -> i64 {
        self.frontiers
    }

    /// Recorded events in arrival order; empty when journaling is off.
    pub fn journal(&self) -> &[JournalEntry] {
        self.journal.as_deref().unwrap_or(&[])
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            answers: self.answers,
            frontiers: self.frontiers,
            created: self.created,
            destroyed: self.destroyed,
            forks: self.forks,
            joins: self.joins,
            finished_sources: self.finished_sources,
            peak_answers: self.peak_answers.peak(),
            peak_frontiers: self.peak_frontiers.peak(),
            events: self.events,
        }
    }
}
