#![forbid(unsafe_code)]
//! pullflow-monitor: distributed termination detection.
//!
//! Nodes never talk to each other about termination. Instead every event that
//! changes how many answers may still be in flight, or how many demand paths
//! may still reach an unexhausted source, is sent one-way to the monitor. The
//! monitor is the only place that aggregates state from several contexts.
//!
//! An execution is terminated once its root is registered and both the answer
//! balance and the frontier count are back to zero.

pub mod error;
pub mod ledger;
pub mod monitor;
pub mod tracking;

pub use error::{Error, Error as MonitorError, Result};
pub use ledger::{JournalEntry, Ledger};
pub use monitor::{Monitor, Termination};
pub use tracking::PeakTracker;
