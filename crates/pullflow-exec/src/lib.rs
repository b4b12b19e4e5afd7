#![forbid(unsafe_code)]
//! pullflow-exec: drives contexts until their executions go quiet.
//!
//! The default scheduler is a deterministic round-robin over contexts on the
//! calling thread. With `async-scheduler` each context also gets a tokio task
//! and talks to the monitor over channels.

pub mod metrics;
pub mod runtime;
pub mod scheduler;

pub use runtime::{Engine, ExecError, Resolution};
pub use scheduler::{RunStats, Scheduler};

#[cfg(feature = "async-scheduler")]
pub use scheduler::{AsyncOutcome, AsyncScheduler};
