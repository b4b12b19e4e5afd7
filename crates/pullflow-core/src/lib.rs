#![forbid(unsafe_code)]
//! pullflow-core: ids, packets, plans, monitor events, configs and hashing.
//!
//! Every other crate in the workspace depends on this one, so it stays free
//! of async runtimes and I/O.

pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod id;
pub mod packet;
pub mod plan;
pub mod prelude;
pub mod report;

/// Engine version recorded in execution reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
