#![forbid(unsafe_code)]
//! pullflow: a pull-based, backpressured streaming engine whose executions
//! know when they are done.
//!
//! This crate only re-exports the workspace members: the core types at the
//! top level, then `monitor`, `reactive`, `exec`, and `dsl`.

pub use pullflow_core::{config, event, hash, id, packet, plan, prelude, report};

pub use pullflow_dsl as dsl;
pub use pullflow_exec as exec;
pub use pullflow_monitor as monitor;
pub use pullflow_reactive as reactive;
