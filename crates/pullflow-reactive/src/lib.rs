#![forbid(unsafe_code)]
//! pullflow-reactive: the Provider/Receiver pull protocol and its operators.
//!
//! Design intent:
//! - Nodes never call each other. Every pull, delivery and wiring step is a
//!   `Signal` routed through the owning `Context`, which runs them off a
//!   work-list so re-entrant chains never grow the call stack.
//! - Per-link bookkeeping lives in the registries; a second pull on a busy
//!   link or a delivery nobody asked for is a wiring bug and panics.
//! - Every operator reports answer and path changes to the termination
//!   monitor through `Cx::monitor`; the monitor itself lives elsewhere.

pub mod context;
pub mod registry;
pub mod traits;

pub mod buffer;
pub mod compound;
pub mod dedup;
pub mod fan_in;
pub mod fan_out;
pub mod find_first;
pub mod flat_map;
pub mod map;
pub mod sink;
pub mod source;

#[cfg(test)]
mod testing;

pub use context::{Builder, Context, Cx, NodeFailure, Outbound};
pub use sink::AnswerHandle;
pub use traits::{merge_fn, spawn_fn, Envelope, MergeFn, Reactive, ReactiveError, Signal, SpawnFn};
