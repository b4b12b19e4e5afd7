//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::event::MonitorEvent;
pub use crate::hash::{hash_serde, Hash256};
pub use crate::id::{ContextId, ExecutionId, NodeId, NodeRef, StepId};
pub use crate::packet::Packet;
pub use crate::plan::Plan;
pub use crate::report::{ExecutionReport, LedgerSnapshot};
