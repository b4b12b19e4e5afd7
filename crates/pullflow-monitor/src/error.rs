use thiserror::Error;

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::{ExecutionId, NodeRef};

/// Result type local to pullflow-monitor.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("event {event} from node {node} arrived after {execution} was declared terminated")]
    LateEvent {
        execution: ExecutionId,
        node: NodeRef,
        event: MonitorEvent,
    },

    #[error("{execution} already has root {existing}; node {node} tried to register as root")]
    DuplicateRoot {
        execution: ExecutionId,
        existing: NodeRef,
        node: NodeRef,
    },

    #[error("unknown execution: {0}")]
    UnknownExecution(ExecutionId),
}
