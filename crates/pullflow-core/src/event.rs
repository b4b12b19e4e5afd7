//! Monitor events: the one-way notifications nodes send to the termination
//! monitor whenever the number of in-flight answers or demand paths changes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One accounting event. The reporting node travels alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A terminal consumer attached; opens the root demand path.
    RegisterRoot,
    /// `n` logical answers now exist that did not before.
    Create { n: u64 },
    /// One answer was consumed without being forwarded.
    Destroy,
    /// One demand path became `n + 1` paths.
    Fork { n: u64 },
    /// Two demand paths converged into one, or a path ended short of any
    /// source.
    Join,
    /// A leaf source ran dry or was closed; its demand path ends.
    Finish,
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::RegisterRoot => "register_root",
            MonitorEvent::Create { .. } => "create",
            MonitorEvent::Destroy => "destroy",
            MonitorEvent::Fork { .. } => "fork",
            MonitorEvent::Join => "join",
            MonitorEvent::Finish => "finish",
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::Create { n } | MonitorEvent::Fork { n } => {
                write!(f, "{}({})", self.kind(), n)
            }
            _ => f.write_str(self.kind()),
        }
    }
}
