//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Signals a context dispatches in one turn before yielding to the scheduler.
    pub max_steps_per_turn: usize,

    /// Hard cap on dispatched signals per run. `None` means unbounded, which is
    /// only safe when every source is finite or every sink has a limit.
    pub max_total_steps: Option<u64>,

    /// Keep a journal of every monitor event per execution.
    pub record_events: bool,

    /// Default answer limit for terminal sinks.
    pub answer_limit: Option<usize>,

    /// How long the async scheduler waits for a termination verdict.
    pub termination_timeout_ms: u64,

    /// Number of contexts a DSL pipeline is spread across.
    pub contexts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_turn: 1024,
            max_total_steps: None,
            record_events: false,
            answer_limit: None,
            termination_timeout_ms: 30_000,
            contexts: 1,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `PULLFLOW_MAX_STEPS_PER_TURN`: signals per context turn
    /// - `PULLFLOW_MAX_TOTAL_STEPS`: signal budget per run
    /// - `PULLFLOW_RECORD_EVENTS`: `1`/`true` to journal monitor events
    /// - `PULLFLOW_ANSWER_LIMIT`: default sink answer limit
    /// - `PULLFLOW_TERMINATION_TIMEOUT_MS`: async termination wait
    /// - `PULLFLOW_CONTEXTS`: contexts for DSL pipelines
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("PULLFLOW_MAX_STEPS_PER_TURN") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_steps_per_turn = v;
            }
        }

        if let Ok(s) = std::env::var("PULLFLOW_MAX_TOTAL_STEPS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.max_total_steps = Some(v);
            }
        }

        if let Ok(s) = std::env::var("PULLFLOW_RECORD_EVENTS") {
            cfg.record_events = matches!(s.as_str(), "1" | "true" | "yes");
        }

        if let Ok(s) = std::env::var("PULLFLOW_ANSWER_LIMIT") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.answer_limit = Some(v);
            }
        }

        if let Ok(s) = std::env::var("PULLFLOW_TERMINATION_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.termination_timeout_ms = v;
            }
        }

        if let Ok(s) = std::env::var("PULLFLOW_CONTEXTS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.contexts = v;
            }
        }

        cfg
    }

    /// Reject settings the schedulers cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps_per_turn == 0 {
            return Err(Error::Config("max_steps_per_turn must be at least 1".into()));
        }
        if self.contexts == 0 {
            return Err(Error::Config("contexts must be at least 1".into()));
        }
        if self.answer_limit == Some(0) {
            return Err(Error::Config("answer_limit of 0 would never pull".into()));
        }
        Ok(())
    }
}
