#![forbid(unsafe_code)]
//! pullflow-dsl: YAML pipeline documents over `i64` packets.
//!
//! A document lists nodes in wiring order; each names its operator and the
//! nodes it reads from. `parse_pipeline` checks the document, and
//! `Pipeline::instantiate` spreads the nodes over one or more contexts.
//!
//! ```yaml
//! nodes:
//!   - { id: nums, op: source, values: [3, 1, 3, 2] }
//!   - { id: uniq, op: dedup, inputs: [nums] }
//!   - { id: out,  op: sink,  inputs: [uniq] }
//! ```

pub mod build;
pub mod error;
pub mod pipeline;

pub use build::Instance;
pub use error::{DslError, Result};
pub use pipeline::{parse_pipeline, Merge, NodeDef, Op, Pipeline, PipelineConfig};
