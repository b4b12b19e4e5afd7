//! Pipeline documents: shape, validation, and a printable wiring.
//!
//! Example:
//! ```yaml
//! config: { contexts: 2 }
//! nodes:
//!   - { id: nums,  op: source, values: [1, 2, 3] }
//!   - { id: twice, op: map, inputs: [nums], mul: 2 }
//!   - { id: copy,  op: fan_out, inputs: [twice] }
//!   - { id: left,  op: map, inputs: [copy], add: 1 }
//!   - { id: right, op: map, inputs: [copy], add: 100 }
//!   - { id: both,  op: fan_in, inputs: [left, right] }
//!   - { id: out,   op: sink, inputs: [both], limit: 4 }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use pullflow_core::config::EngineConfig;
use pullflow_core::hash::{hash_serde, Hash256};

use crate::error::{DslError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub config: Option<PipelineConfig>,
    pub nodes: Vec<NodeDef>,
}

/// Engine overrides carried by a document. Unset fields keep whatever the
/// caller already had.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_steps_per_turn: Option<usize>,
    pub max_total_steps: Option<u64>,
    pub record_events: Option<bool>,
    pub answer_limit: Option<usize>,
    pub termination_timeout_ms: Option<u64>,
    pub contexts: Option<usize>,
}

impl PipelineConfig {
    pub fn apply(&self, cfg: &mut EngineConfig) {
        if let Some(v) = self.max_steps_per_turn {
            cfg.max_steps_per_turn = v;
        }
        if self.max_total_steps.is_some() {
            cfg.max_total_steps = self.max_total_steps;
        }
        if let Some(v) = self.record_events {
            cfg.record_events = v;
        }
        if self.answer_limit.is_some() {
            cfg.answer_limit = self.answer_limit;
        }
        if let Some(v) = self.termination_timeout_ms {
            cfg.termination_timeout_ms = v;
        }
        if let Some(v) = self.contexts {
            cfg.contexts = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(flatten)]
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Op {
    /// Finite list, or an endless repetition of it with `cycle: true`.
    Source {
        values: Vec<i64>,
        #[serde(default)]
        cycle: bool,
    },
    /// `v * mul + add`; overflow fails the node.
    Map {
        #[serde(default)]
        add: Option<i64>,
        #[serde(default)]
        mul: Option<i64>,
    },
    /// Each packet `repeat` times; zero drops it.
    FlatMap { repeat: usize },
    Buffer {
        #[serde(default)]
        prefetch: usize,
    },
    Dedup,
    FindFirst,
    FanOut,
    FanIn,
    /// Streaming join over `plan`; every step scans the table of that name.
    Compound {
        plan: Vec<String>,
        tables: BTreeMap<String, Vec<i64>>,
        #[serde(default)]
        initial: i64,
        #[serde(default)]
        merge: Merge,
    },
    Sink {
        #[serde(default)]
        limit: Option<usize>,
    },
}

/// How a compound folds a step's row into the running answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Merge {
    #[default]
    Sum,
    /// Keep only the newest row.
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Leaf,
    One,
    Many,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Leaf => f.write_str("no inputs"),
            Arity::One => f.write_str("exactly one input"),
            Arity::Many => f.write_str("at least one input"),
        }
    }
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Source { .. } => "source",
            Op::Map { .. } => "map",
            Op::FlatMap { .. } => "flat_map",
            Op::Buffer { .. } => "buffer",
            Op::Dedup => "dedup",
            Op::FindFirst => "find_first",
            Op::FanOut => "fan_out",
            Op::FanIn => "fan_in",
            Op::Compound { .. } => "compound",
            Op::Sink { .. } => "sink",
        }
    }

    fn arity(&self) -> Arity {
        match self {
            Op::Source { .. } | Op::Compound { .. } => Arity::Leaf,
            Op::FanIn => Arity::Many,
            _ => Arity::One,
        }
    }

    fn params(&self) -> String {
        match self {
            Op::Source { values, cycle } => {
                format!("{} values{}", values.len(), if *cycle { ", cycled" } else { "" })
            }
            Op::Map { add, mul } => format!("* {} + {}", mul.unwrap_or(1), add.unwrap_or(0)),
            Op::FlatMap { repeat } => format!("x{repeat}"),
            Op::Buffer { prefetch } => format!("prefetch {prefetch}"),
            Op::Compound {
                plan,
                initial,
                merge,
                ..
            } => format!("{} from {initial} ({merge:?})", plan.join(" -> ")),
            Op::Sink { limit: Some(n) } => format!("limit {n}"),
            _ => String::new(),
        }
    }
}

/// Parse and validate a YAML document.
pub fn parse_pipeline(yaml_src: &str) -> Result<Pipeline> {
    let doc: Pipeline = serde_yaml::from_str(yaml_src)?;
    doc.validate()?;
    Ok(doc)
}

impl Pipeline {
    /// Check that the document wires into a single tree of demand ending in
    /// one sink.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(DslError::Invalid("pipeline has no nodes".into()));
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut readers: HashMap<&str, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.id.is_empty() {
                return Err(DslError::Invalid(format!("node #{i} has an empty id")));
            }
            if index.contains_key(node.id.as_str()) {
                return Err(DslError::Invalid(format!("duplicate node id `{}`", node.id)));
            }

            let mut seen = HashSet::new();
            for input in &node.inputs {
                if !index.contains_key(input.as_str()) {
                    if self.nodes.iter().any(|n| n.id == *input) {
                        return Err(DslError::Invalid(format!(
                            "`{}` reads `{input}` before it is defined",
                            node.id
                        )));
                    }
                    return Err(DslError::UnknownNode(input.clone()));
                }
                if !seen.insert(input.as_str()) {
                    return Err(DslError::Invalid(format!(
                        "`{}` lists `{input}` twice",
                        node.id
                    )));
                }
                *readers.entry(input.as_str()).or_default() += 1;
            }

            let arity = node.op.arity();
            let ok = match arity {
                Arity::Leaf => node.inputs.is_empty(),
                Arity::One => node.inputs.len() == 1,
                Arity::Many => !node.inputs.is_empty(),
            };
            if !ok {
                return Err(DslError::Invalid(format!(
                    "`{}` ({}) takes {arity}, got {}",
                    node.id,
                    node.op.name(),
                    node.inputs.len()
                )));
            }
            check_params(node)?;
            index.insert(node.id.as_str(), i);
        }

        let sinks = self
            .nodes
            .iter()
            .filter(|n| matches!(n.op, Op::Sink { .. }))
            .count();
        if sinks != 1 {
            return Err(DslError::Invalid(format!(
                "expected exactly one sink, found {sinks}"
            )));
        }

        for node in &self.nodes {
            let read_by = readers.get(node.id.as_str()).copied().unwrap_or(0);
            match (&node.op, read_by) {
                (Op::Sink { .. }, 0) => {}
                (Op::Sink { .. }, _) => {
                    return Err(DslError::Invalid(format!(
                        "sink `{}` cannot feed other nodes",
                        node.id
                    )))
                }
                (_, 0) => {
                    return Err(DslError::Invalid(format!(
                        "`{}` is never read; every node must lead to the sink",
                        node.id
                    )))
                }
                (Op::FanOut, _) | (_, 1) => {}
                (_, n) => {
                    return Err(DslError::Invalid(format!(
                        "`{}` feeds {n} nodes; route it through a fan_out",
                        node.id
                    )))
                }
            }
        }

        Ok(())
    }

    /// Stable hash of the document, recorded in execution reports.
    pub fn hash(&self) -> Result<Hash256> {
        Ok(hash_serde(self)?)
    }

    /// One line per node: id, operator, context, inputs, parameters.
    pub fn explain(&self, contexts: usize) -> String {
        let width = contexts.max(1);
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let inputs = if node.inputs.is_empty() {
                String::from("-")
            } else {
                node.inputs.join(", ")
            };
            out.push_str(&format!(
                "{:<12} {:<10} c{:<3} <- {:<20} {}\n",
                node.id,
                node.op.name(),
                i % width,
                inputs,
                node.op.params()
            ));
        }
        out
    }
}

fn check_params(node: &NodeDef) -> Result<()> {
    match &node.op {
        Op::Map {
            add: None,
            mul: None,
        } => Err(DslError::Invalid(format!(
            "map `{}` needs `add` or `mul`",
            node.id
        ))),
        Op::Compound { plan, tables, .. } => {
            if plan.is_empty() {
                return Err(DslError::Invalid(format!(
                    "compound `{}` has an empty plan",
                    node.id
                )));
            }
            match plan.iter().find(|step| !tables.contains_key(step.as_str())) {
                Some(step) => Err(DslError::Invalid(format!(
                    "compound `{}` has no table `{step}`",
                    node.id
                ))),
                None => Ok(()),
            }
        }
        Op::Sink { limit: Some(0) } => Err(DslError::Invalid(format!(
            "sink `{}` has a limit of 0",
            node.id
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIAMOND: &str = r#"
config:
  contexts: 2
  answer_limit: 10
nodes:
  - { id: nums,  op: source, values: [1, 2, 3] }
  - { id: copy,  op: fan_out, inputs: [nums] }
  - { id: left,  op: map, inputs: [copy], add: 1 }
  - { id: right, op: map, inputs: [copy], mul: 10 }
  - { id: both,  op: fan_in, inputs: [left, right] }
  - { id: out,   op: sink, inputs: [both] }
"#;

    fn err(src: &str) -> String {
        parse_pipeline(src).unwrap_err().to_string()
    }

    #[test]
    fn parses_a_diamond() {
        let p = parse_pipeline(DIAMOND).unwrap();
        assert_eq!(p.nodes.len(), 6);
        assert_eq!(
            p.nodes[2].op,
            Op::Map {
                add: Some(1),
                mul: None
            }
        );
        assert_eq!(p.nodes[4].inputs, vec!["left", "right"]);

        let mut cfg = EngineConfig::default();
        p.config.as_ref().unwrap().apply(&mut cfg);
        assert_eq!(cfg.contexts, 2);
        assert_eq!(cfg.answer_limit, Some(10));
        assert_eq!(cfg.max_steps_per_turn, 1024);
    }

    #[test]
    fn compound_defaults() {
        let p = parse_pipeline(
            r#"
nodes:
  - op: compound
    id: join
    plan: [a, b]
    tables: { a: [1, 2], b: [10] }
  - { id: out, op: sink, inputs: [join] }
"#,
        )
        .unwrap();
        match &p.nodes[0].op {
            Op::Compound { initial, merge, .. } => {
                assert_eq!(*initial, 0);
                assert_eq!(*merge, Merge::Sum);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let e = err(r#"
nodes:
  - { id: a, op: source, values: [1] }
  - { id: a, op: sink, inputs: [a] }
"#);
        assert!(e.contains("duplicate node id `a`"), "{e}");
    }

    #[test]
    fn rejects_unknown_and_forward_inputs() {
        let unknown = parse_pipeline(
            r#"
nodes:
  - { id: out, op: sink, inputs: [ghost] }
"#,
        )
        .unwrap_err();
        assert!(matches!(unknown, DslError::UnknownNode(ref id) if id == "ghost"));

        let e = err(r#"
nodes:
  - { id: out, op: sink, inputs: [src] }
  - { id: src, op: source, values: [1] }
"#);
        assert!(e.contains("before it is defined"), "{e}");
    }

    #[test]
    fn enforces_arity() {
        let e = err(r#"
nodes:
  - { id: a, op: source, values: [1] }
  - { id: b, op: source, values: [2] }
  - { id: m, op: dedup, inputs: [a, b] }
  - { id: out, op: sink, inputs: [m] }
"#);
        assert!(e.contains("takes exactly one input, got 2"), "{e}");

        let e = err(r#"
nodes:
  - { id: m, op: fan_in }
  - { id: out, op: sink, inputs: [m] }
"#);
        assert!(e.contains("at least one input"), "{e}");
    }

    #[test]
    fn needs_exactly_one_sink() {
        let e = err(r#"
nodes:
  - { id: a, op: source, values: [1] }
"#);
        assert!(e.contains("found 0"), "{e}");
    }

    #[test]
    fn rejects_dangling_and_shared_nodes() {
        let e = err(r#"
nodes:
  - { id: a, op: source, values: [1] }
  - { id: b, op: source, values: [2] }
  - { id: out, op: sink, inputs: [a] }
"#);
        assert!(e.contains("`b` is never read"), "{e}");

        let e = err(r#"
nodes:
  - { id: a, op: source, values: [1] }
  - { id: x, op: map, inputs: [a], add: 1 }
  - { id: y, op: map, inputs: [a], add: 2 }
  - { id: both, op: fan_in, inputs: [x, y] }
  - { id: out, op: sink, inputs: [both] }
"#);
        assert!(e.contains("route it through a fan_out"), "{e}");
    }

    #[test]
    fn rejects_bad_parameters() {
        let e = err(r#"
nodes:
  - { id: a, op: source, values: [1] }
  - { id: m, op: map, inputs: [a] }
  - { id: out, op: sink, inputs: [m] }
"#);
        assert!(e.contains("needs `add` or `mul`"), "{e}");

        let e = err(r#"
nodes:
  - { id: j, op: compound, plan: [a, b], tables: { a: [1] } }
  - { id: out, op: sink, inputs: [j] }
"#);
        assert!(e.contains("no table `b`"), "{e}");
    }

    #[test]
    fn explain_places_nodes_round_robin() {
        let p = parse_pipeline(DIAMOND).unwrap();
        let text = p.explain(2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("nums"));
        assert!(lines[1].contains("fan_out") && lines[1].contains("c1"));
        assert!(lines[4].contains("left, right"));
    }

    #[test]
    fn hash_is_stable() {
        let a = parse_pipeline(DIAMOND).unwrap().hash().unwrap();
        let b = parse_pipeline(DIAMOND).unwrap().hash().unwrap();
        assert_eq!(a, b);
    }
}
