//! Wiring a pipeline onto contexts.

use std::collections::{BTreeMap, HashMap};

use pullflow_core::id::{ExecutionId, NodeRef, StepId};
use pullflow_core::plan::Plan;
use pullflow_reactive::{
    merge_fn, spawn_fn, AnswerHandle, Builder, Context, MergeFn, ReactiveError, SpawnFn,
};

use crate::error::{DslError, Result};
use crate::pipeline::{Merge, Op, Pipeline};

/// A pipeline wired for one execution.
#[derive(Debug)]
pub struct Instance {
    pub execution: ExecutionId,
    pub root: NodeRef,
    pub answers: AnswerHandle<i64>,
    /// Document ids and where each node ended up, in document order.
    pub nodes: Vec<(String, NodeRef)>,
}

impl Instance {
    pub fn node(&self, id: &str) -> Option<NodeRef> {
        self.nodes.iter().find(|(n, _)| n == id).map(|(_, r)| *r)
    }
}

impl Pipeline {
    /// Wire every node for `execution`. Node `i` is placed on
    /// `contexts[i % contexts.len()]`; links between contexts go through
    /// their outboxes. A sink without its own limit uses `default_limit`.
    pub fn instantiate(
        &self,
        contexts: &mut [&mut Context<i64>],
        execution: ExecutionId,
        default_limit: Option<usize>,
    ) -> Result<Instance> {
        self.validate()?;
        if contexts.is_empty() {
            return Err(DslError::Invalid("no context to place nodes on".into()));
        }
        let width = contexts.len();

        let mut refs: HashMap<&str, NodeRef> = HashMap::new();
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut root = None;
        for (i, def) in self.nodes.iter().enumerate() {
            let inputs = def
                .inputs
                .iter()
                .map(|id| {
                    refs.get(id.as_str())
                        .copied()
                        .ok_or_else(|| DslError::UnknownNode(id.clone()))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut b = contexts[i % width].builder(execution);
            let node = match &def.op {
                Op::Sink { limit } => {
                    let (node, answers) = b.sink(inputs[0], limit.or(default_limit));
                    root = Some((node, answers));
                    node
                }
                op => wire(&mut b, op, &inputs)?,
            };
            refs.insert(def.id.as_str(), node);
            nodes.push((def.id.clone(), node));
        }

        let (root, answers) =
            root.ok_or_else(|| DslError::Invalid("pipeline has no sink".into()))?;
        Ok(Instance {
            execution,
            root,
            answers,
            nodes,
        })
    }
}

fn wire(b: &mut Builder<'_, i64>, op: &Op, inputs: &[NodeRef]) -> Result<NodeRef> {
    let node = match op {
        Op::Source { values, cycle } => {
            let values = values.clone();
            if *cycle {
                b.source(values.into_iter().cycle())
            } else {
                b.source(values)
            }
        }
        Op::Map { add, mul } => {
            let add = add.unwrap_or(0);
            let mul = mul.unwrap_or(1);
            b.try_map(inputs[0], move |v: i64| {
                v.checked_mul(mul)
                    .and_then(|m| m.checked_add(add))
                    .ok_or_else(|| {
                        ReactiveError::Collaborator(format!("{v} * {mul} + {add} overflows i64"))
                    })
            })
        }
        Op::FlatMap { repeat } => {
            let n = *repeat;
            b.flat_map(inputs[0], move |v| std::iter::repeat(v).take(n))
        }
        Op::Buffer { prefetch } => b.buffer(inputs[0], *prefetch),
        Op::Dedup => b.dedup(inputs[0]),
        Op::FindFirst => b.find_first(inputs[0]),
        Op::FanOut => b.fan_out(inputs[0]),
        Op::FanIn => b.fan_in(inputs),
        Op::Compound {
            plan,
            tables,
            initial,
            merge,
        } => {
            let plan = Plan::new(plan.iter().map(String::as_str))?;
            b.compound(&plan, *initial, scan_tables(tables.clone()), fold(*merge))?
        }
        Op::Sink { limit } => b.sink(inputs[0], *limit).0,
    };
    Ok(node)
}

/// Each step is a scan of the table with the step's name.
fn scan_tables(tables: BTreeMap<String, Vec<i64>>) -> SpawnFn<i64> {
    spawn_fn(move |b: &mut Builder<'_, i64>, step: &StepId, _seed: &i64| {
        let rows = tables
            .get(step.as_str())
            .cloned()
            .ok_or_else(|| ReactiveError::Spawn {
                step: step.clone(),
                reason: "no such table".into(),
            })?;
        Ok(b.source(rows))
    })
}

fn fold(merge: Merge) -> MergeFn<i64> {
    merge_fn(move |acc: &i64, row: &i64| match merge {
        Merge::Sum => acc
            .checked_add(*row)
            .ok_or_else(|| ReactiveError::Merge(format!("{acc} + {row} overflows i64"))),
        Merge::Right => Ok(*row),
    })
}
