//! Shared helpers for the integration tests.
#![allow(dead_code)]

use pullflow_core::config::EngineConfig;
use pullflow_core::id::ExecutionId;
use pullflow_core::packet::Packet;
use pullflow_exec::{Engine, Resolution};
use pullflow_reactive::{AnswerHandle, Context};

/// Wire one execution across `contexts` fresh contexts and run it to idle.
pub fn run_with<P, F>(cfg: EngineConfig, contexts: usize, wire: F) -> Resolution<P>
where
    P: Packet,
    F: FnOnce(&mut [&mut Context<P>], ExecutionId) -> AnswerHandle<P>,
{
    let mut engine: Engine<P> = Engine::new(cfg).expect("valid config");
    let execution = engine.next_execution();
    for _ in 0..contexts {
        engine.scheduler_mut().add_context();
    }
    let answers = {
        let mut open: Vec<&mut Context<P>> = engine.scheduler_mut().contexts_mut().collect();
        wire(&mut open, execution)
    };
    engine.run(execution, &answers).expect("run succeeds")
}

pub fn run<P, F>(contexts: usize, wire: F) -> Resolution<P>
where
    P: Packet,
    F: FnOnce(&mut [&mut Context<P>], ExecutionId) -> AnswerHandle<P>,
{
    run_with(EngineConfig::default(), contexts, wire)
}

pub fn sorted<T: Ord + Clone>(items: &[T]) -> Vec<T> {
    let mut out = items.to_vec();
    out.sort();
    out
}

/// First occurrence of every value, in input order.
pub fn distinct<T: Eq + std::hash::Hash + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .filter(|v| seen.insert((*v).clone()))
        .cloned()
        .collect()
}
