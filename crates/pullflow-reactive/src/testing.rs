//! Shared helpers for operator unit tests.

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::{ContextId, ExecutionId, NodeId, NodeRef};
use pullflow_core::packet::Packet;

use crate::context::{Context, Outbound};

pub(crate) const EXEC: ExecutionId = ExecutionId::new(1);

pub(crate) fn context<P: Packet>() -> Context<P> {
    Context::new(ContextId::new(0))
}

/// A context holding one inert node, for operators driven by hand through
/// `Cx::for_node`. Events they report carry the returned node ref.
pub(crate) fn harness<P: Packet>() -> (Context<P>, NodeRef) {
    let mut ctx = context();
    let me = ctx.builder(EXEC).source(std::iter::empty());
    (ctx, me)
}

/// A node in a context nobody runs; signals to it stay in the outbox.
pub(crate) fn remote(n: u64) -> NodeRef {
    NodeRef::new(ContextId::new(9), NodeId::new(n))
}

/// Drain the outbox without running anything: monitor events, and signals
/// as `(target, kind)`.
pub(crate) fn outbound<P: Packet>(
    ctx: &mut Context<P>,
) -> (Vec<(NodeRef, MonitorEvent)>, Vec<(NodeRef, &'static str)>) {
    let mut events = Vec::new();
    let mut signals = Vec::new();
    for out in ctx.take_outbox() {
        match out {
            Outbound::Monitor { node, event, .. } => events.push((node, event)),
            Outbound::Signal(env) => signals.push((env.target, env.signal.kind())),
        }
    }
    (events, signals)
}

/// Run the context dry and return every monitor event it emitted, including
/// the ones from building. Signals for other contexts are discarded.
pub(crate) fn run<P: Packet>(ctx: &mut Context<P>) -> Vec<(NodeRef, MonitorEvent)> {
    while ctx.has_work() {
        ctx.run_turn(64);
    }
    ctx.take_outbox()
        .into_iter()
        .filter_map(|out| match out {
            Outbound::Monitor { node, event, .. } => Some((node, event)),
            Outbound::Signal(_) => None,
        })
        .collect()
}

/// Events reported by one node.
pub(crate) fn from(events: &[(NodeRef, MonitorEvent)], node: NodeRef) -> Vec<MonitorEvent> {
    events
        .iter()
        .filter(|(n, _)| *n == node)
        .map(|(_, e)| *e)
        .collect()
}

/// Net answers: creates minus destroys.
pub(crate) fn balance(events: &[(NodeRef, MonitorEvent)]) -> i64 {
    events
        .iter()
        .map(|(_, e)| match e {
            MonitorEvent::Create { n } => *n as i64,
            MonitorEvent::Destroy => -1,
            _ => 0,
        })
        .sum()
}

/// Net demand paths: the root's, plus forks, minus joins and finishes.
pub(crate) fn open_paths(events: &[(NodeRef, MonitorEvent)]) -> i64 {
    events
        .iter()
        .map(|(_, e)| match e {
            MonitorEvent::RegisterRoot => 1,
            MonitorEvent::Fork { n } => *n as i64,
            MonitorEvent::Join | MonitorEvent::Finish => -1,
            _ => 0,
        })
        .sum()
}
