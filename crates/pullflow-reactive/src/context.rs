//! Per-context node arena and trampoline.
//!
//! A `Context` is one sequential unit of execution. It owns its nodes by id,
//! a FIFO of pending signals, a deferred queue for retries, and an ordered
//! outbox of everything that must leave the context: signals for nodes that
//! live elsewhere and monitor events. Dispatch takes a node out of the arena,
//! runs one trait method with a `Cx` that borrows the context, and puts the
//! node back, so a pull that triggers a delivery that triggers another pull is
//! three queue iterations rather than three nested calls.

use std::collections::{HashMap, HashSet, VecDeque};

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::{ContextId, ExecutionId, NodeId, NodeRef};
use pullflow_core::packet::Packet;
use pullflow_core::plan::Plan;

use crate::buffer::Buffer;
use crate::compound::Compound;
use crate::dedup::Deduplicate;
use crate::fan_in::FanIn;
use crate::fan_out::FanOut;
use crate::find_first::FindFirst;
use crate::flat_map::FlatMap;
use crate::map::Map;
use crate::sink::{AnswerHandle, Sink};
use crate::source::Source;
use crate::traits::{Envelope, MergeFn, Reactive, ReactiveError, Signal, SpawnFn};

/// A node retired because an injected function failed inside `receive`.
#[derive(Debug)]
pub struct NodeFailure {
    pub execution: ExecutionId,
    pub node: NodeRef,
    pub name: &'static str,
    pub error: ReactiveError,
}

/// Something that must leave the context, in emission order.
#[derive(Debug)]
pub enum Outbound<P> {
    Signal(Envelope<P>),
    Monitor {
        execution: ExecutionId,
        node: NodeRef,
        event: MonitorEvent,
    },
}

struct Slot<P> {
    execution: ExecutionId,
    /// `None` while the node is being dispatched.
    node: Option<Box<dyn Reactive<P>>>,
}

pub struct Context<P: Packet> {
    id: ContextId,
    next_node: u64,
    slots: HashMap<NodeId, Slot<P>>,
    retired: HashSet<NodeId>,
    queue: VecDeque<Envelope<P>>,
    deferred: VecDeque<Envelope<P>>,
    outbox: VecDeque<Outbound<P>>,
    failures: Vec<NodeFailure>,
    steps: u64,
    dropped: u64,
}

impl<P: Packet> Context<P> {
    pub fn new(id: ContextId) -> Self {
        Self {
            id,
            next_node: 0,
            slots: HashMap::new(),
            retired: HashSet::new(),
            queue: VecDeque::new(),
            deferred: VecDeque::new(),
            outbox: VecDeque::new(),
            failures: Vec::new(),
            steps: 0,
            dropped: 0,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Builder that adds nodes for `execution` to this context.
    pub fn builder(&mut self, execution: ExecutionId) -> Builder<'_, P> {
        Builder {
            ctx: self,
            execution,
        }
    }

    /// Accept a signal routed here from another context.
    pub fn enqueue(&mut self, env: Envelope<P>) {
        assert!(
            env.target.is_local_to(self.id),
            "signal for {} routed to context {}",
            env.target,
            self.id
        );
        self.queue.push_back(env);
    }

    pub fn has_work(&self) -> bool {
        !self.queue.is_empty() || !self.deferred.is_empty()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Live nodes (retired ones excluded).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        node.is_local_to(self.id) && self.slots.contains_key(&node.node)
    }

    pub fn node_name(&self, node: NodeRef) -> Option<&'static str> {
        if !node.is_local_to(self.id) {
            return None;
        }
        self.slots
            .get(&node.node)
            .and_then(|slot| slot.node.as_ref())
            .map(|n| n.name())
    }

    /// Signals dispatched so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Signals dropped because their target had been retired.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Dispatch up to `budget` signals. Deferred signals only run once the
    /// main queue is empty. Returns the number dispatched.
    pub fn run_turn(&mut self, budget: usize) -> usize {
        let mut done = 0;
        while done < budget {
            let env = match self.queue.pop_front() {
                Some(env) => env,
                None => match self.deferred.pop_front() {
                    Some(env) => env,
                    None => break,
                },
            };
            self.dispatch(env);
            done += 1;
        }
        done
    }

    /// Everything emitted since the last call, in emission order.
    pub fn take_outbox(&mut self) -> VecDeque<Outbound<P>> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_failures(&mut self) -> Vec<NodeFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Remove a node; signals that still reach it are dropped.
    pub fn retire(&mut self, node: NodeRef) {
        if node.is_local_to(self.id) && self.slots.remove(&node.node).is_some() {
            self.retired.insert(node.node);
        }
    }

    fn route(&mut self, env: Envelope<P>) {
        if env.target.is_local_to(self.id) {
            self.queue.push_back(env);
        } else {
            self.outbox.push_back(Outbound::Signal(env));
        }
    }

    fn emit(&mut self, execution: ExecutionId, node: NodeRef, event: MonitorEvent) {
        self.outbox.push_back(Outbound::Monitor {
            execution,
            node,
            event,
        });
    }

    fn insert(&mut self, execution: ExecutionId, node: Box<dyn Reactive<P>>) -> NodeRef {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        self.slots.insert(
            id,
            Slot {
                execution,
                node: Some(node),
            },
        );
        NodeRef::new(self.id, id)
    }

    /// Wiring path: run the signal right away when the target is local and
    /// idle, otherwise queue it like any other signal.
    fn deliver_now(&mut self, env: Envelope<P>) {
        let idle = env.target.is_local_to(self.id)
            && self
                .slots
                .get(&env.target.node)
                .map_or(false, |slot| slot.node.is_some());
        if idle {
            self.dispatch(env);
        } else {
            self.route(env);
        }
    }

    fn dispatch(&mut self, env: Envelope<P>) {
        let Envelope { target, signal } = env;
        let (execution, mut node) = match self.slots.get_mut(&target.node) {
            Some(slot) => match slot.node.take() {
                Some(node) => (slot.execution, node),
                None => panic!(
                    "{} signal reached node {} while it was already running",
                    signal.kind(),
                    target
                ),
            },
            None if self.retired.contains(&target.node) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%target, signal = signal.kind(), "dropping signal for retired node");
                self.dropped += 1;
                return;
            }
            None => panic!("{} signal for unknown node {}", signal.kind(), target),
        };

        self.steps += 1;
        #[cfg(feature = "tracing")]
        tracing::trace!(%target, signal = signal.kind(), node = node.name(), "dispatch");

        let outcome = {
            let mut cx = Cx {
                ctx: &mut *self,
                me: target,
                execution,
            };
            match signal {
                Signal::Pull { receiver } => {
                    node.pull(receiver, &mut cx);
                    Ok(())
                }
                Signal::Receive { provider, packet } => node.receive(provider, packet, &mut cx),
                Signal::PublishTo { receiver } => {
                    node.publish_to(receiver, &mut cx);
                    Ok(())
                }
                Signal::SubscribeTo { provider } => {
                    node.subscribe_to(provider, &mut cx);
                    Ok(())
                }
                Signal::Finalize => {
                    node.finalize(&mut cx);
                    Ok(())
                }
                Signal::Retry { provider } => {
                    node.retry(provider, &mut cx);
                    Ok(())
                }
                Signal::Close { receiver } => {
                    node.close(receiver, &mut cx);
                    Ok(())
                }
            }
        };

        match outcome {
            Ok(()) => {
                if let Some(slot) = self.slots.get_mut(&target.node) {
                    slot.node = Some(node);
                }
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(%target, node = node.name(), %error, "node failed; retiring it");
                // The packet that was being received dies with the node.
                self.emit(execution, target, MonitorEvent::Destroy);
                self.slots.remove(&target.node);
                self.retired.insert(target.node);
                self.failures.push(NodeFailure {
                    execution,
                    node: target,
                    name: node.name(),
                    error,
                });
            }
        }
    }
}

/// Handle a node uses to act on the world while one of its methods runs.
pub struct Cx<'a, P: Packet> {
    ctx: &'a mut Context<P>,
    me: NodeRef,
    execution: ExecutionId,
}

impl<'a, P: Packet> Cx<'a, P> {
    #[cfg(test)]
    pub(crate) fn for_node(ctx: &'a mut Context<P>, me: NodeRef, execution: ExecutionId) -> Self {
        Self { ctx, me, execution }
    }

    pub fn me(&self) -> NodeRef {
        self.me
    }

    pub fn execution(&self) -> ExecutionId {
        self.execution
    }

    /// Ask `provider` for its next packet.
    pub fn pull(&mut self, provider: NodeRef) {
        let me = self.me;
        self.ctx
            .route(Envelope::new(provider, Signal::Pull { receiver: me }));
    }

    /// Deliver `packet` to `receiver`.
    pub fn send(&mut self, receiver: NodeRef, packet: P) {
        let me = self.me;
        self.ctx.route(Envelope::new(
            receiver,
            Signal::Receive {
                provider: me,
                packet,
            },
        ));
    }

    /// Tell `provider` this node will never pull it again.
    pub fn close(&mut self, provider: NodeRef) {
        let me = self.me;
        self.ctx
            .route(Envelope::new(provider, Signal::Close { receiver: me }));
    }

    /// Run `retry(provider)` on this node once the context is otherwise idle.
    pub fn retry_later(&mut self, provider: NodeRef) {
        let me = self.me;
        self.ctx
            .deferred
            .push_back(Envelope::new(me, Signal::Retry { provider }));
    }

    pub fn monitor(&mut self, event: MonitorEvent) {
        self.ctx.emit(self.execution, self.me, event);
    }

    /// Build further nodes in this context, for the same execution.
    pub fn builder(&mut self) -> Builder<'_, P> {
        Builder {
            ctx: &mut *self.ctx,
            execution: self.execution,
        }
    }
}

/// Adds nodes to a context and wires them together.
///
/// Wiring signals whose target is local and idle run immediately, so the
/// topology events they report reach the outbox in build order.
pub struct Builder<'a, P: Packet> {
    ctx: &'a mut Context<P>,
    execution: ExecutionId,
}

impl<'a, P: Packet> Builder<'a, P> {
    pub fn context(&self) -> ContextId {
        self.ctx.id
    }

    pub fn execution(&self) -> ExecutionId {
        self.execution
    }

    pub fn add<R: Reactive<P> + 'static>(&mut self, node: R) -> NodeRef {
        self.add_boxed(Box::new(node))
    }

    pub fn add_boxed(&mut self, node: Box<dyn Reactive<P>>) -> NodeRef {
        self.ctx.insert(self.execution, node)
    }

    /// Tell `provider` about `receiver`, then `receiver` about `provider`.
    pub fn connect(&mut self, provider: NodeRef, receiver: NodeRef) {
        self.attach(provider, receiver);
        self.ctx
            .deliver_now(Envelope::new(receiver, Signal::SubscribeTo { provider }));
    }

    /// One-sided wiring for receivers that register the provider themselves.
    pub fn attach(&mut self, provider: NodeRef, receiver: NodeRef) {
        self.ctx
            .deliver_now(Envelope::new(provider, Signal::PublishTo { receiver }));
    }

    pub fn finalize(&mut self, node: NodeRef) {
        self.ctx.deliver_now(Envelope::new(node, Signal::Finalize));
    }

    /// Leaf publisher over any iterator, finite or not.
    pub fn source<I>(&mut self, items: I) -> NodeRef
    where
        I: IntoIterator<Item = P>,
        I::IntoIter: Send + 'static,
    {
        self.add(Source::new(items))
    }

    pub fn map<F>(&mut self, upstream: NodeRef, mut f: F) -> NodeRef
    where
        F: FnMut(P) -> P + Send + 'static,
    {
        self.try_map(upstream, move |p| Ok(f(p)))
    }

    pub fn try_map<F>(&mut self, upstream: NodeRef, f: F) -> NodeRef
    where
        F: FnMut(P) -> Result<P, ReactiveError> + Send + 'static,
    {
        let id = self.add(Map::new(f));
        self.connect(upstream, id);
        id
    }

    pub fn flat_map<F, I>(&mut self, upstream: NodeRef, mut f: F) -> NodeRef
    where
        F: FnMut(P) -> I + Send + 'static,
        I: IntoIterator<Item = P>,
    {
        self.try_flat_map(upstream, move |p| Ok(f(p).into_iter().collect()))
    }

    pub fn try_flat_map<F>(&mut self, upstream: NodeRef, f: F) -> NodeRef
    where
        F: FnMut(P) -> Result<Vec<P>, ReactiveError> + Send + 'static,
    {
        let id = self.add(FlatMap::new(f));
        self.connect(upstream, id);
        id
    }

    pub fn buffer(&mut self, upstream: NodeRef, prefetch: usize) -> NodeRef {
        let id = self.add(Buffer::with_prefetch(prefetch));
        self.connect(upstream, id);
        id
    }

    pub fn dedup(&mut self, upstream: NodeRef) -> NodeRef {
        let id = self.add(Deduplicate::new());
        self.connect(upstream, id);
        id
    }

    pub fn find_first(&mut self, upstream: NodeRef) -> NodeRef {
        let id = self.add(FindFirst::new());
        self.connect(upstream, id);
        id
    }

    /// Every receiver attached to the result must be pulled by something
    /// downstream of the root; an abandoned branch keeps its path open.
    pub fn fan_out(&mut self, upstream: NodeRef) -> NodeRef {
        let id = self.add(FanOut::new());
        self.connect(upstream, id);
        id
    }

    /// Merge `providers`, then finalize so the monitor learns the fork width.
    pub fn fan_in(&mut self, providers: &[NodeRef]) -> NodeRef {
        let id = self.add(FanIn::new());
        for &provider in providers {
            self.connect(provider, id);
        }
        self.finalize(id);
        id
    }

    /// Streaming join over `plan`, seeded with `initial`. The leading
    /// sub-pipeline is spawned right away.
    pub fn compound(
        &mut self,
        plan: &Plan,
        initial: P,
        spawn: SpawnFn<P>,
        merge: MergeFn<P>,
    ) -> Result<NodeRef, ReactiveError> {
        let first = plan.first().ok_or(ReactiveError::EmptyPlan)?;
        let leading = spawn(self, first, &initial)?;
        let id = self.add(Compound::new(plan.rest(), initial, leading, spawn, merge));
        self.attach(leading, id);
        Ok(id)
    }

    /// Terminal consumer; registers itself as the execution root.
    pub fn sink(&mut self, upstream: NodeRef, limit: Option<usize>) -> (NodeRef, AnswerHandle<P>) {
        let answers = AnswerHandle::new();
        let id = self.add(Sink::new(answers.clone(), limit));
        self.connect(upstream, id);
        (id, answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXEC: ExecutionId = ExecutionId::new(7);

    fn events(outbox: VecDeque<Outbound<u32>>) -> Vec<MonitorEvent> {
        outbox
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Monitor { event, .. } => Some(event),
                Outbound::Signal(_) => None,
            })
            .collect()
    }

    #[test]
    fn long_map_chain_runs_without_recursion() {
        let mut ctx = Context::<u32>::new(ContextId::new(0));
        let mut b = ctx.builder(EXEC);
        let mut tail = b.source(0..3);
        for _ in 0..10_000 {
            tail = b.map(tail, |x| x + 1);
        }
        let (_, answers) = b.sink(tail, None);

        while ctx.has_work() {
            ctx.run_turn(4096);
        }
        assert_eq!(answers.snapshot(), vec![10_000, 10_001, 10_002]);
    }

    #[test]
    fn failing_node_is_retired_and_reported() {
        let mut ctx = Context::<u32>::new(ContextId::new(0));
        let mut b = ctx.builder(EXEC);
        let src = b.source([1, 2]);
        let bad = b.try_map(src, |_| Err(ReactiveError::Collaborator("boom".into())));
        let (_, answers) = b.sink(bad, None);

        while ctx.has_work() {
            ctx.run_turn(16);
        }
        assert!(answers.is_empty());

        let failures = ctx.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].node, bad);
        assert_eq!(failures[0].name, "map");
        assert!(!ctx.contains(bad));

        let ev = events(ctx.take_outbox());
        // create for the packet, destroy when the map died with it
        assert_eq!(
            ev,
            vec![
                MonitorEvent::RegisterRoot,
                MonitorEvent::Create { n: 1 },
                MonitorEvent::Destroy,
            ]
        );
    }

    #[test]
    fn remote_targets_go_to_the_outbox() {
        let mut ctx = Context::<u32>::new(ContextId::new(0));
        let remote = NodeRef::new(ContextId::new(1), NodeId::new(0));
        let mut b = ctx.builder(EXEC);
        let (sink, _) = b.sink(remote, None);

        let out: Vec<_> = ctx.take_outbox().into_iter().collect();
        assert!(matches!(
            &out[0],
            Outbound::Signal(Envelope { target, signal: Signal::PublishTo { receiver } })
                if *target == remote && *receiver == sink
        ));
        assert!(matches!(
            &out[1],
            Outbound::Monitor { event: MonitorEvent::RegisterRoot, .. }
        ));
        assert!(matches!(
            &out[2],
            Outbound::Signal(Envelope { signal: Signal::Pull { .. }, .. })
        ));
    }

    #[test]
    fn retries_wait_for_an_empty_queue() {
        let mut ctx = Context::<u32>::new(ContextId::new(0));
        let mut b = ctx.builder(EXEC);
        let src = b.source(std::iter::empty());
        let (sink, _) = b.sink(src, None);
        ctx.deferred
            .push_back(Envelope::new(sink, Signal::Retry { provider: src }));
        // pull to the source is queued ahead of the retry
        assert_eq!(ctx.run_turn(1), 1);
        assert_eq!(ctx.queue.len(), 0);
        assert_eq!(ctx.deferred.len(), 1);
        assert_eq!(ctx.run_turn(8), 1);
        assert!(!ctx.has_work());
    }
}
