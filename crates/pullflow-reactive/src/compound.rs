//! Compound: a multi-step plan executed as a streaming nested-loop join.
//!
//! The leading sub-pipeline runs the first step seeded with the initial
//! packet. Each leading answer is merged with the initial packet; if steps
//! remain, it seeds a follower. A leaf follower runs the one remaining step
//! and its answers are merged with that seed. A nested compound runs the rest
//! of the plan from the seed, so its answers are already fully chained and
//! pass through as they are. Only fully chained packets ever leave the
//! operator.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;
use pullflow_core::plan::Plan;

use crate::context::Cx;
use crate::registry::{MultiProvider, SingleReceiver};
use crate::traits::{MergeFn, Reactive, ReactiveError, SpawnFn};

enum Follower<P> {
    /// Answers are merged with this seed.
    Leaf(P),
    /// Answers already carry the seed.
    Nested,
}

pub struct Compound<P: Packet> {
    remaining: Option<Plan>,
    initial: P,
    leading: NodeRef,
    spawn: SpawnFn<P>,
    merge: MergeFn<P>,
    followers: HashMap<NodeRef, Follower<P>>,
    pool: VecDeque<P>,
    providers: MultiProvider,
    receiver: SingleReceiver,
}

impl<P: Packet> Compound<P> {
    /// `leading` must already be built for the first plan step; `remaining`
    /// is the rest of the plan, `None` when the first step is the last.
    pub fn new(
        remaining: Option<Plan>,
        initial: P,
        leading: NodeRef,
        spawn: SpawnFn<P>,
        merge: MergeFn<P>,
    ) -> Self {
        let mut providers = MultiProvider::new();
        providers.add(leading);
        Self {
            remaining,
            initial,
            leading,
            spawn,
            merge,
            followers: HashMap::new(),
            pool: VecDeque::new(),
            providers,
            receiver: SingleReceiver::new(),
        }
    }

    fn emit(&mut self, packet: P, cx: &mut Cx<'_, P>) {
        if self.receiver.is_pulling() {
            self.receiver.send(packet, cx);
        } else {
            self.pool.push_back(packet);
        }
    }

    fn on_leading(&mut self, packet: P, cx: &mut Cx<'_, P>) -> Result<(), ReactiveError> {
        let merged = (self.merge)(&self.initial, &packet)?;
        let rest = match &self.remaining {
            None => {
                self.emit(merged, cx);
                return Ok(());
            }
            Some(rest) => rest.clone(),
        };

        let spawn = Arc::clone(&self.spawn);
        let (follower, kind) = {
            let mut b = cx.builder();
            match rest.rest() {
                None => {
                    let step = rest.first().ok_or(ReactiveError::EmptyPlan)?;
                    (spawn(&mut b, step, &merged)?, Follower::Leaf(merged))
                }
                Some(_) => {
                    let nested = b.compound(&rest, merged, spawn, Arc::clone(&self.merge))?;
                    (nested, Follower::Nested)
                }
            }
        };
        let me = cx.me();
        cx.builder().attach(follower, me);
        self.providers.add(follower);
        self.followers.insert(follower, kind);

        // One leading answer became a follower search of its own.
        cx.monitor(MonitorEvent::Fork { n: 1 });
        cx.monitor(MonitorEvent::Destroy);

        if self.receiver.is_pulling() {
            self.providers.pull(follower, cx);
            self.providers.pull(self.leading, cx);
            cx.retry_later(self.leading);
        }
        Ok(())
    }
}

impl<P: Packet> Reactive<P> for Compound<P> {
    fn name(&self) -> &'static str {
        "compound"
    }

    fn publish_to(&mut self, receiver: NodeRef, _cx: &mut Cx<'_, P>) {
        self.receiver.add(receiver);
    }

    fn subscribe_to(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>) {
        panic!(
            "compound {} wires its own providers; got {provider}",
            cx.me()
        );
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receiver.record_pull(receiver);
        match self.pool.pop_front() {
            Some(packet) => self.receiver.send(packet, cx),
            None => {
                self.providers.pull_all(cx);
            }
        }
    }

    fn receive(
        &mut self,
        provider: NodeRef,
        packet: P,
        cx: &mut Cx<'_, P>,
    ) -> Result<(), ReactiveError> {
        self.providers.received(provider);
        if self.receiver.is_closed() {
            cx.monitor(MonitorEvent::Destroy);
            return Ok(());
        }
        if provider == self.leading {
            return self.on_leading(packet, cx);
        }
        let out = match self.followers.get(&provider) {
            Some(Follower::Leaf(seed)) => (self.merge)(seed, &packet)?,
            Some(Follower::Nested) => packet,
            None => {
                return Err(ReactiveError::Collaborator(format!(
                    "unknown follower {provider}"
                )))
            }
        };
        self.emit(out, cx);
        Ok(())
    }

    fn retry(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>) {
        if provider == self.leading && self.receiver.is_pulling() {
            self.providers.pull(self.leading, cx);
        }
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        if !self.receiver.close(receiver) {
            return;
        }
        for _ in self.pool.drain(..) {
            cx.monitor(MonitorEvent::Destroy);
        }
        self.providers.close_all(cx);
    }
}
