//! Fan-in: merge many providers into one receiver.

use std::collections::VecDeque;

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::{MultiProvider, SingleReceiver};
use crate::traits::{Reactive, ReactiveError};

/// A pull fans out to every idle provider; whichever answers first takes the
/// receiver's slot and the rest wait in a pool for later pulls. No ordering
/// across providers, no deduplication.
///
/// `finalize` reports the fork width once the initial providers are known;
/// providers added after that fork one path each. Closing it destroys the
/// pool and closes every provider, including ones that attach later.
pub struct FanIn<P> {
    pool: VecDeque<P>,
    finalized: bool,
    providers: MultiProvider,
    receiver: SingleReceiver,
}

impl<P: Packet> FanIn<P> {
    pub fn new() -> Self {
        Self {
            pool: VecDeque::new(),
            finalized: false,
            providers: MultiProvider::new(),
            receiver: SingleReceiver::new(),
        }
    }

    pub fn providers(&self) -> usize {
        self.providers.len()
    }

    pub fn pooled(&self) -> usize {
        self.pool.len()
    }
}

impl<P: Packet> Default for FanIn<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Packet> Reactive<P> for FanIn<P> {
    fn name(&self) -> &'static str {
        "fan_in"
    }

    fn publish_to(&mut self, receiver: NodeRef, _cx: &mut Cx<'_, P>) {
        self.receiver.add(receiver);
    }

    fn subscribe_to(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>) {
        if !self.providers.add(provider) || !self.finalized {
            return;
        }
        cx.monitor(MonitorEvent::Fork { n: 1 });
        if self.receiver.is_closed() {
            self.providers.close_all(cx);
        } else if self.receiver.is_pulling() && self.pool.is_empty() {
            self.providers.pull(provider, cx);
        }
    }

    fn finalize(&mut self, cx: &mut Cx<'_, P>) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        match self.providers.len() {
            // No provider will ever answer; the path ends here.
            0 => cx.monitor(MonitorEvent::Join),
            1 => {}
            n => cx.monitor(MonitorEvent::Fork { n: n as u64 - 1 }),
        }
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
        } else if self.receiver.is_pulling() {
            self.receiver.send(packet, cx);
        } else {
            self.pool.push_back(packet);
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, EXEC};

    #[test]
    fn merges_every_provider() {
        let mut ctx = testing::context::<u32>();
        let mut b = ctx.builder(EXEC);
        let a = b.source([1, 2]);
        let c = b.source([10, 20, 30]);
        let fi = b.fan_in(&[a, c]);
        let (_, answers) = b.sink(fi, None);
        let events = testing::run(&mut ctx);

        let mut got = answers.snapshot();
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 10, 20, 30]);
        assert_eq!(testing::from(&events, fi), vec![MonitorEvent::Fork { n: 1 }]);
        assert_eq!(testing::balance(&events), 0);
    }

    #[test]
    fn empty_fan_in_closes_its_path() {
        let mut ctx = testing::context::<u32>();
        let mut b = ctx.builder(EXEC);
        let fi = b.fan_in(&[]);
        let (_, answers) = b.sink(fi, None);
        let events = testing::run(&mut ctx);

        assert!(answers.is_empty());
        assert_eq!(testing::from(&events, fi), vec![MonitorEvent::Join]);
    }

    #[test]
    fn late_provider_forks_one_path() {
        let mut ctx = testing::context::<u32>();
        let mut b = ctx.builder(EXEC);
        let a = b.source([1]);
        let fi = b.fan_in(&[a]);
        let (_, answers) = b.sink(fi, None);
        testing::run(&mut ctx);

        let mut b = ctx.builder(EXEC);
        let late = b.source([5, 6]);
        b.connect(late, fi);
        let events = testing::run(&mut ctx);

        assert_eq!(answers.snapshot(), vec![1, 5, 6]);
        assert_eq!(testing::from(&events, fi), vec![MonitorEvent::Fork { n: 1 }]);
    }

    #[test]
    fn close_drains_the_pool_and_every_provider() {
        let (mut ctx, me) = testing::harness::<u32>();
        let (a, c, late, down) = (
            testing::remote(0),
            testing::remote(1),
            testing::remote(2),
            testing::remote(3),
        );
        let mut fi = FanIn::new();
        let mut cx = Cx::for_node(&mut ctx, me, EXEC);
        fi.publish_to(down, &mut cx);
        fi.subscribe_to(a, &mut cx);
        fi.subscribe_to(c, &mut cx);
        fi.finalize(&mut cx);

        fi.pull(down, &mut cx);
        fi.receive(a, 1, &mut cx).unwrap();
        fi.receive(c, 2, &mut cx).unwrap();
        assert_eq!(fi.pooled(), 1);

        fi.close(down, &mut cx);
        assert_eq!(fi.pooled(), 0);
        fi.subscribe_to(late, &mut cx);
        assert_eq!(fi.providers(), 3);

        let (events, signals) = testing::outbound(&mut ctx);
        assert_eq!(
            testing::from(&events, me),
            vec![
                MonitorEvent::Fork { n: 1 },
                MonitorEvent::Destroy,
                MonitorEvent::Fork { n: 1 },
            ]
        );
        assert_eq!(
            signals,
            vec![
                (a, "pull"),
                (c, "pull"),
                (down, "receive"),
                (a, "close"),
                (c, "close"),
                (late, "close"),
            ]
        );
    }
}
