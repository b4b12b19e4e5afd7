//! FindFirst: a one-shot latch for existence-style sub-queries.

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::{SingleProvider, SingleReceiver};
use crate::traits::{Reactive, ReactiveError};

/// Forwards the first packet it sees and nothing after it. Latching closes
/// the upstream link, so everything above finishes its open paths and drops
/// what it holds; packets that still turn up are destroyed. A close from
/// downstream latches it too.
pub struct FindFirst<P> {
    latched: bool,
    provider: SingleProvider,
    receiver: SingleReceiver,
    _packet: std::marker::PhantomData<fn(P)>,
}

impl<P: Packet> FindFirst<P> {
    pub fn new() -> Self {
        Self {
            latched: false,
            provider: SingleProvider::new(),
            receiver: SingleReceiver::new(),
            _packet: std::marker::PhantomData,
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }
}

impl<P: Packet> Default for FindFirst<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Packet> Reactive<P> for FindFirst<P> {
    fn name(&self) -> &'static str {
        "find_first"
    }

    fn publish_to(&mut self, receiver: NodeRef, _cx: &mut Cx<'_, P>) {
        self.receiver.add(receiver);
    }

    fn subscribe_to(&mut self, provider: NodeRef, _cx: &mut Cx<'_, P>) {
        self.provider.add(provider);
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receiver.record_pull(receiver);
        if !self.latched {
            self.provider.pull(cx);
        }
    }

    fn receive(
        &mut self,
        provider: NodeRef,
        packet: P,
        cx: &mut Cx<'_, P>,
    ) -> Result<(), ReactiveError> {
        if self.latched {
            cx.monitor(MonitorEvent::Destroy);
            return Ok(());
        }
        self.provider.received(provider);
        self.latched = true;
        self.receiver.send(packet, cx);
        self.provider.close(cx);
        Ok(())
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receiver.close(receiver);
        self.latched = true;
        self.provider.close(cx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, EXEC};
    use crate::traits::{Envelope, Signal};
    use pullflow_core::id::{ContextId, NodeId};

    #[test]
    fn only_the_first_answer_gets_through() {
        let mut ctx = testing::context::<u8>();
        let mut b = ctx.builder(EXEC);
        let src = b.source([9, 8, 7]);
        let ff = b.find_first(src);
        let (_, answers) = b.sink(ff, None);
        let events = testing::run(&mut ctx);

        assert_eq!(answers.snapshot(), vec![9]);
        assert!(testing::from(&events, ff).is_empty());
        // the sink's second pull parks on the latch; the source is closed
        assert_eq!(
            testing::from(&events, src),
            vec![MonitorEvent::Create { n: 1 }, MonitorEvent::Finish]
        );
        assert_eq!(testing::balance(&events), 0);
    }

    #[test]
    fn late_arrivals_are_destroyed() {
        let mut ctx = testing::context::<u8>();
        let upstream = NodeRef::new(ContextId::new(5), NodeId::new(0));
        let mut b = ctx.builder(EXEC);
        let ff = b.add(FindFirst::new());
        b.connect(upstream, ff);
        let (_, answers) = b.sink(ff, None);
        testing::run(&mut ctx);

        for packet in [1, 2, 3] {
            ctx.enqueue(Envelope::new(
                ff,
                Signal::Receive {
                    provider: upstream,
                    packet,
                },
            ));
        }
        let events = testing::run(&mut ctx);

        assert_eq!(answers.snapshot(), vec![1]);
        assert_eq!(
            testing::from(&events, ff),
            vec![MonitorEvent::Destroy, MonitorEvent::Destroy]
        );
    }

    #[test]
    fn close_from_downstream_latches_and_closes_upstream() {
        let (mut ctx, me) = testing::harness::<u8>();
        let (up, down) = (testing::remote(0), testing::remote(1));
        let mut ff = FindFirst::new();
        let mut cx = Cx::for_node(&mut ctx, me, EXEC);
        ff.publish_to(down, &mut cx);
        ff.subscribe_to(up, &mut cx);
        ff.pull(down, &mut cx);
        assert!(!ff.is_latched());

        ff.close(down, &mut cx);
        assert!(ff.is_latched());
        // the pull sent earlier is still answered, then dropped
        ff.receive(up, 3, &mut cx).unwrap();

        let (events, signals) = testing::outbound(&mut ctx);
        assert_eq!(testing::from(&events, me), vec![MonitorEvent::Destroy]);
        assert_eq!(signals, vec![(up, "pull"), (up, "close")]);
    }
}
