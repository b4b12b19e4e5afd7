//! Leaf publisher wrapping a scan iterator.

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::SingleReceiver;
use crate::traits::{Reactive, ReactiveError};

/// Each delivered packet is a new answer. Once the iterator runs dry, or the
/// receiver closes the link first, the source reports `Finish` a single time
/// and leaves any last pull unresolved.
pub struct Source<P> {
    items: Box<dyn Iterator<Item = P> + Send>,
    receiver: SingleReceiver,
    exhausted: bool,
}

impl<P: Packet> Source<P> {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = P>,
        I::IntoIter: Send + 'static,
    {
        Self {
            items: Box::new(items.into_iter()),
            receiver: SingleReceiver::new(),
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<P: Packet> Reactive<P> for Source<P> {
    fn name(&self) -> &'static str {
        "source"
    }

    fn publish_to(&mut self, receiver: NodeRef, _cx: &mut Cx<'_, P>) {
        self.receiver.add(receiver);
    }

    fn subscribe_to(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>) {
        panic!("source {} cannot subscribe to {provider}", cx.me());
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receiver.record_pull(receiver);
        if self.exhausted {
            return;
        }
        match self.items.next() {
            Some(packet) => {
                cx.monitor(MonitorEvent::Create { n: 1 });
                self.receiver.send(packet, cx);
            }
            None => {
                self.exhausted = true;
                cx.monitor(MonitorEvent::Finish);
            }
        }
    }

    fn receive(
        &mut self,
        provider: NodeRef,
        _packet: P,
        cx: &mut Cx<'_, P>,
    ) -> Result<(), ReactiveError> {
        panic!("source {} got a packet from {provider}", cx.me());
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        if self.receiver.close(receiver) && !self.exhausted {
            self.exhausted = true;
            cx.monitor(MonitorEvent::Finish);
        }
    }
}
