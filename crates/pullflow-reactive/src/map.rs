//! Map: 1:1 transform applied as packets pass through.

use std::marker::PhantomData;

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::{SingleProvider, SingleReceiver};
use crate::traits::{Reactive, ReactiveError};

pub struct Map<P, F> {
    f: F,
    provider: SingleProvider,
    receiver: SingleReceiver,
    _packet: PhantomData<fn(P) -> P>,
}

impl<P, F> Map<P, F>
where
    P: Packet,
    F: FnMut(P) -> Result<P, ReactiveError> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            provider: SingleProvider::new(),
            receiver: SingleReceiver::new(),
            _packet: PhantomData,
        }
    }
}

impl<P, F> Reactive<P> for Map<P, F>
where
    P: Packet,
    F: FnMut(P) -> Result<P, ReactiveError> + Send + 'static,
{
    fn name(&self) -> &'static str {
        "map"
    }

    fn publish_to(&mut self, receiver: NodeRef, _cx: &mut Cx<'_, P>) {
        self.receiver.add(receiver);
    }

    fn subscribe_to(&mut self, provider: NodeRef, _cx: &mut Cx<'_, P>) {
        self.provider.add(provider);
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receiver.record_pull(receiver);
        self.provider.pull(cx);
    }

    fn receive(
        &mut self,
        provider: NodeRef,
        packet: P,
        cx: &mut Cx<'_, P>,
    ) -> Result<(), ReactiveError> {
        self.provider.received(provider);
        if self.receiver.is_closed() {
            cx.monitor(MonitorEvent::Destroy);
            return Ok(());
        }
        let out = (self.f)(packet)?;
        self.receiver.send(out, cx);
        Ok(())
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        if self.receiver.close(receiver) {
            self.provider.close(cx);
        }
    }
}
