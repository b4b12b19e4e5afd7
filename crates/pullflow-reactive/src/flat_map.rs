//! FlatMap: 1:N transform.
//!
//! An expansion is handed out one element per pull: the first element goes
//! to the waiting receiver, the rest queue up (FIFO) and serve later pulls
//! before upstream is asked again. An empty expansion destroys the input and
//! re-pulls upstream so the receiver never sees the gap.

use std::collections::VecDeque;
use std::marker::PhantomData;

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::{SingleProvider, SingleReceiver};
use crate::traits::{Reactive, ReactiveError};

pub struct FlatMap<P, F> {
    f: F,
    queue: VecDeque<P>,
    provider: SingleProvider,
    receiver: SingleReceiver,
    _packet: PhantomData<fn(P) -> P>,
}

impl<P, F> FlatMap<P, F>
where
    P: Packet,
    F: FnMut(P) -> Result<Vec<P>, ReactiveError> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            queue: VecDeque::new(),
            provider: SingleProvider::new(),
            receiver: SingleReceiver::new(),
            _packet: PhantomData,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl<P, F> Reactive<P> for FlatMap<P, F>
where
    P: Packet,
    F: FnMut(P) -> Result<Vec<P>, ReactiveError> + Send + 'static,
{
    fn name(&self) -> &'static str {
        "flat_map"
    }

    fn publish_to(&mut self, receiver: NodeRef, _cx: &mut Cx<'_, P>) {
        self.receiver.add(receiver);
    }

    fn subscribe_to(&mut self, provider: NodeRef, _cx: &mut Cx<'_, P>) {
        self.provider.add(provider);
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receiver.record_pull(receiver);
        match self.queue.pop_front() {
            Some(packet) => self.receiver.send(packet, cx),
            None => {
                self.provider.pull(cx);
            }
        }
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

        let mut out = out.into_iter();
        let first = match out.next() {
            Some(first) => first,
            None => {
                cx.monitor(MonitorEvent::Destroy);
                if self.receiver.is_pulling() {
                    self.provider.pull(cx);
                }
                return Ok(());
            }
        };

        let before = self.queue.len();
        self.queue.extend(out);
        let extra = self.queue.len() - before;
        if extra > 0 {
            cx.monitor(MonitorEvent::Create { n: extra as u64 });
        }
        self.receiver.send(first, cx);
        Ok(())
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        if !self.receiver.close(receiver) {
            return;
        }
        for _ in self.queue.drain(..) {
            cx.monitor(MonitorEvent::Destroy);
        }
        self.provider.close(cx);
    }
}
