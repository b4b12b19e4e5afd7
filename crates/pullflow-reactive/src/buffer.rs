//! Buffer: decouples upstream delivery timing from downstream pulls.
//!
//! Packets that arrive while nobody downstream is pulling go on a stack and
//! are handed out most-recent-first. With `prefetch > 0` the buffer also
//! pulls upstream on its own whenever the stack is shallower than that depth.

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::{SingleProvider, SingleReceiver};
use crate::traits::{Reactive, ReactiveError};

pub struct Buffer<P> {
    stack: Vec<P>,
    prefetch: usize,
    provider: SingleProvider,
    receiver: SingleReceiver,
}

impl<P: Packet> Buffer<P> {
    pub fn new() -> Self {
        Self::with_prefetch(0)
    }

    pub fn with_prefetch(prefetch: usize) -> Self {
        Self {
            stack: Vec::new(),
            prefetch,
            provider: SingleProvider::new(),
            receiver: SingleReceiver::new(),
        }
    }

    pub fn buffered(&self) -> usize {
        self.stack.len()
    }

    fn top_up(&mut self, cx: &mut Cx<'_, P>) {
        if self.stack.len() < self.prefetch {
            self.provider.pull(cx);
        }
    }
}

impl<P: Packet> Default for Buffer<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Packet> Reactive<P> for Buffer<P> {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn publish_to(&mut self, receiver: NodeRef, _cx: &mut Cx<'_, P>) {
        self.receiver.add(receiver);
    }

    fn subscribe_to(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>) {
        self.provider.add(provider);
        self.top_up(cx);
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receiver.record_pull(receiver);
        match self.stack.pop() {
            Some(packet) => self.receiver.send(packet, cx),
            None => {
                self.provider.pull(cx);
            }
        }
        self.top_up(cx);
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
        } else if self.receiver.is_pulling() {
            self.receiver.send(packet, cx);
        } else {
            self.stack.push(packet);
        }
        self.top_up(cx);
        Ok(())
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        if !self.receiver.close(receiver) {
            return;
        }
        for _ in self.stack.drain(..) {
            cx.monitor(MonitorEvent::Destroy);
        }
        self.provider.close(cx);
    }
}
