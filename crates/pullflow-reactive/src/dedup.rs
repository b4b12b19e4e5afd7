//! Deduplicate: forwards each distinct packet once.

use std::collections::HashSet;

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::{SingleProvider, SingleReceiver};
use crate::traits::{Reactive, ReactiveError};

pub struct Deduplicate<P> {
    seen: HashSet<P>,
    provider: SingleProvider,
    receiver: SingleReceiver,
}

impl<P: Packet> Deduplicate<P> {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            provider: SingleProvider::new(),
            receiver: SingleReceiver::new(),
        }
    }

    pub fn distinct(&self) -> usize {
        self.seen.len()
    }
}

impl<P: Packet> Default for Deduplicate<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Packet> Reactive<P> for Deduplicate<P> {
    fn name(&self) -> &'static str {
        "dedup"
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
        if self.seen.contains(&packet) {
            cx.monitor(MonitorEvent::Destroy);
            if self.receiver.is_pulling() {
                self.provider.pull(cx);
            }
        } else {
            self.seen.insert(packet.clone());
            self.receiver.send(packet, cx);
        }
        Ok(())
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        if self.receiver.close(receiver) {
            self.provider.close(cx);
        }
    }
}
