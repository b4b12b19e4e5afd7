//! Fan-out: broadcast one upstream to many receivers, with replay.
//!
//! Every distinct packet is kept in arrival order. Each receiver has a cursor
//! into that log; a receiver that is behind is served from the log without
//! touching upstream, one that is caught up waits for the next upstream
//! packet. Receivers can attach at any time and see the whole log.
//!
//! A receiver that closes its link loses the copies it had not read yet.
//! Upstream is closed with the last receiver; anyone attaching after that is
//! served from the log alone.

use std::collections::{BTreeMap, HashSet};

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::{MultiReceiver, SingleProvider};
use crate::traits::{Reactive, ReactiveError};

pub struct FanOut<P> {
    log: Vec<P>,
    seen: HashSet<P>,
    cursors: BTreeMap<NodeRef, usize>,
    provider: SingleProvider,
    receivers: MultiReceiver,
}

impl<P: Packet> FanOut<P> {
    pub fn new() -> Self {
        Self {
            log: Vec::new(),
            seen: HashSet::new(),
            cursors: BTreeMap::new(),
            provider: SingleProvider::new(),
            receivers: MultiReceiver::new(),
        }
    }

    /// Distinct packets received so far, in arrival order.
    pub fn log(&self) -> &[P] {
        &self.log
    }

    pub fn cursor(&self, receiver: NodeRef) -> Option<usize> {
        self.cursors.get(&receiver).copied()
    }
}

impl<P: Packet> Default for FanOut<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Packet> Reactive<P> for FanOut<P> {
    fn name(&self) -> &'static str {
        "fan_out"
    }

    fn publish_to(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        if !self.receivers.add(receiver) {
            return;
        }
        self.cursors.insert(receiver, 0);
        // The newcomer holds no copy of anything logged so far.
        if !self.log.is_empty() {
            cx.monitor(MonitorEvent::Create {
                n: self.log.len() as u64,
            });
        }
        if self.receivers.len() > 1 || self.provider.is_closed() {
            cx.monitor(MonitorEvent::Join);
        }
    }

    fn subscribe_to(&mut self, provider: NodeRef, _cx: &mut Cx<'_, P>) {
        self.provider.add(provider);
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        self.receivers.record_pull(receiver);
        let at = self.cursor(receiver).unwrap_or(self.log.len());
        if at < self.log.len() {
            self.cursors.insert(receiver, at + 1);
            let packet = self.log[at].clone();
            self.receivers.send(receiver, packet, cx);
        } else {
            self.provider.pull(cx);
        }
    }

    fn receive(
        &mut self,
        provider: NodeRef,
        packet: P,
        cx: &mut Cx<'_, P>,
    ) -> Result<(), ReactiveError> {
        self.provider.received(provider);

        if self.seen.contains(&packet) {
            cx.monitor(MonitorEvent::Destroy);
            if self.receivers.any_pulling() {
                self.provider.pull(cx);
            }
            return Ok(());
        }

        self.seen.insert(packet.clone());
        self.log.push(packet);
        match self.receivers.len() {
            // Nobody holds it yet; a later attach re-creates it.
            0 => cx.monitor(MonitorEvent::Destroy),
            1 => {}
            k => cx.monitor(MonitorEvent::Create { n: k as u64 - 1 }),
        }

        let at = self.log.len() - 1;
        for receiver in self.receivers.pulling() {
            if let Some(cursor) = self.cursors.get_mut(&receiver) {
                debug_assert_eq!(*cursor, at, "pulling receiver {receiver} was behind");
                *cursor = at + 1;
            }
            self.receivers.send(receiver, self.log[at].clone(), cx);
        }
        Ok(())
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        let cursor = self.cursors.remove(&receiver);
        if !self.receivers.remove(receiver) {
            return;
        }
        let unread = self.log.len() - cursor.unwrap_or(self.log.len());
        for _ in 0..unread {
            cx.monitor(MonitorEvent::Destroy);
        }
        if self.receivers.is_empty() {
            self.provider.close(cx);
        }
    }
}
