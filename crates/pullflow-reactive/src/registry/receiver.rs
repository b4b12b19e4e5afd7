use std::collections::BTreeMap;

use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;

/// Exactly one downstream link.
#[derive(Debug, Default)]
pub struct SingleReceiver {
    receiver: Option<NodeRef>,
    pulling: bool,
    closed: bool,
}

impl SingleReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, receiver: NodeRef) {
        match self.receiver {
            None => self.receiver = Some(receiver),
            Some(existing) => assert_eq!(
                existing, receiver,
                "single receiver slot already holds {existing}"
            ),
        }
    }

    pub fn receiver(&self) -> Option<NodeRef> {
        self.receiver
    }

    pub fn is_pulling(&self) -> bool {
        self.pulling
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Note a pull from `from`. A second pull before the first is resolved
    /// breaks backpressure and panics.
    pub fn record_pull(&mut self, from: NodeRef) {
        assert_eq!(
            self.receiver,
            Some(from),
            "pull from {from}, which is not the receiver"
        );
        assert!(!self.closed, "pull from {from} after it closed the link");
        assert!(!self.pulling, "second pull from {from} before the first was resolved");
        self.pulling = true;
    }

    /// Note that `from` will never pull again; any pull it left outstanding
    /// is dropped. Returns `false` if the link was already closed.
    pub fn close(&mut self, from: NodeRef) -> bool {
        assert_eq!(
            self.receiver,
            Some(from),
            "close from {from}, which is not the receiver"
        );
        self.pulling = false;
        !std::mem::replace(&mut self.closed, true)
    }

    /// Deliver to the receiver, resolving its pull.
    pub fn send<P: Packet>(&mut self, packet: P, cx: &mut Cx<'_, P>) {
        let receiver = match self.receiver {
            Some(r) if self.pulling => r,
            Some(r) => panic!("delivery to {r}, which is not pulling"),
            None => panic!("delivery with no receiver attached"),
        };
        self.pulling = false;
        cx.send(receiver, packet);
    }
}

/// Any number of downstream links, each with its own pulling flag.
#[derive(Debug, Default)]
pub struct MultiReceiver {
    receivers: BTreeMap<NodeRef, bool>,
}

impl MultiReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `receiver` was already attached.
    pub fn add(&mut self, receiver: NodeRef) -> bool {
        if self.receivers.contains_key(&receiver) {
            return false;
        }
        self.receivers.insert(receiver, false);
        true
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn is_pulling(&self, receiver: NodeRef) -> bool {
        self.receivers.get(&receiver).copied().unwrap_or(false)
    }

    pub fn any_pulling(&self) -> bool {
        self.receivers.values().any(|&p| p)
    }

    /// Receivers with an outstanding pull, in id order.
    pub fn pulling(&self) -> Vec<NodeRef> {
        self.receivers
            .iter()
            .filter(|(_, pulling)| **pulling)
            .map(|(r, _)| *r)
            .collect()
    }

    pub fn record_pull(&mut self, from: NodeRef) {
        let pulling = self
            .receivers
            .get_mut(&from)
            .unwrap_or_else(|| panic!("pull from {from}, which is not a receiver"));
        assert!(!*pulling, "second pull from {from} before the first was resolved");
        *pulling = true;
    }

    /// Detach `receiver`. Returns `false` if it was not attached.
    pub fn remove(&mut self, receiver: NodeRef) -> bool {
        self.receivers.remove(&receiver).is_some()
    }

    pub fn send<P: Packet>(&mut self, to: NodeRef, packet: P, cx: &mut Cx<'_, P>) {
        let pulling = self
            .receivers
            .get_mut(&to)
            .unwrap_or_else(|| panic!("delivery to {to}, which is not a receiver"));
        assert!(*pulling, "delivery to {to}, which is not pulling");
        *pulling = false;
        cx.send(to, packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pullflow_core::id::{ContextId, NodeId};

    fn node(n: u64) -> NodeRef {
        NodeRef::new(ContextId::new(0), NodeId::new(n))
    }

    #[test]
    #[should_panic(expected = "second pull")]
    fn double_pull_panics() {
        let mut reg = SingleReceiver::new();
        reg.add(node(4));
        reg.record_pull(node(4));
        reg.record_pull(node(4));
    }

    #[test]
    #[should_panic(expected = "not the receiver")]
    fn pull_from_unknown_receiver_panics() {
        let mut reg = SingleReceiver::new();
        reg.add(node(4));
        reg.record_pull(node(5));
    }

    #[test]
    fn multi_receiver_tracks_each_link() {
        let mut reg = MultiReceiver::new();
        assert!(reg.add(node(3)));
        assert!(reg.add(node(1)));
        assert!(!reg.add(node(1)));
        assert!(!reg.any_pulling());

        reg.record_pull(node(3));
        reg.record_pull(node(1));
        assert_eq!(reg.pulling(), vec![node(1), node(3)]);
        assert!(reg.is_pulling(node(3)));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn close_drops_the_outstanding_pull() {
        let mut reg = SingleReceiver::new();
        reg.add(node(4));
        reg.record_pull(node(4));
        assert!(reg.close(node(4)));
        assert!(!reg.is_pulling());
        assert!(reg.is_closed());
        assert!(!reg.close(node(4)));
    }

    #[test]
    #[should_panic(expected = "after it closed")]
    fn pull_after_close_panics() {
        let mut reg = SingleReceiver::new();
        reg.add(node(4));
        reg.close(node(4));
        reg.record_pull(node(4));
    }

    #[test]
    fn removed_receiver_is_forgotten() {
        let mut reg = MultiReceiver::new();
        reg.add(node(1));
        reg.add(node(2));
        reg.record_pull(node(2));
        assert!(reg.remove(node(2)));
        assert!(!reg.remove(node(2)));
        assert!(!reg.any_pulling());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    #[should_panic(expected = "second pull")]
    fn multi_receiver_double_pull_panics() {
        let mut reg = MultiReceiver::new();
        reg.add(node(2));
        reg.record_pull(node(2));
        reg.record_pull(node(2));
    }
}
