use std::collections::{BTreeMap, BTreeSet};

use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;

/// Exactly one upstream link.
#[derive(Debug, Default)]
pub struct SingleProvider {
    provider: Option<NodeRef>,
    pulling: bool,
    closed: bool,
}

impl SingleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, provider: NodeRef) {
        match self.provider {
            None => self.provider = Some(provider),
            Some(existing) => assert_eq!(
                existing, provider,
                "single provider slot already holds {existing}"
            ),
        }
    }

    pub fn provider(&self) -> Option<NodeRef> {
        self.provider
    }

    pub fn is_pulling(&self) -> bool {
        self.pulling
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pull upstream unless a pull is already outstanding, the link is
    /// closed, or nothing is attached yet. Returns whether a pull was sent.
    pub fn pull<P: Packet>(&mut self, cx: &mut Cx<'_, P>) -> bool {
        match self.provider {
            Some(provider) if !self.pulling && !self.closed => {
                self.pulling = true;
                cx.pull(provider);
                true
            }
            _ => false,
        }
    }

    /// Give up the link for good. A pull that is still outstanding may yet
    /// be answered. Returns whether the close was sent.
    pub fn close<P: Packet>(&mut self, cx: &mut Cx<'_, P>) -> bool {
        match self.provider {
            Some(provider) if !self.closed => {
                self.closed = true;
                cx.close(provider);
                true
            }
            _ => false,
        }
    }

    /// Resolve the outstanding pull on the link to `from`.
    pub fn received(&mut self, from: NodeRef) {
        assert_eq!(
            self.provider,
            Some(from),
            "packet from {from}, which is not the provider"
        );
        assert!(self.pulling, "packet from {from} without an outstanding pull");
        self.pulling = false;
    }
}

/// Any number of upstream links, each with its own pulling flag.
#[derive(Debug, Default)]
pub struct MultiProvider {
    providers: BTreeMap<NodeRef, bool>,
    closed: BTreeSet<NodeRef>,
}

impl MultiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `provider` was already registered.
    pub fn add(&mut self, provider: NodeRef) -> bool {
        if self.providers.contains_key(&provider) {
            return false;
        }
        self.providers.insert(provider, false);
        true
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn contains(&self, provider: NodeRef) -> bool {
        self.providers.contains_key(&provider)
    }

    pub fn is_pulling(&self, provider: NodeRef) -> bool {
        self.providers.get(&provider).copied().unwrap_or(false)
    }

    pub fn any_pulling(&self) -> bool {
        self.providers.values().any(|&p| p)
    }

    pub fn providers(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.providers.keys().copied()
    }

    pub fn is_closed(&self, provider: NodeRef) -> bool {
        self.closed.contains(&provider)
    }

    /// Pull one link if it is idle and open. Returns whether a pull was sent.
    pub fn pull<P: Packet>(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>) -> bool {
        let pulling = self
            .providers
            .get_mut(&provider)
            .unwrap_or_else(|| panic!("pull of {provider}, which is not a provider"));
        if *pulling || self.closed.contains(&provider) {
            return false;
        }
        *pulling = true;
        cx.pull(provider);
        true
    }

    /// Pull every idle, open link. Returns how many pulls were sent.
    pub fn pull_all<P: Packet>(&mut self, cx: &mut Cx<'_, P>) -> usize {
        let mut sent = 0;
        for (&provider, pulling) in self.providers.iter_mut() {
            if !*pulling && !self.closed.contains(&provider) {
                *pulling = true;
                cx.pull(provider);
                sent += 1;
            }
        }
        sent
    }

    /// Close every link not closed yet. Returns how many closes were sent.
    pub fn close_all<P: Packet>(&mut self, cx: &mut Cx<'_, P>) -> usize {
        let mut sent = 0;
        for &provider in self.providers.keys() {
            if self.closed.insert(provider) {
                cx.close(provider);
                sent += 1;
            }
        }
        sent
    }

    pub fn received(&mut self, from: NodeRef) {
        let pulling = self
            .providers
            .get_mut(&from)
            .unwrap_or_else(|| panic!("packet from {from}, which is not a provider"));
        assert!(*pulling, "packet from {from} without an outstanding pull");
        *pulling = false;
    }
}
