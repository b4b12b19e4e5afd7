//! Terminal consumer: the root of an execution.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pullflow_core::event::MonitorEvent;
use pullflow_core::id::NodeRef;
use pullflow_core::packet::Packet;

use crate::context::Cx;
use crate::registry::SingleProvider;
use crate::traits::{Reactive, ReactiveError};

/// Answers collected by a sink, shared with whoever drives the execution.
#[derive(Debug)]
pub struct AnswerHandle<P> {
    inner: Arc<Mutex<Vec<P>>>,
}

impl<P> Clone for AnswerHandle<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> Default for AnswerHandle<P> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<P: Clone> AnswerHandle<P> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, packet: P) {
        self.lock().push(packet);
    }

    /// Answers so far, in arrival order.
    pub fn snapshot(&self) -> Vec<P> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn take(&self) -> Vec<P> {
        std::mem::take(&mut *self.lock())
    }
}

/// Registers as root when it subscribes, then keeps pulling until `limit`
/// answers have arrived. Every answer it keeps is consumed for accounting.
pub struct Sink<P> {
    provider: SingleProvider,
    answers: AnswerHandle<P>,
    limit: Option<usize>,
    received: usize,
}

impl<P: Packet> Sink<P> {
    pub fn new(answers: AnswerHandle<P>, limit: Option<usize>) -> Self {
        Self {
            provider: SingleProvider::new(),
            answers,
            limit,
            received: 0,
        }
    }

    fn wants_more(&self) -> bool {
        self.limit.map_or(true, |limit| self.received < limit)
    }
}

impl<P: Packet> Reactive<P> for Sink<P> {
    fn name(&self) -> &'static str {
        "sink"
    }

    fn publish_to(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        panic!("sink {} cannot publish to {receiver}", cx.me());
    }

    fn subscribe_to(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>) {
        self.provider.add(provider);
        cx.monitor(MonitorEvent::RegisterRoot);
        if self.wants_more() {
            self.provider.pull(cx);
        }
    }

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        panic!("sink {} was pulled by {receiver}", cx.me());
    }

    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>) {
        panic!("sink {} was closed by {receiver}", cx.me());
    }

    fn receive(
        &mut self,
        provider: NodeRef,
        packet: P,
        cx: &mut Cx<'_, P>,
    ) -> Result<(), ReactiveError> {
        self.provider.received(provider);
        self.received += 1;
        self.answers.push(packet);
        cx.monitor(MonitorEvent::Destroy);
        if self.wants_more() {
            self.provider.pull(cx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, EXEC};

    #[test]
    fn limit_stops_pulling() {
        let mut ctx = testing::context::<u32>();
        let mut b = ctx.builder(EXEC);
        let src = b.source(0..);
        let (sink, answers) = b.sink(src, Some(3));
        let events = testing::run(&mut ctx);

        assert_eq!(answers.snapshot(), vec![0, 1, 2]);
        assert_eq!(
            testing::from(&events, sink),
            vec![
                MonitorEvent::RegisterRoot,
                MonitorEvent::Destroy,
                MonitorEvent::Destroy,
                MonitorEvent::Destroy,
            ]
        );
        assert_eq!(testing::balance(&events), 0);
    }

    #[test]
    fn handle_take_drains() {
        let h = AnswerHandle::<u8>::new();
        h.push(1);
        let h2 = h.clone();
        assert_eq!(h2.take(), vec![1]);
        assert!(h.is_empty());
    }
}
