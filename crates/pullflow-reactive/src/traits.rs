//! Reactive trait + the signals that drive it.
//!
//! A node plays the Provider role (it is pulled and delivers), the Receiver
//! role (it pulls and receives), or both. The context calls exactly one trait
//! method per signal; nodes answer through the `Cx` they are handed.

use std::sync::Arc;

use pullflow_core::id::{NodeRef, StepId};
use pullflow_core::packet::Packet;

use thiserror::Error;

use crate::context::{Builder, Cx};

#[derive(Debug, Error)]
pub enum ReactiveError {
    #[error("spawn failed for step {step}: {reason}")]
    Spawn { step: StepId, reason: String },

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("compound operator needs at least one plan step")]
    EmptyPlan,

    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Materializes the sub-pipeline for one plan step, seeded with an
/// accumulated packet. Returns the sub-pipeline's output node, which must not
/// have a receiver yet.
pub type SpawnFn<P> =
    Arc<dyn Fn(&mut Builder<'_, P>, &StepId, &P) -> Result<NodeRef, ReactiveError> + Send + Sync>;

/// Combines an accumulated packet with a step answer.
pub type MergeFn<P> = Arc<dyn Fn(&P, &P) -> Result<P, ReactiveError> + Send + Sync>;

/// Box a spawn closure, pinning down its higher-ranked signature.
pub fn spawn_fn<P, F>(f: F) -> SpawnFn<P>
where
    P: Packet,
    F: Fn(&mut Builder<'_, P>, &StepId, &P) -> Result<NodeRef, ReactiveError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

pub fn merge_fn<P, F>(f: F) -> MergeFn<P>
where
    P: Packet,
    F: Fn(&P, &P) -> Result<P, ReactiveError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One unit of work for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<P> {
    /// `receiver` wants the next packet from the target.
    Pull { receiver: NodeRef },
    /// `provider` delivers `packet` to the target.
    Receive { provider: NodeRef, packet: P },
    /// The target gains `receiver` downstream.
    PublishTo { receiver: NodeRef },
    /// The target gains `provider` upstream.
    SubscribeTo { provider: NodeRef },
    /// All providers of the target are known.
    Finalize,
    /// Deferred re-pull of `provider`, run once the context has nothing else to do.
    Retry { provider: NodeRef },
    /// `receiver` will never pull the target again.
    Close { receiver: NodeRef },
}

impl<P> Signal<P> {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Pull { .. } => "pull",
            Signal::Receive { .. } => "receive",
            Signal::PublishTo { .. } => "publish_to",
            Signal::SubscribeTo { .. } => "subscribe_to",
            Signal::Finalize => "finalize",
            Signal::Retry { .. } => "retry",
            Signal::Close { .. } => "close",
        }
    }
}

/// A signal addressed to a node, possibly in another context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<P> {
    pub target: NodeRef,
    pub signal: Signal<P>,
}

impl<P> Envelope<P> {
    pub fn new(target: NodeRef, signal: Signal<P>) -> Self {
        Self { target, signal }
    }
}

/// Trait that every node in the arena implements.
///
/// Invariants:
/// - `pull` is only called for a receiver that has no pull outstanding on
///   that link; `receive` only for a provider this node pulled.
/// - Methods must not block. Anything that touches another node goes
///   through `cx`.
/// - Only `receive` may fail, and only because an injected function failed.
pub trait Reactive<P: Packet>: Send {
    /// Human-readable operator name (stable).
    fn name(&self) -> &'static str;

    fn publish_to(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>);

    fn subscribe_to(&mut self, provider: NodeRef, cx: &mut Cx<'_, P>);

    fn pull(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>);

    fn receive(
        &mut self,
        provider: NodeRef,
        packet: P,
        cx: &mut Cx<'_, P>,
    ) -> Result<(), ReactiveError>;

    /// `receiver` is done with this node. Whatever the node still holds for
    /// it is destroyed; once no receiver is left the node closes its own
    /// upstream links, and a leaf reports its path finished.
    fn close(&mut self, receiver: NodeRef, cx: &mut Cx<'_, P>);

    fn finalize(&mut self, _cx: &mut Cx<'_, P>) {}

    fn retry(&mut self, _provider: NodeRef, _cx: &mut Cx<'_, P>) {}
}
