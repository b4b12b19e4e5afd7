//! The `Packet` bound: what the engine needs from a candidate answer.
//!
//! Operators never look inside a packet. Fan-out replay and deduplication
//! rely on `Eq + Hash`; everything else only moves or clones it.

use std::fmt::Debug;
use std::hash::Hash;

pub trait Packet: Clone + Eq + Hash + Debug + Send + 'static {}

impl<T> Packet for T where T: Clone + Eq + Hash + Debug + Send + 'static {}
