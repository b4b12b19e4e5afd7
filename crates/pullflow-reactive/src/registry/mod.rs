//! Per-node link bookkeeping.
//!
//! Provider registries track upstream links, receiver registries downstream
//! ones; each link carries a `pulling` flag. The registries are the only code
//! that sends pulls and deliveries on behalf of an operator, so the
//! single-outstanding-pull rule is enforced in one place.

mod provider;
mod receiver;

pub use provider::{MultiProvider, SingleProvider};
pub use receiver::{MultiReceiver, SingleReceiver};
