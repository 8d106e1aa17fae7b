//! # ember-ledger
//! The Ember points engine: proportional transfers with a protocol tax,
//! per-epoch decay and top-up, a holding queue for opted-out receivers,
//! and batched intent processing.

pub mod epoch;
pub mod intents;
pub mod ledger;
pub mod queue;
mod transfer;

pub use ledger::Ledger;
pub use queue::HoldingQueue;
