//! Integration and adversarial test suite for Ember.
//!
//! The tests exercise the engine end to end over the in-memory store:
//! proportional transfers and the tax split, the holding queue, epoch
//! ticks, intent batches, and conservation under concurrent load.

pub mod helpers;
