//! # ember-store
//! Storage backends for the Ember points engine. Currently ships a
//! single in-memory backend suitable for embedding and testing.

pub mod memory;

pub use memory::MemoryStore;
