//! # ember-core
//! Foundation types and traits for the Ember points economy.

pub mod config;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
