//! Testing utilities and mock implementations
//!
//! Provides a mock transport so the watcher lifecycle can be exercised
//! without a real MQTT broker.

pub mod mocks;

pub use mocks::*;
