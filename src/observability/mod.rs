//! Logging setup for the watcher daemon.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
