//! Connection lifecycle core
//!
//! The connection manager owns the transport and drives the state machine
//! `Idle -> Connecting -> Connected -> Disconnecting -> Idle`, retrying
//! failed connects and subscribes on a fixed delay until cancelled. Pure
//! transition and retry decisions live in `state` and `retry`; the manager
//! task in `manager` is the single consumer applying them; `controller` is
//! the host-facing command surface.

pub mod controller;
pub mod manager;
pub mod retry;
pub mod state;

pub use controller::LifecycleController;
pub use manager::{Command, ConnectionManager, ManagerEvent};
pub use state::{ConnectionState, RetryKind};
