//! Pure connection state machine
//!
//! All transition logic is kept side-effect-free here so it can be tested
//! without a transport or a runtime. The manager applies these decisions
//! and performs the I/O they imply.

use crate::dispatch::StatusEvent;

/// Connection state of the watcher. Exactly one instance is live per
/// manager; every transition goes through [`next_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing running; the state before `start` and after a disconnect
    /// completes.
    Idle,
    /// A connect attempt is in flight or a reconnect is pending.
    Connecting,
    /// Session established; a subscribe attempt has been initiated.
    Connected,
    /// A disconnect request is being carried out.
    Disconnecting,
    /// Terminal failure with reason (retry attempts exhausted).
    Disconnected(String),
}

impl ConnectionState {
    /// True while a session is being established or held.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// The kinds of retry the scheduler tracks. At most one of each may be
/// outstanding at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryKind {
    Connect,
    Subscribe,
}

/// Events that drive state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    StartRequested,
    ConnectSucceeded,
    ConnectionLost(String),
    RetriesExhausted(String),
    DisconnectRequested,
    DisconnectFinished,
}

/// Transition table. Events that do not apply in the current state leave
/// it unchanged; the manager logs and ignores them.
pub fn next_state(current: &ConnectionState, event: &StateEvent) -> ConnectionState {
    use ConnectionState::*;

    match (current, event) {
        (Idle | Disconnected(_), StateEvent::StartRequested) => Connecting,
        (Connecting, StateEvent::ConnectSucceeded) => Connected,
        // Losing an established connection falls back to Connecting; the
        // reconnect itself waits on the retry scheduler.
        (Connected, StateEvent::ConnectionLost(_)) => Connecting,
        (Connecting, StateEvent::ConnectionLost(_)) => Connecting,
        (Connecting, StateEvent::RetriesExhausted(reason)) => Disconnected(reason.clone()),
        (_, StateEvent::DisconnectRequested) => Disconnecting,
        (Disconnecting, StateEvent::DisconnectFinished) => Idle,
        (state, _) => state.clone(),
    }
}

/// Whether a fired retry is still meaningful in the given state. A retry
/// that fires after the state moved on must no-op.
pub fn retry_still_valid(state: &ConnectionState, kind: RetryKind) -> bool {
    match kind {
        RetryKind::Connect => matches!(state, ConnectionState::Connecting),
        RetryKind::Subscribe => matches!(state, ConnectionState::Connected),
    }
}

/// The status event equivalent to a state, used to answer status queries
/// without mutating anything.
pub fn status_event_for(state: &ConnectionState) -> StatusEvent {
    match state {
        ConnectionState::Connected => StatusEvent::connected(),
        ConnectionState::Disconnected(reason) => StatusEvent::disconnected(Some(reason.clone())),
        _ => StatusEvent::disconnected(None),
    }
}
