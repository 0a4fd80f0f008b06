//! Connection manager task
//!
//! The manager is the single consumer of one channel merging host commands,
//! transport events and retry firings, so every state transition is applied
//! by exactly one logical writer. Transport call errors are folded into the
//! same retry path as asynchronous failure callbacks; nothing here returns
//! an error to the host. The worst observable outcome is a status event
//! reporting disconnected with a reason.

use super::retry::{RetryDecision, RetryPolicy, RetryScheduler};
use super::state::{next_state, retry_still_valid, status_event_for, RetryKind, StateEvent};
use super::ConnectionState;
use crate::config::WatcherConfig;
use crate::dispatch::{EventDispatcher, InboundMessage, StatusEvent};
use crate::error::sanitize_error_message;
use crate::transport::{Transport, TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Host commands accepted by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Disconnect,
    Status,
    Shutdown,
}

/// Everything the manager reacts to, merged into one stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    Command(Command),
    Transport(TransportEvent),
    RetryFired { kind: RetryKind, epoch: u64 },
}

pub struct ConnectionManager<T: Transport> {
    config: WatcherConfig,
    transport: T,
    dispatcher: Arc<EventDispatcher>,
    events_rx: mpsc::UnboundedReceiver<ManagerEvent>,
    scheduler: RetryScheduler,
    policy: RetryPolicy,

    state: ConnectionState,
    /// Bumped on every state change; retry firings from an older epoch are
    /// stale and dropped.
    epoch: u64,
    connect_attempts: u32,
    subscribe_attempts: u32,
    connect_retry_pending: bool,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        config: WatcherConfig,
        transport: T,
        dispatcher: Arc<EventDispatcher>,
        events_tx: mpsc::UnboundedSender<ManagerEvent>,
        events_rx: mpsc::UnboundedReceiver<ManagerEvent>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        Self {
            config,
            transport,
            dispatcher,
            events_rx,
            scheduler: RetryScheduler::new(events_tx),
            policy,
            state: ConnectionState::Idle,
            epoch: 0,
            connect_attempts: 0,
            subscribe_attempts: 0,
            connect_retry_pending: false,
        }
    }

    /// Run until a shutdown command arrives or every command handle is
    /// dropped.
    pub async fn run(mut self) {
        info!(watcher_id = %self.config.watcher.id, "connection manager started");
        while let Some(event) = self.events_rx.recv().await {
            match event {
                ManagerEvent::Command(Command::Start) => self.handle_start().await,
                ManagerEvent::Command(Command::Disconnect) => self.handle_disconnect(false).await,
                ManagerEvent::Command(Command::Status) => self.handle_status(),
                ManagerEvent::Command(Command::Shutdown) => {
                    self.handle_disconnect(true).await;
                    break;
                }
                ManagerEvent::Transport(transport_event) => {
                    self.handle_transport_event(transport_event).await;
                }
                ManagerEvent::RetryFired { kind, epoch } => {
                    self.handle_retry_fired(kind, epoch).await;
                }
            }
        }
        info!(watcher_id = %self.config.watcher.id, "connection manager stopped");
    }

    /// Apply a transition through the pure table, bumping the epoch when
    /// the state actually changes.
    fn transition(&mut self, event: StateEvent) {
        let next = next_state(&self.state, &event);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "state transition");
            self.state = next;
            self.epoch += 1;
        }
    }

    async fn handle_start(&mut self) {
        if !matches!(
            self.state,
            ConnectionState::Idle | ConnectionState::Disconnected(_)
        ) {
            debug!(state = ?self.state, "start ignored, watcher already active");
            return;
        }
        self.transition(StateEvent::StartRequested);
        self.connect_attempts = 0;
        self.connect_retry_pending = false;
        self.attempt_connect().await;
    }

    async fn attempt_connect(&mut self) {
        match self.transport.connect().await {
            Ok(()) => debug!("connect initiated"),
            Err(e) => {
                // A synchronous throw behaves exactly like an asynchronous
                // connect failure, down to the cause string observers see.
                self.on_connect_failure(e.into_cause());
            }
        }
    }

    fn on_connect_failure(&mut self, cause: String) {
        let reason = sanitize_error_message(&cause);
        warn!(error = %reason, attempt = self.connect_attempts + 1, "connect attempt failed");
        self.dispatcher
            .publish_status(StatusEvent::disconnected(Some(reason)));
        self.schedule_retry(RetryKind::Connect);
    }

    fn schedule_retry(&mut self, kind: RetryKind) {
        let attempt = match kind {
            RetryKind::Connect => {
                self.connect_attempts += 1;
                self.connect_attempts
            }
            RetryKind::Subscribe => {
                self.subscribe_attempts += 1;
                self.subscribe_attempts
            }
        };

        match self.policy.decide(attempt) {
            RetryDecision::Proceed => {
                self.scheduler.schedule(kind, self.policy.delay, self.epoch);
                if kind == RetryKind::Connect {
                    self.connect_retry_pending = true;
                }
            }
            RetryDecision::GiveUp => {
                let reason = format!("retry attempts exhausted after {} tries", attempt - 1);
                warn!(?kind, %reason, "giving up");
                if kind == RetryKind::Connect {
                    self.transition(StateEvent::RetriesExhausted(reason.clone()));
                    self.dispatcher
                        .publish_status(StatusEvent::disconnected(Some(reason)));
                }
                // A subscribe give-up leaves the connection standing; the
                // failure has already been logged.
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectComplete { reconnected } => {
                self.handle_connect_complete(reconnected).await;
            }
            TransportEvent::ConnectionLost { cause } => {
                self.handle_connection_lost(cause);
            }
            TransportEvent::MessageArrived { topic, payload } => {
                if self.state != ConnectionState::Connected {
                    debug!(%topic, state = ?self.state, "message outside connected state, dropped");
                    return;
                }
                self.dispatcher
                    .publish_message(InboundMessage::new(topic, payload))
                    .await;
            }
        }
    }

    async fn handle_connect_complete(&mut self, reconnected: bool) {
        if !self.state.is_active() {
            debug!(state = ?self.state, "stale connect completion ignored");
            return;
        }

        self.scheduler.cancel(RetryKind::Connect);
        self.connect_retry_pending = false;
        self.connect_attempts = 0;

        if self.state != ConnectionState::Connected {
            self.transition(StateEvent::ConnectSucceeded);
        }
        info!(reconnected, "connected to broker");
        self.dispatcher.publish_status(StatusEvent::connected());

        self.subscribe_attempts = 0;
        self.attempt_subscribe().await;
    }

    async fn attempt_subscribe(&mut self) {
        let topic = self.config.mqtt.topic.clone();
        let qos = self.config.mqtt.qos;
        match self.transport.subscribe(&topic, qos).await {
            Ok(()) => {
                info!(%topic, qos, "subscribed");
                self.subscribe_attempts = 0;
            }
            Err(e) => {
                // Subscribe failures stay off the status channel; they are
                // retried quietly and never touch the connection state.
                warn!(error = %e, %topic, "subscribe failed, scheduling retry");
                self.schedule_retry(RetryKind::Subscribe);
            }
        }
    }

    fn handle_connection_lost(&mut self, cause: String) {
        match self.state {
            ConnectionState::Connected => {
                let reason = sanitize_error_message(&cause);
                warn!(error = %reason, "connection lost");
                self.scheduler.cancel(RetryKind::Subscribe);
                self.transition(StateEvent::ConnectionLost(reason.clone()));
                self.dispatcher
                    .publish_status(StatusEvent::disconnected(Some(reason)));
                self.schedule_retry(RetryKind::Connect);
            }
            ConnectionState::Connecting if !self.connect_retry_pending => {
                // The failure report for the in-flight attempt.
                self.on_connect_failure(cause);
            }
            ConnectionState::Connecting => {
                debug!("duplicate connection-lost while reconnect pending, ignored");
            }
            _ => {
                debug!(state = ?self.state, "connection-lost in inactive state, ignored");
            }
        }
    }

    async fn handle_retry_fired(&mut self, kind: RetryKind, epoch: u64) {
        if epoch != self.epoch {
            debug!(?kind, fired = epoch, current = self.epoch, "stale retry ignored");
            return;
        }
        if kind == RetryKind::Connect {
            self.connect_retry_pending = false;
        }
        if !retry_still_valid(&self.state, kind) {
            debug!(?kind, state = ?self.state, "retry no longer applicable, ignored");
            return;
        }

        match kind {
            RetryKind::Connect => self.attempt_connect().await,
            RetryKind::Subscribe => self.attempt_subscribe().await,
        }
    }

    /// Graceful disconnect, or full teardown when `teardown` is set. Always
    /// reaches Idle and always emits exactly one final disconnected status;
    /// transport failures along the way are logged and swallowed.
    async fn handle_disconnect(&mut self, teardown: bool) {
        if self.state == ConnectionState::Idle && !teardown {
            // Nothing to tear down; still answer with a final event.
            self.dispatcher.publish_status(StatusEvent::disconnected(None));
            return;
        }

        // Ordering matters: cancel retries, then release the transport,
        // then notify, so no stale event can follow the final status.
        self.scheduler.cancel_all();
        self.connect_retry_pending = false;
        self.transition(StateEvent::DisconnectRequested);

        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "graceful disconnect failed, forcing close");
        }
        self.transport.close().await;

        self.transition(StateEvent::DisconnectFinished);
        let error = teardown.then(|| "Service destroyed".to_string());
        self.dispatcher.publish_status(StatusEvent::disconnected(error));
    }

    /// Status query: re-emits the event equivalent to the current state
    /// without mutating anything.
    fn handle_status(&self) {
        self.dispatcher.publish_status(status_event_for(&self.state));
    }
}
