//! Lifecycle controller
//!
//! Thin async handle over the manager task. Commands are posted onto the
//! manager's channel and applied there one at a time; the controller never
//! touches connection state directly.

use super::manager::{Command, ConnectionManager, ManagerEvent};
use crate::config::WatcherConfig;
use crate::dispatch::{EventDispatcher, ObserverId, WatcherEvent};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct LifecycleController {
    commands: mpsc::UnboundedSender<ManagerEvent>,
    dispatcher: Arc<EventDispatcher>,
    task: JoinHandle<()>,
}

impl LifecycleController {
    /// Wire a transport to a fresh manager task and return the handle.
    pub fn spawn<T: Transport + 'static>(
        config: WatcherConfig,
        mut transport: T,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Transport events ride the same channel as commands so the manager
        // sees a single serialized stream.
        let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
        transport.set_event_sender(transport_tx);
        let forward_tx = events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                if forward_tx.send(ManagerEvent::Transport(event)).is_err() {
                    break;
                }
            }
        });

        let manager = ConnectionManager::new(
            config,
            transport,
            Arc::clone(&dispatcher),
            events_tx.clone(),
            events_rx,
        );
        let task = tokio::spawn(manager.run());

        Self {
            commands: events_tx,
            dispatcher,
            task,
        }
    }

    /// Begin connecting. Safe to call repeatedly; an active watcher ignores
    /// the extra starts.
    pub fn start(&self) {
        let _ = self.commands.send(ManagerEvent::Command(Command::Start));
    }

    /// Ask for a graceful disconnect. Completion shows up as a status event.
    pub fn request_disconnect(&self) {
        let _ = self.commands.send(ManagerEvent::Command(Command::Disconnect));
    }

    /// Ask for a snapshot status event on the observer channels.
    pub fn request_status(&self) {
        let _ = self.commands.send(ManagerEvent::Command(Command::Status));
    }

    /// Register an observer for status and message events. Only events
    /// published after registration are delivered.
    pub fn observe(&self) -> (ObserverId, mpsc::UnboundedReceiver<WatcherEvent>) {
        self.dispatcher.register()
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.dispatcher.deregister(id);
    }

    /// Tear the watcher down: disconnect, close the transport and emit the
    /// final "Service destroyed" status, then wait for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(ManagerEvent::Command(Command::Shutdown));
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task).await {
            Ok(Ok(())) => debug!("manager task finished"),
            Ok(Err(e)) => warn!(error = %e, "manager task panicked during shutdown"),
            Err(_) => {
                warn!("manager task did not stop in time, aborting");
                self.task.abort();
            }
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.task.abort();
    }
}
