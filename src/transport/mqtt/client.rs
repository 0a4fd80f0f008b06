//! rumqttc-backed transport session
//!
//! Each `connect` call builds a fresh client and event loop and spawns a
//! polling task that translates rumqttc events into [`TransportEvent`]s.
//! The polling task stops on the first connection error instead of letting
//! rumqttc retry internally: retry policy belongs to the connection
//! manager, not the transport.

use super::options::{configure_mqtt_options, qos_level};
use crate::config::MqttSection;
use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{AsyncClient, Event};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub struct MqttTransport {
    watcher_id: String,
    config: MqttSection,
    client: Option<AsyncClient>,
    poll_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl MqttTransport {
    pub fn new(watcher_id: String, config: MqttSection) -> Self {
        Self {
            watcher_id,
            config,
            client: None,
            poll_handle: None,
            shutdown_tx: None,
            events: None,
        }
    }

    /// Stop the polling task, waiting briefly for it to exit on its own
    /// before aborting it.
    async fn stop_poll_task(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(mut handle) = self.poll_handle.take() {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                warn!("MQTT polling task did not stop in time, aborting");
                handle.abort();
            }
        }
    }

    /// Tear down any previous session so at most one is ever live.
    async fn release_session(&mut self) {
        self.client = None;
        self.stop_poll_task().await;
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.release_session().await;

        let events = self
            .events
            .clone()
            .ok_or_else(|| TransportError::Connect("no event sink attached".to_string()))?;

        let mqtt_options = configure_mqtt_options(&self.watcher_id, &self.config)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (client, mut event_loop) = AsyncClient::new(mqtt_options, 10);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut had_connack = false;
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("MQTT polling task stopping on shutdown signal");
                            break;
                        }
                    }
                    polled = event_loop.poll() => match polled {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            let reconnected = had_connack;
                            had_connack = true;
                            let _ = events.send(TransportEvent::ConnectComplete { reconnected });
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let _ = events.send(TransportEvent::MessageArrived {
                                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                                payload: publish.payload.clone(),
                            });
                        }
                        Ok(Event::Incoming(Packet::Disconnect(_))) => {
                            let _ = events.send(TransportEvent::ConnectionLost {
                                cause: "broker closed the connection".to_string(),
                            });
                            break;
                        }
                        Ok(other) => {
                            trace!(target: "mqwatch_transport", event = ?other, "mqtt event");
                        }
                        Err(e) => {
                            let _ = events.send(TransportEvent::ConnectionLost {
                                cause: e.to_string(),
                            });
                            break;
                        }
                    }
                }
            }
        });

        self.client = Some(client);
        self.poll_handle = Some(handle);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::Subscribe("no active session".to_string()))?;

        client
            .subscribe(topic, qos_level(qos))
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        debug!(%topic, qos, "subscription requested");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let client = self
            .client
            .take()
            .ok_or_else(|| TransportError::Disconnect("no active session".to_string()))?;

        let result = client
            .disconnect()
            .await
            .map_err(|e| TransportError::Disconnect(e.to_string()));

        self.stop_poll_task().await;
        result
    }

    async fn close(&mut self) {
        self.release_session().await;
    }

    fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<TransportEvent>) {
        self.events = Some(sender);
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_section() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            topic: "a/b".to_string(),
            qos: 0,
            keep_alive_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_connect_requires_event_sink() {
        let mut transport = MqttTransport::new("test".to_string(), test_section());
        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_subscribe_without_session_fails() {
        let mut transport = MqttTransport::new("test".to_string(), test_section());
        let result = transport.subscribe("a/b", 0).await;
        assert!(matches!(result, Err(TransportError::Subscribe(_))));
    }

    #[tokio::test]
    async fn test_disconnect_without_session_fails() {
        let mut transport = MqttTransport::new("test".to_string(), test_section());
        let result = transport.disconnect().await;
        assert!(matches!(result, Err(TransportError::Disconnect(_))));
    }

    #[tokio::test]
    async fn test_close_without_session_is_noop() {
        let mut transport = MqttTransport::new("test".to_string(), test_section());
        transport.close().await;
    }

    #[tokio::test]
    async fn test_connect_with_bad_url_is_synchronous_failure() {
        let mut section = test_section();
        section.broker_url = "not a url".to_string();
        let mut transport = MqttTransport::new("test".to_string(), section);

        let (tx, _rx) = mpsc::unbounded_channel();
        transport.set_event_sender(tx);

        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
