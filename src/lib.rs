//! mqwatch - persistent MQTT topic watcher
//!
//! Maintains a long-lived subscription to one MQTT topic, reconnecting
//! automatically with a fixed delay whenever the broker connection drops,
//! and fans the resulting status changes and inbound messages out to
//! registered observers. Each delivered message also produces an alert
//! through a pluggable presenter.
//!
//! # Quick Start
//!
//! ```no_run
//! use mqwatch::config::WatcherConfig;
//! use mqwatch::dispatch::{EventDispatcher, LogAlertPresenter};
//! use mqwatch::transport::MqttTransport;
//! use mqwatch::watcher::LifecycleController;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), mqwatch::error::WatchError> {
//! let config = WatcherConfig::load_from_file("mqwatch.toml".as_ref())?;
//! let transport = MqttTransport::new(config.watcher.id.clone(), config.mqtt.clone());
//! let dispatcher = Arc::new(EventDispatcher::new(Arc::new(LogAlertPresenter)));
//!
//! let controller = LifecycleController::spawn(config, transport, dispatcher);
//! let (_id, mut events) = controller.observe();
//! controller.start();
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod testing;
pub mod transport;
pub mod watcher;

pub use config::WatcherConfig;
pub use dispatch::{EventDispatcher, InboundMessage, StatusEvent, WatcherEvent};
pub use error::WatchError;
pub use watcher::{ConnectionState, LifecycleController};
