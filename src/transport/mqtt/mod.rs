//! MQTT transport built on rumqttc
//!
//! Split into pure option construction (`options`) and the impure client
//! that owns the rumqttc session and its polling task (`client`).

mod client;
mod options;

pub use client::MqttTransport;
pub use options::{configure_mqtt_options, qos_level};
