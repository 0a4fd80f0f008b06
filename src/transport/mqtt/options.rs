//! Pure construction of rumqttc connection options from configuration.

use crate::config::MqttSection;
use crate::error::TransportError;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Build MQTT options for one connection attempt.
///
/// The client id is unique per attempt ("{watcher_id}-{millis}") so a retry
/// never collides with a half-dead session the broker still holds.
pub fn configure_mqtt_options(
    watcher_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let tls = matches!(url.scheme(), "mqtts" | "ssl");
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let client_id = format!("{watcher_id}-{timestamp}");

    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.username() {
        let password = config.password().unwrap_or_default();
        mqtt_options.set_credentials(&username, &password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    Ok(mqtt_options)
}

/// Map a configured QoS integer onto the rumqttc level.
pub fn qos_level(qos: u8) -> QoS {
    match qos {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_section(broker_url: &str) -> MqttSection {
        MqttSection {
            broker_url: broker_url.to_string(),
            username_env: None,
            password_env: None,
            topic: "a/b".to_string(),
            qos: 0,
            keep_alive_secs: 60,
        }
    }

    #[test]
    fn test_configure_options_plain() {
        let options = configure_mqtt_options("watch", &test_section("mqtt://broker.local:1884"));
        assert!(options.is_ok());
        let options = options.unwrap();
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
    }

    #[test]
    fn test_default_port_depends_on_scheme() {
        let plain = configure_mqtt_options("watch", &test_section("mqtt://broker.local")).unwrap();
        assert_eq!(plain.broker_address().1, 1883);

        let tls = configure_mqtt_options("watch", &test_section("mqtts://broker.local")).unwrap();
        assert_eq!(tls.broker_address().1, 8883);
    }

    #[test]
    fn test_invalid_broker_url() {
        let result = configure_mqtt_options("watch", &test_section("not a url"));
        assert!(matches!(result, Err(TransportError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_client_ids_are_unique_per_attempt() {
        let section = test_section("mqtt://broker.local");
        let a = configure_mqtt_options("watch", &section).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = configure_mqtt_options("watch", &section).unwrap();
        assert_ne!(a.client_id(), b.client_id());
        assert!(a.client_id().starts_with("watch-"));
    }

    #[test]
    fn test_qos_level_mapping() {
        assert_eq!(qos_level(0), QoS::AtMostOnce);
        assert_eq!(qos_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_level(2), QoS::ExactlyOnce);
    }
}
