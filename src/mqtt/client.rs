//! MQTT client wrapper for rumqttc
//!
//! Provides a simplified interface for MQTT v5 operations with TLS support.

use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::error::MqttError;

use super::tls::build_tls_transport;

/// Message received from MQTT subscription
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: String,
}

/// MQTT client wrapper
pub struct MqttClient {
    client: AsyncClient,
    base_topic: String,
}

impl MqttClient {
    /// Create a new MQTT client from configuration
    pub fn new(config: &MqttConfig) -> Result<(Self, EventLoop), MqttError> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));

        // Login is optional; a login without password sends an empty one
        if let Some(user) = &config.user {
            let pass = config
                .password
                .as_ref()
                .map(|p| p.expose().to_string())
                .unwrap_or_default();
            options.set_credentials(user, pass);
        }

        // Configure TLS if enabled
        if let Some(tls_config) = &config.tls {
            let transport = build_tls_transport(&config.host, tls_config)?;
            options.set_transport(transport);
            info!("MQTT TLS enabled");
        }

        let (client, eventloop) = AsyncClient::new(options, 100);

        Ok((
            Self {
                client,
                base_topic: config.topic.clone(),
            },
            eventloop,
        ))
    }

    /// Get the base topic
    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Publish a message with retain flag
    pub async fn publish_retained(&self, topic: &str, payload: &str) -> Result<(), MqttError> {
        debug!("Publishing to {}: {}", topic, payload);
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload.as_bytes().to_vec())
            .await
            .map_err(|e| MqttError::PublishFailed(e.to_string()))
    }

    /// Publish a message without retain flag
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError> {
        debug!("Publishing to {}: {}", topic, payload);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| MqttError::PublishFailed(e.to_string()))
    }

    /// Get a clone of the underlying client (for use in multiple tasks)
    pub fn clone_client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Send a DISCONNECT to the broker
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to disconnect from MQTT broker: {}", e);
        }
    }
}

/// Run the MQTT event loop and forward incoming messages
///
/// Re-subscribes to all topics on every ConnAck (reconnection), since
/// rumqttc uses `clean_start = true` by default and the broker discards
/// session state (including subscriptions) when the client reconnects.
/// `connected` tracks broker reachability for the polling loop.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscribe_topics: Vec<String>,
    message_tx: Option<mpsc::Sender<IncomingMessage>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(incoming)) => match incoming {
                rumqttc::v5::Incoming::Publish(publish) => {
                    let topic = String::from_utf8_lossy(&publish.topic).to_string();
                    let payload = String::from_utf8_lossy(&publish.payload).to_string();
                    debug!("Received message on {}: {}", topic, payload);

                    if let Some(tx) = &message_tx {
                        let msg = IncomingMessage { topic, payload };
                        if tx.send(msg).await.is_err() {
                            warn!("Failed to forward incoming message - receiver dropped");
                        }
                    }
                }
                rumqttc::v5::Incoming::ConnAck(_) => {
                    info!("Connected to MQTT broker");
                    connected.store(true, Ordering::Relaxed);

                    // Re-subscribe to all topics on every (re)connection
                    for topic in &subscribe_topics {
                        info!("Subscribing to {}", topic);
                        if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                            error!("Failed to subscribe to {}: {}", topic, e);
                        }
                    }
                }
                rumqttc::v5::Incoming::SubAck(_) => {
                    debug!("Subscription acknowledged");
                }
                rumqttc::v5::Incoming::Disconnect(_) => {
                    warn!("Disconnected from MQTT broker");
                    connected.store(false, Ordering::Relaxed);
                }
                _ => {}
            },
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::Relaxed);
                error!("MQTT event loop error: {}", e);
                // Wait before retrying
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Secret, TlsConfig};

    fn config() -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1883,
            topic: "/medidor_nivel".to_string(),
            user: None,
            password: None,
            client_id: "TestClient".to_string(),
            tls: None,
        }
    }

    #[tokio::test]
    async fn test_base_topic() {
        let (client, _eventloop) = MqttClient::new(&config()).unwrap();
        assert_eq!(client.base_topic(), "/medidor_nivel");
    }

    #[tokio::test]
    async fn test_login_without_password() {
        let mut cfg = config();
        cfg.user = Some("BROKER_LOGIN".to_string());
        assert!(MqttClient::new(&cfg).is_ok());

        cfg.password = Some(Secret::new("BROKER_PASSWORD"));
        assert!(MqttClient::new(&cfg).is_ok());
    }

    #[tokio::test]
    async fn test_tls_missing_ca_file() {
        let mut cfg = config();
        cfg.tls = Some(TlsConfig {
            ca_file: Some("/nonexistent/ca.pem".into()),
            ca_path: None,
            cert_file: None,
            key_file: None,
            insecure: false,
        });
        assert!(matches!(
            MqttClient::new(&cfg),
            Err(MqttError::ConnectionFailed(_))
        ));
    }
}
