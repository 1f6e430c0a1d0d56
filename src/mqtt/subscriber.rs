//! MQTT subscriber for the request/response bridge
//!
//! Answers on-demand measurement requests.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::sensor::LevelMeter;

use super::client::{IncomingMessage, MqttClient};

/// Request topic suffix
const REQUEST_SUFFIX: &str = "request";
/// Response topic suffix
const RESPONSE_SUFFIX: &str = "response";

/// A parsed request payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Take a measurement now
    Read,
    /// Liveness check
    Ping,
    Unknown(String),
}

impl Request {
    /// Parse a request payload; `None` for blank payloads
    pub fn parse(payload: &str) -> Option<Self> {
        let cmd = payload.trim();
        if cmd.is_empty() {
            return None;
        }
        Some(match cmd.to_lowercase().as_str() {
            "read" => Request::Read,
            "ping" => Request::Ping,
            _ => Request::Unknown(cmd.to_string()),
        })
    }
}

/// Subscriber for request/response bridge
pub struct Subscriber {
    base_topic: String,
}

impl Subscriber {
    pub fn new(base_topic: &str) -> Self {
        Self {
            base_topic: base_topic.to_string(),
        }
    }

    /// Get the request topic
    pub fn request_topic(&self) -> String {
        format!("{}/{}", self.base_topic, REQUEST_SUFFIX)
    }

    /// Get the response topic
    pub fn response_topic(&self) -> String {
        format!("{}/{}", self.base_topic, RESPONSE_SUFFIX)
    }

    /// Check if a message is a request
    pub fn is_request(&self, topic: &str) -> bool {
        topic == self.request_topic()
    }

    /// Build the response payload for a request
    pub async fn respond(&self, request: &Request, meter: &LevelMeter) -> String {
        match request {
            Request::Ping => "pong".to_string(),
            Request::Read => match meter.measure().await {
                Ok(reading) => match serde_json::to_string(&reading) {
                    Ok(s) => s,
                    Err(e) => json!({ "error": e.to_string() }).to_string(),
                },
                Err(e) => {
                    warn!("On-demand measurement failed: {}", e);
                    json!({ "error": e.to_string() }).to_string()
                }
            },
            Request::Unknown(cmd) => {
                json!({ "error": format!("unknown command: {}", cmd) }).to_string()
            }
        }
    }
}

/// Run the subscriber task
///
/// Listens for incoming MQTT messages, takes measurements on request,
/// and publishes responses.
pub async fn run_subscriber(
    subscriber: Subscriber,
    mqtt_client: Arc<MqttClient>,
    meter: Arc<LevelMeter>,
    mut message_rx: mpsc::Receiver<IncomingMessage>,
) {
    let response_topic = subscriber.response_topic();

    info!("Subscriber ready, listening on {}", subscriber.request_topic());

    while let Some(msg) = message_rx.recv().await {
        if !subscriber.is_request(&msg.topic) {
            continue;
        }

        let Some(request) = Request::parse(&msg.payload) else {
            debug!("Skipping empty request payload");
            continue;
        };

        debug!("Received request: {:?}", request);
        let response = subscriber.respond(&request, &meter).await;
        debug!("Sending response: {}", response);

        // Not retained: a point-in-time answer, not persistent state
        if let Err(e) = mqtt_client.publish(&response_topic, &response).await {
            error!("Failed to publish response: {}", e);
        }
    }

    warn!("Subscriber message channel closed");
}
