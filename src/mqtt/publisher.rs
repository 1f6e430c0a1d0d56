//! MQTT publisher for level readings
//!
//! Publishes each measurement, retained, on the base topic.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::PayloadFormat;
use crate::error::MqttError;
use crate::sensor::LevelReading;

use super::client::MqttClient;

/// Timeout for individual MQTT publish operations.
///
/// Prevents the polling loop from blocking indefinitely when the MQTT
/// client's internal channel is full (e.g. during a broker outage).
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publisher for level readings
pub struct Publisher<'a> {
    client: &'a MqttClient,
    format: PayloadFormat,
}

impl<'a> Publisher<'a> {
    pub fn new(client: &'a MqttClient, format: PayloadFormat) -> Self {
        Self { client, format }
    }

    /// Publish a reading
    ///
    /// Topic: {base_topic}
    /// Payload: fill percentage, or the JSON reading
    /// Retained: yes
    pub async fn publish_reading(&self, reading: &LevelReading) -> Result<(), MqttError> {
        let payload = render_payload(reading, self.format)?;
        let topic = self.client.base_topic();

        match timeout(PUBLISH_TIMEOUT, self.client.publish_retained(topic, &payload)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Publish timeout for {} after {}s - MQTT client may be stalled",
                    topic,
                    PUBLISH_TIMEOUT.as_secs()
                );
                Ok(())
            }
        }
    }
}

/// Render a reading for the base topic
pub fn render_payload(reading: &LevelReading, format: PayloadFormat) -> Result<String, MqttError> {
    let payload = match format {
        PayloadFormat::Plain => format_number(reading.percent),
        PayloadFormat::Json => serde_json::to_string(reading)?,
    };
    debug!("Rendered payload: {}", payload);
    Ok(payload)
}

/// Format a number for MQTT payload
///
/// Outputs integers without decimal places, floats with minimal precision
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        // Remove trailing zeros
        let s = format!("{:.6}", n);
        let s = s.trim_end_matches('0');
        let s = s.trim_end_matches('.');
        s.to_string()
    }
}
