//! Polling loop for level measurements
//!
//! Measures on a fixed interval and publishes each reading.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::PayloadFormat;
use crate::mqtt::{MqttClient, Publisher};
use crate::sensor::LevelMeter;

/// Tracks broker reachability transitions so each one is logged once
#[derive(Debug, Default)]
struct LinkState {
    was_disconnected: bool,
}

impl LinkState {
    /// Returns whether this cycle should run
    fn observe(&mut self, connected: bool) -> bool {
        if !connected {
            if !self.was_disconnected {
                warn!("MQTT broker disconnected, skipping measurement cycles");
                self.was_disconnected = true;
            }
            return false;
        }
        if self.was_disconnected {
            info!("MQTT broker reconnected, resuming measurements");
            self.was_disconnected = false;
        }
        true
    }
}

/// How often the startup wait re-checks the connection flag
const CONNECT_POLL: Duration = Duration::from_millis(250);

/// Block until the event loop has seen its first ConnAck
async fn wait_for_connection(connected: &AtomicBool) {
    if connected.load(Ordering::Relaxed) {
        return;
    }
    info!("Waiting for MQTT broker before the first measurement");
    while !connected.load(Ordering::Relaxed) {
        sleep(CONNECT_POLL).await;
    }
}

/// Run the polling loop
///
/// 1. Wait for the first broker connection; the first tick then fires at once
/// 2. Wait for the next tick
/// 3. Skip the cycle while the broker is unreachable
/// 4. Take a median-filtered measurement
/// 5. Publish it, retained, on the base topic
pub async fn run_polling_loop(
    period: Duration,
    format: PayloadFormat,
    meter: Arc<LevelMeter>,
    mqtt_client: Arc<MqttClient>,
    mqtt_connected: Arc<AtomicBool>,
) {
    info!(
        "Measuring {} every {} seconds",
        meter.source().path().display(),
        period.as_secs()
    );

    wait_for_connection(&mqtt_connected).await;

    let mut poll_interval = interval(period);
    // Skip missed ticks instead of bursting them all at once after a stall
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let publisher = Publisher::new(&mqtt_client, format);
    let mut link = LinkState::default();

    loop {
        poll_interval.tick().await;

        // No point reading the sensor if nothing can be delivered; also keeps
        // the rumqttc request channel from filling up during an outage.
        if !link.observe(mqtt_connected.load(Ordering::Relaxed)) {
            continue;
        }

        debug!("Starting measurement cycle");

        let reading = match meter.measure().await {
            Ok(reading) => reading,
            Err(e) => {
                error!("Measurement failed: {}", e);
                continue;
            }
        };
        info!(
            "Level {} cm ({}%), distance {} cm",
            reading.level_cm, reading.percent, reading.distance_cm
        );

        if let Err(e) = publisher.publish_reading(&reading).await {
            error!("Failed to publish reading: {}", e);
        }
    }
}
