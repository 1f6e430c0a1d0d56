//! medidor-nivel - MQTT tank level meter
//!
//! A small daemon that:
//! - Samples a distance sensor above a tank
//! - Converts the median distance into a fill level
//! - Publishes the level to an MQTT broker on a fixed interval
//! - Optionally answers on-demand measurement requests

mod config;
mod error;
mod mqtt;
mod polling;
mod sensor;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::mqtt::{run_event_loop, run_subscriber, MqttClient, Subscriber};
use crate::polling::run_polling_loop;
use crate::sensor::LevelMeter;

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if std::env::var("DEBUG")
            .map(|v| config::is_truthy(&v))
            .unwrap_or(false)
        {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;

    if config.debug {
        info!("Debug mode enabled");
        debug!("Configuration: {:?}", config);
    }

    match &config.network.ssid {
        Some(ssid) => info!("Provisioned on network {}", ssid),
        None => info!("No network SSID configured, using host connectivity"),
    }
    info!(
        "Broker {}:{} as {}, topic {}",
        config.mqtt.host, config.mqtt.port, config.mqtt.client_id, config.mqtt.topic
    );

    let meter = Arc::new(LevelMeter::from_config(&config.sensor));

    let (mqtt_client, eventloop) = MqttClient::new(&config.mqtt)?;
    let mqtt_client = Arc::new(mqtt_client);
    let mqtt_connected = Arc::new(AtomicBool::new(false));

    // Channel for subscriber messages (if enabled)
    let subscriber = config
        .mqtt_subscribe
        .then(|| Subscriber::new(mqtt_client.base_topic()));
    let subscribe_topics: Vec<String> = subscriber.iter().map(Subscriber::request_topic).collect();
    let (message_tx, message_rx) = match subscriber {
        Some(_) => {
            let (tx, rx) = mpsc::channel(100);
            (Some(tx), Some(rx))
        }
        None => (None, None),
    };

    let eventloop_handle = tokio::spawn(run_event_loop(
        eventloop,
        mqtt_client.clone_client(),
        subscribe_topics,
        message_tx,
        Arc::clone(&mqtt_connected),
    ));

    let polling_handle = tokio::spawn(run_polling_loop(
        config.interval,
        config.payload_format,
        Arc::clone(&meter),
        Arc::clone(&mqtt_client),
        Arc::clone(&mqtt_connected),
    ));

    let subscriber_handle = match (subscriber, message_rx) {
        (Some(subscriber), Some(rx)) => {
            info!("Request/response bridge enabled");
            Some(tokio::spawn(run_subscriber(
                subscriber,
                Arc::clone(&mqtt_client),
                Arc::clone(&meter),
                rx,
            )))
        }
        _ => None,
    };

    info!("medidor-nivel started");

    // Wait for any task to complete (which means something went wrong)
    tokio::select! {
        _ = eventloop_handle => {
            error!("MQTT event loop exited unexpectedly");
        }
        _ = polling_handle => {
            error!("Polling loop exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = subscriber_handle {
                handle.await
            } else {
                std::future::pending::<()>().await;
                Ok(())
            }
        } => {
            error!("Subscriber exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            mqtt_client.disconnect().await;
        }
    }

    Ok(())
}
