//! MQTT module - client, publisher, and subscriber

mod client;
mod publisher;
mod subscriber;
mod tls;

pub use client::{run_event_loop, MqttClient};
pub use publisher::Publisher;
pub use subscriber::{run_subscriber, Subscriber};
