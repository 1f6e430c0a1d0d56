//! Configuration module for medidor-nivel
//!
//! Parses environment variables into a strongly-typed configuration struct.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Topic the level is published on unless overridden
pub const TOPIC_NAME: &str = "/medidor_nivel";

/// Default MQTT broker port
pub const DEFAULT_PORT: u16 = 1883;

/// Longest client identifier the MQTT wire format can carry
const MAX_CLIENT_ID_LEN: usize = 65535;

/// Main configuration struct containing all settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Network the device is provisioned on
    pub network: NetworkConfig,
    /// MQTT broker configuration
    pub mqtt: MqttConfig,
    /// Distance sensor and tank geometry
    pub sensor: SensorConfig,
    /// Enable request/response bridge
    pub mqtt_subscribe: bool,
    /// Time between measurements
    pub interval: Duration,
    /// Payload shape on the base topic
    pub payload_format: PayloadFormat,
    /// Enable verbose logging
    pub debug: bool,
}

/// Wi-Fi credentials
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    pub ssid: Option<String>,
    pub password: Option<Secret>,
}

/// MQTT-specific configuration
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker hostname/IP
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// Base topic
    pub topic: String,
    /// Login (empty = anonymous)
    pub user: Option<String>,
    /// Password
    pub password: Option<Secret>,
    /// Client identifier, unique per deployment
    pub client_id: String,
    /// TLS configuration
    pub tls: Option<TlsConfig>,
}

/// TLS configuration for MQTT
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// CA certificate file path
    pub ca_file: Option<PathBuf>,
    /// CA certificate directory path
    pub ca_path: Option<PathBuf>,
    /// Client certificate path
    pub cert_file: Option<PathBuf>,
    /// Private key path
    pub key_file: Option<PathBuf>,
    /// Skip certificate validation
    pub insecure: bool,
}

/// Distance sensor configuration
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// File holding the latest raw distance sample
    pub path: PathBuf,
    /// Multiplier from raw sample to centimetres
    pub scale: f64,
    /// Sensor face to tank bottom, in cm
    pub tank_height_cm: f64,
    /// Sensor face to the "full" mark, in cm
    pub offset_cm: f64,
    /// Samples per measurement
    pub samples: usize,
}

/// Payload published on the base topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Fill percentage only
    Plain,
    /// Full reading as JSON
    Json,
}

/// A string that never shows up in logs
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Configuration error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let network = NetworkConfig {
            ssid: vars.get("WIFI_SSID"),
            password: vars.get("WIFI_PASSWORD").map(Secret::new),
        };
        network.validate()?;

        let tls = if vars.flag("MQTT_TLS", false) {
            Some(TlsConfig {
                ca_file: vars.get("MQTT_CAFILE").map(PathBuf::from),
                ca_path: vars.get("MQTT_CAPATH").map(PathBuf::from),
                cert_file: vars.get("MQTT_CERTFILE").map(PathBuf::from),
                key_file: vars.get("MQTT_KEYFILE").map(PathBuf::from),
                insecure: vars.flag("MQTT_TLS_INSECURE", false),
            })
        } else {
            None
        };

        let mqtt = MqttConfig {
            host: vars.require("MQTT_HOST")?,
            port: vars.parse("MQTT_PORT", DEFAULT_PORT)?,
            topic: vars.get("MQTT_TOPIC").unwrap_or_else(|| TOPIC_NAME.to_string()),
            user: vars.get("MQTT_USER"),
            password: vars.get("MQTT_PASSWORD").map(Secret::new),
            client_id: vars.get("MQTT_CLIENT_ID").unwrap_or_else(default_client_id),
            tls,
        };
        mqtt.validate()?;

        let sensor = SensorConfig {
            path: PathBuf::from(vars.require("SENSOR_PATH")?),
            scale: vars.parse("SENSOR_SCALE", 1.0)?,
            tank_height_cm: vars.parse_required("TANK_HEIGHT")?,
            offset_cm: vars.parse("SENSOR_OFFSET", 0.0)?,
            samples: vars.parse("SAMPLES", 5)?,
        };
        sensor.validate()?;

        let interval_secs: u64 = vars.parse("INTERVAL", 60)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue("INTERVAL", "0".to_string()));
        }

        let payload_format = match vars.get("PAYLOAD_FORMAT") {
            None => PayloadFormat::Plain,
            Some(v) => match v.to_lowercase().as_str() {
                "plain" => PayloadFormat::Plain,
                "json" => PayloadFormat::Json,
                _ => return Err(ConfigError::InvalidValue("PAYLOAD_FORMAT", v)),
            },
        };

        Ok(Config {
            network,
            mqtt,
            sensor,
            mqtt_subscribe: vars.flag("MQTT_SUBSCRIBE", false),
            interval: Duration::from_secs(interval_secs),
            payload_format,
            debug: vars.flag("DEBUG", false),
        })
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(password) = &self.password {
            if self.ssid.is_none() {
                return Err(ConfigError::MissingRequired("WIFI_SSID"));
            }
            // WPA2 passphrase length
            let len = password.expose().chars().count();
            if !(8..=63).contains(&len) {
                return Err(ConfigError::InvalidValue(
                    "WIFI_PASSWORD",
                    format!("length {} outside 8..=63", len),
                ));
            }
        }
        Ok(())
    }
}

impl MqttConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() || self.client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(ConfigError::InvalidValue(
                "MQTT_CLIENT_ID",
                self.client_id.clone(),
            ));
        }
        if self.topic.is_empty() || self.topic.contains(['+', '#']) {
            return Err(ConfigError::InvalidValue("MQTT_TOPIC", self.topic.clone()));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(ConfigError::MissingRequired("MQTT_USER"));
        }
        Ok(())
    }
}

impl SensorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ConfigError::InvalidValue("SENSOR_SCALE", self.scale.to_string()));
        }
        if !self.tank_height_cm.is_finite() || self.tank_height_cm <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "TANK_HEIGHT",
                self.tank_height_cm.to_string(),
            ));
        }
        if !(0.0..self.tank_height_cm).contains(&self.offset_cm) {
            return Err(ConfigError::InvalidValue(
                "SENSOR_OFFSET",
                self.offset_cm.to_string(),
            ));
        }
        if self.samples == 0 {
            return Err(ConfigError::InvalidValue("SAMPLES", "0".to_string()));
        }
        Ok(())
    }
}

/// Default client ID: `medidor-nivel-<hostname>`
pub fn default_client_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("medidor-nivel-{}", hostname)
}

/// Boolean environment value: `true`, `1` or `yes`, any case
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::MissingRequired(name))
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        self.get(name).map(|v| is_truthy(&v)).unwrap_or(default)
    }

    fn parse<T: std::str::FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(name, v)),
            None => Ok(default),
        }
    }

    fn parse_required<T: std::str::FromStr>(&self, name: &'static str) -> Result<T, ConfigError> {
        let v = self.require(name)?;
        v.trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, v))
    }
}
