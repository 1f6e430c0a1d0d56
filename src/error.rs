//! Error types for medidor-nivel

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),
}

/// Errors related to reading the distance sensor
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unparsable sample: {0:?}")]
    Parse(String),

    #[error("sample out of range: {0}")]
    OutOfRange(f64),

    #[error("no valid samples out of {0} attempts")]
    NoSamples(usize),
}

/// Errors related to MQTT operations
#[derive(Error, Debug)]
pub enum MqttError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    fn load_config(fail: bool) -> std::result::Result<(), ConfigError> {
        if fail {
            return Err(ConfigError::MissingRequired("MQTT_HOST"));
        }
        Ok(())
    }

    fn connect() -> std::result::Result<(), MqttError> {
        Err(MqttError::ConnectionFailed("refused".to_string()))
    }

    fn startup(fail_config: bool) -> Result<()> {
        load_config(fail_config)?;
        connect()?;
        Ok(())
    }

    #[test]
    fn test_startup_errors_convert() {
        assert_eq!(
            startup(true).unwrap_err().to_string(),
            "configuration error: missing required environment variable: MQTT_HOST"
        );
        assert_eq!(
            startup(false).unwrap_err().to_string(),
            "MQTT error: connection failed: refused"
        );
    }
}
