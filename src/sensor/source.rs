//! Distance sample source
//!
//! Reads the latest sample from a file exposed by the sensor driver,
//! e.g. an IIO `in_distance_raw` node or a file kept current by another process.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SensorError;

/// Anything that yields distance samples in centimetres
pub trait DistanceSource: Send + Sync {
    fn read_cm(&self) -> impl Future<Output = Result<f64, SensorError>> + Send;
}

/// File-backed distance source
#[derive(Debug, Clone)]
pub struct SensorSource {
    path: PathBuf,
    scale: f64,
}

impl SensorSource {
    /// Create a source; `scale` converts the raw sample to centimetres
    pub fn new(path: impl Into<PathBuf>, scale: f64) -> Self {
        Self {
            path: path.into(),
            scale,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one distance sample in centimetres
    pub async fn read_cm(&self) -> Result<f64, SensorError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| SensorError::Read {
                    path: self.path.display().to_string(),
                    source,
                })?;
        let raw = parse_sample(&contents)?;
        let cm = raw * self.scale;
        debug!("Sample from {}: raw={} cm={}", self.path.display(), raw, cm);

        if !cm.is_finite() || cm < 0.0 {
            return Err(SensorError::OutOfRange(cm));
        }
        Ok(cm)
    }
}

impl DistanceSource for SensorSource {
    async fn read_cm(&self) -> Result<f64, SensorError> {
        SensorSource::read_cm(self).await
    }
}

/// Parse the first whitespace-separated token as a number
///
/// Driver nodes end with a newline; some tools append a unit ("123 cm").
pub fn parse_sample(contents: &str) -> Result<f64, SensorError> {
    let token = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| SensorError::Parse(contents.to_string()))?;
    token
        .parse::<f64>()
        .map_err(|_| SensorError::Parse(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "medidor-nivel-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_sample() {
        assert_eq!(parse_sample("1234\n").unwrap(), 1234.0);
        assert_eq!(parse_sample("  87.5 cm").unwrap(), 87.5);
        assert!(matches!(parse_sample(""), Err(SensorError::Parse(_))));
        assert!(matches!(parse_sample("\n"), Err(SensorError::Parse(_))));
        assert!(matches!(parse_sample("n/a"), Err(SensorError::Parse(_))));
    }

    #[tokio::test]
    async fn test_read_applies_scale() {
        let path = temp_file("scale", "1500\n");
        let source = SensorSource::new(&path, 0.1);
        let cm = source.read_cm().await.unwrap();
        assert!((cm - 150.0).abs() < 1e-9);
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_read_rejects_negative() {
        let path = temp_file("negative", "-4\n");
        let source = SensorSource::new(&path, 1.0);
        assert!(matches!(
            source.read_cm().await,
            Err(SensorError::OutOfRange(_))
        ));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let source = SensorSource::new("/nonexistent/medidor-nivel/sample", 1.0);
        assert!(matches!(
            source.read_cm().await,
            Err(SensorError::Read { .. })
        ));
    }
}
