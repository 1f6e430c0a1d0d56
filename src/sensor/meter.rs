//! Level meter: sample, filter, convert

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::config::SensorConfig;
use crate::error::SensorError;

use super::level::{median, LevelReading, TankGeometry};
use super::source::{DistanceSource, SensorSource};

/// Pause between consecutive samples so echoes from the previous ping die out
const SAMPLE_DELAY: Duration = Duration::from_millis(60);

/// Takes median-filtered level measurements
pub struct LevelMeter<S = SensorSource> {
    source: S,
    geometry: TankGeometry,
    samples: usize,
}

impl LevelMeter {
    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(
            SensorSource::new(&config.path, config.scale),
            TankGeometry::new(config.tank_height_cm, config.offset_cm),
            config.samples,
        )
    }
}

impl<S: DistanceSource> LevelMeter<S> {
    pub fn new(source: S, geometry: TankGeometry, samples: usize) -> Self {
        Self {
            source,
            geometry,
            samples: samples.max(1),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Take one measurement
    ///
    /// Failed samples are skipped; the result is the reading of the median distance.
    pub async fn measure(&self) -> Result<LevelReading, SensorError> {
        let mut distances = Vec::with_capacity(self.samples);

        for i in 0..self.samples {
            if i > 0 {
                sleep(SAMPLE_DELAY).await;
            }
            match self.source.read_cm().await {
                Ok(cm) => distances.push(cm),
                Err(e) => debug!("Sample {} failed: {}", i + 1, e),
            }
        }

        let distance = median(&distances).ok_or(SensorError::NoSamples(self.samples))?;
        debug!(
            "Median distance {} cm from {}/{} samples",
            distance,
            distances.len(),
            self.samples
        );
        Ok(self.geometry.reading(distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out a fixed sequence of sample results
    struct Scripted(Mutex<VecDeque<Result<f64, SensorError>>>);

    impl Scripted {
        fn new(results: Vec<Result<f64, SensorError>>) -> Self {
            Self(Mutex::new(results.into()))
        }
    }

    impl DistanceSource for Scripted {
        async fn read_cm(&self) -> Result<f64, SensorError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SensorError::Parse(String::new())))
        }
    }

    #[tokio::test]
    async fn test_measure_skips_failed_samples() {
        tokio::time::pause();

        let source = Scripted::new(vec![
            Ok(50.0),
            Err(SensorError::Parse("n/a".into())),
            Ok(70.0),
            Err(SensorError::OutOfRange(-1.0)),
            Ok(10.0),
        ]);
        let meter = LevelMeter::new(source, TankGeometry::new(100.0, 0.0), 5);

        let start = tokio::time::Instant::now();
        let reading = meter.measure().await.unwrap();
        let elapsed = start.elapsed();

        // Median of 50, 70, 10; the failed reads do not count
        assert_eq!(reading.distance_cm, 50.0);
        assert_eq!(reading.percent, 50.0);

        // Four gaps between five samples
        assert!(elapsed >= SAMPLE_DELAY * 4, "elapsed {:?}", elapsed);
        assert!(elapsed < SAMPLE_DELAY * 5, "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_measure_even_successes_average() {
        tokio::time::pause();

        let source = Scripted::new(vec![
            Ok(40.0),
            Err(SensorError::Parse(String::new())),
            Ok(60.0),
        ]);
        let meter = LevelMeter::new(source, TankGeometry::new(100.0, 0.0), 3);
        assert_eq!(meter.measure().await.unwrap().distance_cm, 50.0);
    }

    #[tokio::test]
    async fn test_measure_from_file() {
        let path = std::env::temp_dir().join(format!("medidor-nivel-{}-meter", std::process::id()));
        std::fs::write(&path, "60\n").unwrap();

        let meter = LevelMeter::new(
            SensorSource::new(&path, 1.0),
            TankGeometry::new(100.0, 0.0),
            3,
        );
        let reading = meter.measure().await.unwrap();
        assert_eq!(reading.distance_cm, 60.0);
        assert_eq!(reading.level_cm, 40.0);
        assert_eq!(reading.percent, 40.0);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_measure_no_samples() {
        tokio::time::pause();

        let meter = LevelMeter::new(
            SensorSource::new("/nonexistent/medidor-nivel/meter", 1.0),
            TankGeometry::new(100.0, 0.0),
            4,
        );
        assert!(matches!(
            meter.measure().await,
            Err(SensorError::NoSamples(4))
        ));
    }

    #[test]
    fn test_zero_samples_means_one() {
        let meter = LevelMeter::new(
            SensorSource::new("/dev/null", 1.0),
            TankGeometry::new(100.0, 0.0),
            0,
        );
        assert_eq!(meter.samples, 1);
    }
}
