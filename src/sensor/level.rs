//! Tank geometry and level readings

use serde::Serialize;
use tracing::warn;

/// Tank as seen from a downward-facing distance sensor
#[derive(Debug, Clone, Copy)]
pub struct TankGeometry {
    /// Sensor face to tank bottom
    pub height_cm: f64,
    /// Sensor face to the "full" mark
    pub offset_cm: f64,
}

/// One level measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReading {
    pub distance_cm: f64,
    pub level_cm: f64,
    pub percent: f64,
    /// Unix seconds
    pub timestamp: u64,
}

impl TankGeometry {
    pub fn new(height_cm: f64, offset_cm: f64) -> Self {
        Self {
            height_cm,
            offset_cm,
        }
    }

    /// Usable liquid column between the bottom and the full mark
    pub fn capacity_cm(&self) -> f64 {
        self.height_cm - self.offset_cm
    }

    /// Convert a measured distance into a reading
    ///
    /// Distances outside `[offset, height]` clamp to full or empty.
    pub fn reading(&self, distance_cm: f64) -> LevelReading {
        if distance_cm < self.offset_cm || distance_cm > self.height_cm {
            warn!(
                "Distance {} cm outside tank range [{}, {}], clamping",
                distance_cm, self.offset_cm, self.height_cm
            );
        }

        let capacity = self.capacity_cm();
        let level_cm = (self.height_cm - distance_cm).clamp(0.0, capacity);
        let percent = round1(level_cm / capacity * 100.0);

        LevelReading {
            distance_cm,
            level_cm: round1(level_cm),
            percent,
            timestamp: unix_now(),
        }
    }
}

/// Median of the finite samples, `None` if there are none
pub fn median(samples: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_half_full() {
        let tank = TankGeometry::new(200.0, 20.0);
        let r = tank.reading(110.0);
        assert_eq!(r.distance_cm, 110.0);
        assert_eq!(r.level_cm, 90.0);
        assert_eq!(r.percent, 50.0);
    }

    #[test]
    fn test_reading_clamps() {
        let tank = TankGeometry::new(200.0, 20.0);

        let over = tank.reading(5.0);
        assert_eq!(over.level_cm, 180.0);
        assert_eq!(over.percent, 100.0);
        assert_eq!(over.distance_cm, 5.0);

        let under = tank.reading(250.0);
        assert_eq!(under.level_cm, 0.0);
        assert_eq!(under.percent, 0.0);
    }

    #[test]
    fn test_reading_rounds_percent() {
        let tank = TankGeometry::new(300.0, 0.0);
        let r = tank.reading(200.0);
        assert_eq!(r.percent, 33.3);
    }

    #[test]
    fn test_reading_serializes() {
        let tank = TankGeometry::new(100.0, 0.0);
        let json = serde_json::to_value(tank.reading(25.0)).unwrap();
        assert_eq!(json["distance_cm"], 25.0);
        assert_eq!(json["level_cm"], 75.0);
        assert_eq!(json["percent"], 75.0);
        assert!(json["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN]), None);
        assert_eq!(median(&[3.0]), Some(3.0));
        assert_eq!(median(&[9.0, 1.0, 5.0]), Some(5.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        // A single echo glitch does not move the result
        assert_eq!(median(&[100.0, 101.0, 400.0, 99.0, 100.0]), Some(100.0));
    }
}
