//! Sensor module - distance source, tank geometry and the level meter

mod level;
mod meter;
mod source;

pub use level::{LevelReading, TankGeometry};
pub use meter::LevelMeter;
pub use source::SensorSource;
