// kestrel_sim/src/simulation/sensors/mod.rs

//! Synthetic sensors. Each one samples the ground truth at its own rate, adds
//! Gaussian noise and hands the reading to the estimator model it pairs with.

pub mod accelerometer;
pub mod altimeter;
pub mod compass;
pub mod gps;
pub mod gyro;
pub mod imu;
pub mod magnetometer;
pub mod pose;
pub mod position;

use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::simulation::config::ScenarioConfig;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::{MeasurementData, MeasurementUpdate};
use kestrel_core::models::measurement::MeasurementModel;

use accelerometer::{Accelerometer, AccelerometerConfig};
use altimeter::{Altimeter, AltimeterConfig};
use compass::{Compass, CompassConfig};
use gps::{Gps, GpsConfig};
use gyro::{Gyro, GyroConfig};
use magnetometer::{Magnetometer, MagnetometerConfig};
use pose::{PoseConfig, PoseSensor};
use position::{PositionConfig, PositionSensor};

/// One `[sensors.<name>]` table of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorConfig {
    Altimeter(AltimeterConfig),
    Position(PositionConfig),
    Pose(PoseConfig),
    Gps(GpsConfig),
    Compass(CompassConfig),
    Magnetometer(MagnetometerConfig),
    Accelerometer(AccelerometerConfig),
    Gyro(GyroConfig),
}

/// A sensor that produces measurement updates from the ground truth.
pub trait SyntheticSensor: Debug {
    fn name(&self) -> &str;

    /// A fresh estimator model for this sensor's readings.
    fn model(&self) -> Box<dyn MeasurementModel>;

    fn timer(&mut self) -> &mut SensorTimer;

    /// One noisy reading of the truth.
    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData;

    /// Advances the sensor clock by `dt` and returns a reading when one is due.
    fn sample(
        &mut self,
        truth: &TruthState,
        dt: f64,
        rng: &mut SimulationRng,
    ) -> Option<MeasurementUpdate> {
        if self.timer().tick(dt) {
            Some(self.measure(truth, rng).into())
        } else {
            None
        }
    }
}

/// A repeating timer driven by the simulation clock.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTimer {
    period: f64,
    elapsed: f64,
}

impl SensorTimer {
    /// Tolerance for accumulated rounding when comparing against the period.
    const SLACK: f64 = 1e-9;

    pub fn from_rate(name: &str, rate: f64) -> Result<Self, SimError> {
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(SimError::InvalidSensor {
                name: name.to_string(),
                reason: format!("rate must be positive, got {}", rate),
            });
        }
        Ok(Self {
            period: 1.0 / rate,
            elapsed: 0.0,
        })
    }

    /// Returns `true` once per elapsed period.
    pub fn tick(&mut self, dt: f64) -> bool {
        self.elapsed += dt;
        if self.elapsed + Self::SLACK >= self.period {
            self.elapsed = (self.elapsed - self.period).max(0.0);
            true
        } else {
            false
        }
    }
}

/// A zero-mean normal distribution, validated.
pub(crate) fn gaussian(name: &str, stddev: f64) -> Result<Normal<f64>, SimError> {
    // Normal::new only rejects non-finite values.
    if !(stddev >= 0.0 && stddev.is_finite()) {
        return Err(SimError::InvalidSensor {
            name: name.to_string(),
            reason: format!("standard deviation must be non-negative, got {}", stddev),
        });
    }
    Normal::new(0.0, stddev).map_err(|e| SimError::InvalidSensor {
        name: name.to_string(),
        reason: format!("invalid standard deviation {}: {}", stddev, e),
    })
}

/// Builds the sensor described by one `[sensors.<name>]` table.
pub fn build_sensor(
    name: &str,
    config: &SensorConfig,
    scenario: &ScenarioConfig,
) -> Result<Box<dyn SyntheticSensor>, SimError> {
    Ok(match config {
        SensorConfig::Altimeter(c) => Box::new(Altimeter::new(name, c)?),
        SensorConfig::Position(c) => Box::new(PositionSensor::new(name, c)?),
        SensorConfig::Pose(c) => Box::new(PoseSensor::new(name, c)?),
        SensorConfig::Gps(c) => Box::new(Gps::new(name, c, &scenario.reference)?),
        SensorConfig::Compass(c) => Box::new(Compass::new(name, c)?),
        SensorConfig::Magnetometer(c) => Box::new(Magnetometer::new(name, c)?),
        SensorConfig::Accelerometer(c) => Box::new(Accelerometer::new(name, c)?),
        SensorConfig::Gyro(c) => Box::new(Gyro::new(name, c)?),
    })
}
