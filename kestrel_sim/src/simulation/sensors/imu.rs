// kestrel_sim/src/simulation/sensors/imu.rs

use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::gaussian;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::types::{SystemInput, GRAVITY};

/// The IMU driving the prediction. It is sampled once per estimator cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImuConfig {
    /// Degrees per second.
    pub gyro_stddev: f64,
    /// m/s^2.
    pub accel_stddev: f64,
    /// Constant gyro offset, degrees per second.
    pub gyro_bias: [f64; 3],
    /// Constant accelerometer offset, m/s^2.
    pub accel_bias: [f64; 3],
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            gyro_stddev: 0.05,
            accel_stddev: 0.02,
            gyro_bias: [0.0; 3],
            accel_bias: [0.0; 3],
        }
    }
}

/// Proper acceleration in the body frame: what an ideal accelerometer reads.
pub fn specific_force(truth: &TruthState) -> Vector3<f64> {
    // At rest this is `[0, 0, +9.8065]`.
    let gravity = Vector3::new(0.0, 0.0, GRAVITY);
    truth.orientation.inverse() * (truth.acceleration - gravity)
}

#[derive(Debug)]
pub struct Imu {
    gyro_bias: Vector3<f64>,
    accel_bias: Vector3<f64>,
    gyro_noise: Normal<f64>,
    accel_noise: Normal<f64>,
}

impl Imu {
    pub fn new(config: &ImuConfig) -> Result<Self, SimError> {
        Ok(Self {
            gyro_bias: Vector3::from(config.gyro_bias).map(f64::to_radians),
            accel_bias: Vector3::from(config.accel_bias),
            gyro_noise: gaussian("imu", config.gyro_stddev.to_radians())?,
            accel_noise: gaussian("imu", config.accel_stddev)?,
        })
    }

    pub fn sample(&self, truth: &TruthState, rng: &mut SimulationRng) -> SystemInput {
        let gyro_noise = Vector3::from_fn(|_, _| self.gyro_noise.sample(&mut rng.0));
        let accel_noise = Vector3::from_fn(|_, _| self.accel_noise.sample(&mut rng.0));
        SystemInput::new(
            truth.rate + self.gyro_bias + gyro_noise,
            specific_force(truth) + self.accel_bias + accel_noise,
        )
    }
}
