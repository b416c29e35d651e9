// kestrel_sim/src/simulation/sensors/accelerometer.rs

use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::imu::specific_force;
use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::MeasurementData;
use kestrel_core::models::measurement::gravity::GravityModel;
use kestrel_core::models::measurement::MeasurementModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccelerometerConfig {
    pub rate: f64,
    /// m/s^2 per axis.
    pub stddev: f64,
}

impl Default for AccelerometerConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            stddev: 0.1,
        }
    }
}

/// An accelerometer used as a gravity reference for roll and pitch.
#[derive(Debug)]
pub struct Accelerometer {
    name: String,
    timer: SensorTimer,
    noise: Normal<f64>,
}

impl Accelerometer {
    pub fn new(name: &str, config: &AccelerometerConfig) -> Result<Self, SimError> {
        Ok(Self {
            name: name.to_string(),
            timer: SensorTimer::from_rate(name, config.rate)?,
            noise: gaussian(name, config.stddev)?,
        })
    }
}

impl SyntheticSensor for Accelerometer {
    fn name(&self) -> &str {
        &self.name
    }

    /// The model keeps its own, deliberately loose noise: the reading also
    /// contains the vehicle's own acceleration.
    fn model(&self) -> Box<dyn MeasurementModel> {
        Box::new(GravityModel::new())
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        let noise = Vector3::from_fn(|_, _| self.noise.sample(&mut rng.0));
        MeasurementData::Gravity(specific_force(truth) + noise)
    }
}
