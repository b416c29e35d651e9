// kestrel_sim/src/simulation/sensors/gyro.rs

use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::MeasurementData;
use kestrel_core::models::measurement::rate::RateModel;
use kestrel_core::models::measurement::MeasurementModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GyroConfig {
    pub rate: f64,
    /// Degrees per second.
    pub stddev: f64,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            rate: 50.0,
            stddev: 0.2,
        }
    }
}

/// A gyro measured against the rate partition of the state.
#[derive(Debug)]
pub struct Gyro {
    name: String,
    stddev: f64,
    timer: SensorTimer,
    noise: Normal<f64>,
}

impl Gyro {
    pub fn new(name: &str, config: &GyroConfig) -> Result<Self, SimError> {
        let stddev = config.stddev.to_radians();
        Ok(Self {
            name: name.to_string(),
            stddev,
            timer: SensorTimer::from_rate(name, config.rate)?,
            noise: gaussian(name, stddev)?,
        })
    }
}

impl SyntheticSensor for Gyro {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Box<dyn MeasurementModel> {
        let mut model = RateModel::new();
        model.stddev = self.stddev;
        Box::new(model)
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        let noise = Vector3::from_fn(|_, _| self.noise.sample(&mut rng.0));
        MeasurementData::Rate(truth.rate + noise)
    }
}
