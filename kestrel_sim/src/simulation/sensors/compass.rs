// kestrel_sim/src/simulation/sensors/compass.rs

use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::MeasurementData;
use kestrel_core::models::measurement::heading::HeadingModel;
use kestrel_core::models::measurement::MeasurementModel;
use kestrel_core::utils::kinematics::wrap_angle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompassConfig {
    pub rate: f64,
    /// Degrees.
    pub stddev: f64,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            stddev: 2.0,
        }
    }
}

/// An absolute heading sensor.
#[derive(Debug)]
pub struct Compass {
    name: String,
    stddev: f64,
    timer: SensorTimer,
    noise: Normal<f64>,
}

impl Compass {
    pub fn new(name: &str, config: &CompassConfig) -> Result<Self, SimError> {
        let stddev = config.stddev.to_radians();
        Ok(Self {
            name: name.to_string(),
            stddev,
            timer: SensorTimer::from_rate(name, config.rate)?,
            noise: gaussian(name, stddev)?,
        })
    }
}

impl SyntheticSensor for Compass {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Box<dyn MeasurementModel> {
        let mut model = HeadingModel::new();
        model.stddev = self.stddev;
        Box::new(model)
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        MeasurementData::Heading(wrap_angle(truth.yaw + self.noise.sample(&mut rng.0)))
    }
}
