// kestrel_sim/src/simulation/sensors/position.rs

use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::MeasurementData;
use kestrel_core::models::measurement::position::PositionModel;
use kestrel_core::models::measurement::MeasurementModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PositionConfig {
    pub rate: f64,
    /// Meters, applied to each axis.
    pub stddev: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            stddev: 0.5,
        }
    }
}

/// A local positioning system, e.g. motion capture, in the navigation frame.
#[derive(Debug)]
pub struct PositionSensor {
    name: String,
    stddev: f64,
    timer: SensorTimer,
    noise: Normal<f64>,
}

impl PositionSensor {
    pub fn new(name: &str, config: &PositionConfig) -> Result<Self, SimError> {
        Ok(Self {
            name: name.to_string(),
            stddev: config.stddev,
            timer: SensorTimer::from_rate(name, config.rate)?,
            noise: gaussian(name, config.stddev)?,
        })
    }
}

impl SyntheticSensor for PositionSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Box<dyn MeasurementModel> {
        let mut model = PositionModel::new();
        model.stddev = self.stddev;
        Box::new(model)
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        let noise = Vector3::from_fn(|_, _| self.noise.sample(&mut rng.0));
        MeasurementData::Position(truth.position + noise)
    }
}
