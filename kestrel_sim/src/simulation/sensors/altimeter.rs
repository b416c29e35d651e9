// kestrel_sim/src/simulation/sensors/altimeter.rs

use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::MeasurementData;
use kestrel_core::models::measurement::height::HeightModel;
use kestrel_core::models::measurement::MeasurementModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AltimeterConfig {
    pub rate: f64,
    /// Meters.
    pub stddev: f64,
}

impl Default for AltimeterConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            stddev: 0.5,
        }
    }
}

/// A barometric altimeter reading the true height.
#[derive(Debug)]
pub struct Altimeter {
    name: String,
    stddev: f64,
    timer: SensorTimer,
    noise: Normal<f64>,
}

impl Altimeter {
    pub fn new(name: &str, config: &AltimeterConfig) -> Result<Self, SimError> {
        Ok(Self {
            name: name.to_string(),
            stddev: config.stddev,
            timer: SensorTimer::from_rate(name, config.rate)?,
            noise: gaussian(name, config.stddev)?,
        })
    }
}

impl SyntheticSensor for Altimeter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Box<dyn MeasurementModel> {
        let mut model = HeightModel::new();
        model.stddev = self.stddev;
        Box::new(model)
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        MeasurementData::Height(truth.position.z + self.noise.sample(&mut rng.0))
    }
}
