// kestrel_sim/src/simulation/sensors/magnetometer.rs

use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::MeasurementData;
use kestrel_core::models::measurement::magnetic::MagneticModel;
use kestrel_core::models::measurement::MeasurementModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MagnetometerConfig {
    pub rate: f64,
    /// Per axis, in units of the field magnitude.
    pub stddev: f64,
    /// Degrees.
    pub declination: f64,
    /// Degrees.
    pub inclination: f64,
}

impl Default for MagnetometerConfig {
    fn default() -> Self {
        Self {
            rate: 20.0,
            stddev: 0.05,
            declination: 0.0,
            inclination: 60.0,
        }
    }
}

/// A three-axis magnetometer reading the earth field in the body frame.
#[derive(Debug)]
pub struct Magnetometer {
    name: String,
    model: MagneticModel,
    timer: SensorTimer,
    noise: Normal<f64>,
}

impl Magnetometer {
    pub fn new(name: &str, config: &MagnetometerConfig) -> Result<Self, SimError> {
        let mut model = MagneticModel::new();
        model.stddev = config.stddev;
        model.declination = config.declination.to_radians();
        model.inclination = config.inclination.to_radians();
        Ok(Self {
            name: name.to_string(),
            model,
            timer: SensorTimer::from_rate(name, config.rate)?,
            noise: gaussian(name, config.stddev)?,
        })
    }
}

impl SyntheticSensor for Magnetometer {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Box<dyn MeasurementModel> {
        Box::new(self.model.clone())
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        let field = truth.orientation.inverse() * self.model.field();
        let noise = Vector3::from_fn(|_, _| self.noise.sample(&mut rng.0));
        MeasurementData::Magnetic(field + noise)
    }
}
