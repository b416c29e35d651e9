// kestrel_sim/src/simulation/sensors/gps.rs

use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::config::ReferenceConfig;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::global_reference::GlobalReference;
use kestrel_core::messages::{GpsFix, MeasurementData};
use kestrel_core::models::measurement::gps::GpsModel;
use kestrel_core::models::measurement::MeasurementModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpsConfig {
    pub rate: f64,
    /// Meters, horizontal.
    pub position_stddev: f64,
    /// m/s, horizontal.
    pub velocity_stddev: f64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            rate: 5.0,
            position_stddev: 2.0,
            velocity_stddev: 0.2,
        }
    }
}

/// A GNSS receiver. The truth is converted to geodetic coordinates around
/// the scenario's reference.
#[derive(Debug)]
pub struct Gps {
    name: String,
    config: GpsConfig,
    reference: GlobalReference,
    timer: SensorTimer,
    position_noise: Normal<f64>,
    velocity_noise: Normal<f64>,
}

impl Gps {
    pub fn new(name: &str, config: &GpsConfig, origin: &ReferenceConfig) -> Result<Self, SimError> {
        let mut reference = GlobalReference::new();
        reference
            .set_position(origin.latitude.to_radians(), origin.longitude.to_radians())
            .set_altitude(origin.altitude);
        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            reference,
            timer: SensorTimer::from_rate(name, config.rate)?,
            position_noise: gaussian(name, config.position_stddev)?,
            velocity_noise: gaussian(name, config.velocity_stddev)?,
        })
    }

    pub fn reference(&self) -> &GlobalReference {
        &self.reference
    }
}

impl SyntheticSensor for Gps {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Box<dyn MeasurementModel> {
        let mut model = GpsModel::new();
        model.position_stddev = self.config.position_stddev;
        model.velocity_stddev = self.config.velocity_stddev;
        Box::new(model)
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        let x = truth.position.x + self.position_noise.sample(&mut rng.0);
        let y = truth.position.y + self.position_noise.sample(&mut rng.0);
        let vx = truth.velocity.x + self.velocity_noise.sample(&mut rng.0);
        let vy = truth.velocity.y + self.velocity_noise.sample(&mut rng.0);

        let (latitude, longitude) = self.reference.to_wgs84(x, y);
        let (velocity_north, velocity_east) = self.reference.to_north_east(vx, vy);
        MeasurementData::Gps(GpsFix {
            latitude,
            longitude,
            velocity_north,
            velocity_east,
        })
    }
}
