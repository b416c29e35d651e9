// kestrel_sim/src/simulation/sensors/pose.rs

use nalgebra::{UnitQuaternion, Vector3};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{gaussian, SensorTimer, SyntheticSensor};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::SimError;
use kestrel_core::messages::{MeasurementData, PoseFix};
use kestrel_core::models::measurement::pose_update::PoseUpdateModel;
use kestrel_core::models::measurement::MeasurementModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoseConfig {
    pub rate: f64,
    /// Meters. Zero leaves the channel out of every reading.
    pub position_xy_stddev: f64,
    pub position_z_stddev: f64,
    /// Degrees.
    pub yaw_stddev: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            position_xy_stddev: 0.5,
            position_z_stddev: 0.5,
            yaw_stddev: 2.0,
        }
    }
}

/// An external localization source, e.g. a SLAM frontend, reporting a full
/// pose with its uncertainty.
#[derive(Debug)]
pub struct PoseSensor {
    name: String,
    /// Horizontal, vertical and yaw standard deviations, yaw in radians.
    stddevs: [f64; 3],
    timer: SensorTimer,
    noise: [Normal<f64>; 3],
}

impl PoseSensor {
    pub fn new(name: &str, config: &PoseConfig) -> Result<Self, SimError> {
        let stddevs = [
            config.position_xy_stddev,
            config.position_z_stddev,
            config.yaw_stddev.to_radians(),
        ];
        Ok(Self {
            name: name.to_string(),
            stddevs,
            timer: SensorTimer::from_rate(name, config.rate)?,
            noise: [
                gaussian(name, stddevs[0])?,
                gaussian(name, stddevs[1])?,
                gaussian(name, stddevs[2])?,
            ],
        })
    }
}

impl SyntheticSensor for PoseSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Box<dyn MeasurementModel> {
        Box::new(PoseUpdateModel::new())
    }

    fn timer(&mut self) -> &mut SensorTimer {
        &mut self.timer
    }

    fn measure(&mut self, truth: &TruthState, rng: &mut SimulationRng) -> MeasurementData {
        let [xy, z, yaw] = &self.noise;
        let offset = Vector3::new(
            xy.sample(&mut rng.0),
            xy.sample(&mut rng.0),
            z.sample(&mut rng.0),
        );
        let yaw = truth.yaw + yaw.sample(&mut rng.0);
        MeasurementData::Pose(PoseFix {
            position: truth.position + offset,
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
            position_xy_stddev: self.stddevs[0],
            position_z_stddev: self.stddevs[1],
            yaw_stddev: self.stddevs[2],
        })
    }
}
