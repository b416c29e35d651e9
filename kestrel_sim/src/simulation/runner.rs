// kestrel_sim/src/simulation/runner.rs

use std::fmt;
use tracing::{debug, info};

use crate::simulation::config::ScenarioConfig;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::truth::TruthState;
use crate::simulation::sensors::imu::Imu;
use crate::simulation::sensors::{build_sensor, SyntheticSensor};
use crate::SimError;
use kestrel_core::estimation::estimator::Estimator;
use kestrel_core::models::system::imu_bias::{AccelerometerBiasModel, GyroBiasModel};
use kestrel_core::models::system::quaternion::QuaternionKinematicsModel;
use kestrel_core::state::Partition;
use kestrel_core::status::SystemStatus;
use kestrel_core::utils::kinematics::{wrap_angle, yaw};

/// How the estimate compares to the truth at the end of a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub name: String,
    pub steps: usize,
    pub status: SystemStatus,
    /// Meters. `None` while the partition is not estimated.
    pub horizontal_error: Option<f64>,
    pub vertical_error: Option<f64>,
    /// Degrees.
    pub yaw_error: f64,
    pub accepted: usize,
    pub skipped: usize,
    pub diagnostics: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meters = |e: Option<f64>| e.map_or("-".to_string(), |e| format!("{:.3} m", e));
        writeln!(f, "Scenario '{}' ({} steps)", self.name, self.steps)?;
        writeln!(f, "  status:           {}", self.status)?;
        writeln!(f, "  horizontal error: {}", meters(self.horizontal_error))?;
        writeln!(f, "  vertical error:   {}", meters(self.vertical_error))?;
        writeln!(f, "  yaw error:        {:.2} deg", self.yaw_error)?;
        write!(
            f,
            "  updates:          {} accepted, {} skipped, {} diagnostics",
            self.accepted, self.skipped, self.diagnostics
        )
    }
}

/// Drives one scenario: truth, sensors and estimator in lockstep.
#[derive(Debug)]
pub struct ScenarioRunner {
    config: ScenarioConfig,
    estimator: Estimator,
    imu: Imu,
    sensors: Vec<Box<dyn SyntheticSensor>>,
    rng: SimulationRng,
}

impl ScenarioRunner {
    pub fn new(config: ScenarioConfig) -> Result<Self, SimError> {
        config.validate()?;

        let mut system = QuaternionKinematicsModel::new();
        if config.system.gyro_bias {
            system = system.with_sub_model(Box::new(GyroBiasModel::default()));
        }
        if config.system.accelerometer_bias {
            system = system.with_sub_model(Box::new(AccelerometerBiasModel::default()));
        }
        let mut estimator = Estimator::new(config.estimator.clone(), Box::new(system))?;

        // The surveyed origin. GPS models with auto_reference still re-derive it.
        estimator
            .global_reference_mut()
            .set_position(
                config.reference.latitude.to_radians(),
                config.reference.longitude.to_radians(),
            )
            .set_altitude(config.reference.altitude);

        let mut sensors = Vec::with_capacity(config.sensors.len());
        for (name, sensor_config) in &config.sensors {
            let sensor = build_sensor(name, sensor_config, &config)?;
            estimator.add_measurement(name, sensor.model());
            sensors.push(sensor);
        }
        for (path, value) in &config.parameters {
            debug!("Overriding parameter {} = {}", path, value);
            estimator.set_parameter(path, *value)?;
        }

        Ok(Self {
            imu: Imu::new(&config.imu)?,
            rng: SimulationRng::from_seed(config.simulation.seed),
            config,
            estimator,
            sensors,
        })
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Runs the scenario to its end.
    pub fn run(mut self) -> Result<RunSummary, SimError> {
        let dt = 1.0 / self.config.simulation.rate;
        let steps = self.config.steps();
        info!(
            "Running scenario '{}': {} steps of {:.4} s with {} sensors",
            self.config.simulation.name,
            steps,
            dt,
            self.sensors.len()
        );

        let (mut accepted, mut skipped) = (0, 0);
        let mut truth = self.config.motion.state_at(0.0);
        for k in 1..=steps {
            truth = self.config.motion.state_at(k as f64 * dt);
            let input = self.imu.sample(&truth, &mut self.rng);
            for sensor in self.sensors.iter_mut() {
                if let Some(update) = sensor.sample(&truth, dt, &mut self.rng) {
                    self.estimator.add_update(sensor.name(), update)?;
                }
            }
            for report in self.estimator.update(input, dt) {
                if report.outcome.is_accepted() {
                    accepted += 1;
                } else {
                    skipped += 1;
                }
            }
        }

        let summary = self.summarize(&truth, steps, accepted, skipped);
        info!(
            "Scenario '{}' finished with status {}",
            summary.name, summary.status
        );
        Ok(summary)
    }

    fn summarize(
        &self,
        truth: &TruthState,
        steps: usize,
        accepted: usize,
        skipped: usize,
    ) -> RunSummary {
        let pose = self.estimator.pose();
        let state = self.estimator.filter().state();

        let horizontal_error = match pose.position {
            Some(p) if state.is_enabled(Partition::HorizontalPosition) => {
                Some((p.xy() - truth.position.xy()).norm())
            }
            _ => None,
        };
        let vertical_error = match pose.position {
            Some(p) if state.is_enabled(Partition::VerticalPosition) => {
                Some((p.z - truth.position.z).abs())
            }
            _ => None,
        };
        let yaw_error = pose
            .orientation
            .map(|q| wrap_angle(yaw(q.quaternion()) - truth.yaw).to_degrees())
            .unwrap_or(0.0);

        RunSummary {
            name: self.config.simulation.name.clone(),
            steps,
            status: pose.status,
            horizontal_error,
            vertical_error,
            yaw_error,
            accepted,
            skipped,
            diagnostics: self.estimator.diagnostics().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::parse_scenario;

    fn run(text: &str) -> RunSummary {
        let config = parse_scenario(text).unwrap();
        ScenarioRunner::new(config).unwrap().run().unwrap()
    }

    const HOVER: &str = r#"
        [simulation]
        name = "hover"
        duration = 10.0

        [motion]
        initial_position = [0.0, 0.0, 2.0]

        [sensors.baro]
        type = "altimeter"
        stddev = 0.3
    "#;

    #[test]
    fn test_hover_converges_on_height() {
        let summary = run(HOVER);
        assert!(summary.vertical_error.unwrap() < 0.5, "{}", summary);
        assert_eq!(summary.horizontal_error, None);
        assert!(summary.status.contains(SystemStatus::Z_POSITION));
        assert_eq!(summary.accepted, 100);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        assert_eq!(run(HOVER), run(HOVER));
    }

    #[test]
    fn test_spinning_body_tracks_yaw() {
        let summary = run(
            r#"
            [simulation]
            name = "spin"
            duration = 20.0

            [motion]
            yaw_rate = 20.0

            [sensors.compass]
            type = "compass"
            "#,
        );
        assert!(summary.yaw_error.abs() < 5.0, "{}", summary);
        assert!(summary.status.contains(SystemStatus::YAW));
    }

    #[test]
    fn test_driving_with_gps_reaches_ready() {
        let summary = run(
            r#"
            [simulation]
            name = "drive"
            duration = 20.0

            [motion]
            speed = 2.0

            [sensors.baro]
            type = "altimeter"

            [sensors.compass]
            type = "compass"

            [sensors.gps]
            type = "gps"
            position_stddev = 1.0

            [parameters]
            "gps/auto_reference" = 0.0
            "#,
        );
        assert!(summary.status.contains(SystemStatus::READY), "{}", summary);
        assert!(summary.horizontal_error.unwrap() < 5.0, "{}", summary);
        assert!(summary.yaw_error.abs() < 5.0, "{}", summary);
    }

    #[test]
    fn test_external_pose_alone_reaches_ready() {
        let summary = run(
            r#"
            [simulation]
            name = "slam"
            duration = 20.0

            [motion]
            speed = 1.0
            yaw_rate = 5.0

            [sensors.slam]
            type = "pose"
            "#,
        );
        assert!(summary.status.contains(SystemStatus::READY), "{}", summary);
        assert!(summary.horizontal_error.unwrap() < 2.0, "{}", summary);
        assert!(summary.vertical_error.unwrap() < 1.0, "{}", summary);
        assert!(summary.yaw_error.abs() < 10.0, "{}", summary);
    }

    #[test]
    fn test_negative_sensor_noise_fails() {
        let config = parse_scenario(
            r#"
            [sensors.baro]
            type = "altimeter"
            stddev = -0.3
            "#,
        )
        .unwrap();
        assert!(matches!(
            ScenarioRunner::new(config),
            Err(SimError::InvalidSensor { .. })
        ));
    }

    #[test]
    fn test_unknown_parameter_override_fails() {
        let config = parse_scenario(
            r#"
            [parameters]
            "baro/stddev" = 1.0
            "#,
        )
        .unwrap();
        assert!(ScenarioRunner::new(config).is_err());
    }
}
