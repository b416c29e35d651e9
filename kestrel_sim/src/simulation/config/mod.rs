// kestrel_sim/src/simulation/config/mod.rs

//! This module handles loading and validating scenario configuration from disk.

mod catalog;

use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::simulation::core::truth::MotionConfig;
use crate::simulation::sensors::imu::ImuConfig;
use crate::simulation::sensors::SensorConfig;
use crate::SimError;
use kestrel_core::config::EstimatorConfig;

pub use catalog::discover_scenarios;

/// A complete scenario file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub simulation: SimulationConfig,
    pub motion: MotionConfig,
    pub imu: ImuConfig,
    pub system: SystemConfig,
    pub reference: ReferenceConfig,
    pub estimator: EstimatorConfig,
    /// Synthetic sensors, registered with the estimator under their key in
    /// alphabetical order.
    pub sensors: BTreeMap<String, SensorConfig>,
    /// Estimator parameter overrides, e.g. `"gps/position_stddev" = 2.0`.
    pub parameters: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub name: String,
    /// Simulated seconds.
    pub duration: f64,
    /// Estimator cycles per second. The IMU is sampled once per cycle.
    pub rate: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            duration: 10.0,
            rate: 100.0,
            seed: 42,
        }
    }
}

/// Bias sub-models added to the quaternion kinematics model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    pub gyro_bias: bool,
    pub accelerometer_bias: bool,
}

/// Geodetic origin of the simulated world, used to synthesize GPS fixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceConfig {
    /// Degrees.
    pub latitude: f64,
    /// Degrees.
    pub longitude: f64,
    pub altitude: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            latitude: 49.86,
            longitude: 8.68,
            altitude: 0.0,
        }
    }
}

impl ScenarioConfig {
    /// Number of estimator cycles in the scenario.
    pub fn steps(&self) -> usize {
        (self.simulation.duration * self.simulation.rate).round() as usize
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let sim = &self.simulation;
        if !(sim.duration > 0.0 && sim.duration.is_finite()) {
            return Err(SimError::InvalidSimulation(format!(
                "duration must be positive, got {}",
                sim.duration
            )));
        }
        if !(sim.rate > 0.0 && sim.rate.is_finite()) {
            return Err(SimError::InvalidSimulation(format!(
                "rate must be positive, got {}",
                sim.rate
            )));
        }
        Ok(())
    }
}

/// Loads and validates a scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, SimError> {
    if !path.is_file() {
        return Err(SimError::InvalidSimulation(format!(
            "scenario file {} not found",
            path.display()
        )));
    }
    info!("Loading scenario from: {}", path.display());
    let config: ScenarioConfig = Figment::new().merge(Toml::file(path)).extract()?;
    config.validate()?;
    Ok(config)
}

/// Parses a scenario from TOML text.
pub fn parse_scenario(text: &str) -> Result<ScenarioConfig, SimError> {
    let config: ScenarioConfig = Figment::new().merge(Toml::string(text)).extract()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::status::SystemStatus;
    use kestrel_core::utils::integrators::IntegratorKind;

    #[test]
    fn test_empty_scenario_uses_defaults() {
        let config = parse_scenario("").unwrap();
        assert_eq!(config, ScenarioConfig::default());
        assert_eq!(config.steps(), 1000);
    }

    #[test]
    fn test_full_scenario_parses() {
        let text = r#"
            [simulation]
            name = "gps"
            duration = 2.0
            rate = 50.0

            [estimator]
            integrator = "rk1"
            alignment_time = 1.0
            forced_status = "ROLLPITCH | YAW"

            [estimator.layout]
            rate = true

            [sensors.fix]
            type = "gps"
            rate = 5.0
            position_stddev = 2.0

            [parameters]
            "fix/position_stddev" = 2.0
        "#;
        let config = parse_scenario(text).unwrap();
        assert_eq!(config.simulation.name, "gps");
        assert_eq!(config.steps(), 100);
        assert_eq!(config.estimator.integrator, IntegratorKind::Rk1);
        assert_eq!(
            config.estimator.forced_status,
            SystemStatus::ROLLPITCH | SystemStatus::YAW
        );
        assert!(config.estimator.layout.rate);
        assert!(matches!(config.sensors.get("fix"), Some(SensorConfig::Gps(_))));
        assert_eq!(config.parameters.get("fix/position_stddev"), Some(&2.0));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(parse_scenario("[simulation]\nspeed = 3.0\n").is_err());
        assert!(parse_scenario("[estimator]\nintegrator = \"rk8\"\n").is_err());
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        assert!(matches!(
            parse_scenario("[simulation]\nrate = 0.0\n"),
            Err(SimError::InvalidSimulation(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_scenario(Path::new("does/not/exist.toml")).is_err());
    }
}
