// kestrel_core/src/models/system/imu_bias.rs

use std::f64::consts::PI;

use crate::error::{KestrelError, Result};
use crate::models::system::{BiasModel, BiasQuantity};
use crate::parameters::ParameterList;

/// Name of the gyroscope bias extension.
pub const GYRO_BIAS: &str = "gyro";
/// Name of the accelerometer bias extension.
pub const ACCELEROMETER_BIAS: &str = "accelerometer";

/// Estimates an additive gyroscope bias: `ω = ω_imu + b`.
#[derive(Debug, Clone)]
pub struct GyroBiasModel {
    pub rate_drift: f64,
    pub prior_stddev: f64,
}

impl Default for GyroBiasModel {
    fn default() -> Self {
        Self {
            rate_drift: 1.0e-2 * PI / 180.0,
            prior_stddev: 5.0 * PI / 180.0,
        }
    }
}

impl BiasModel for GyroBiasModel {
    fn name(&self) -> &str {
        GYRO_BIAS
    }

    fn quantity(&self) -> BiasQuantity {
        BiasQuantity::Rate
    }

    fn prior_variance(&self) -> f64 {
        self.prior_stddev.powi(2)
    }

    fn drift(&self) -> f64 {
        self.rate_drift
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("rate_drift", self.rate_drift)
            .with("prior_stddev", self.prior_stddev)
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "rate_drift" => self.rate_drift = value,
            "prior_stddev" => self.prior_stddev = value,
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }
}

/// Estimates an additive accelerometer bias: `a = a_imu + b`.
#[derive(Debug, Clone)]
pub struct AccelerometerBiasModel {
    pub acceleration_drift: f64,
    pub prior_stddev: f64,
}

impl Default for AccelerometerBiasModel {
    fn default() -> Self {
        Self {
            acceleration_drift: 1.0e-6,
            prior_stddev: 0.1,
        }
    }
}

impl BiasModel for AccelerometerBiasModel {
    fn name(&self) -> &str {
        ACCELEROMETER_BIAS
    }

    fn quantity(&self) -> BiasQuantity {
        BiasQuantity::Acceleration
    }

    fn prior_variance(&self) -> f64 {
        self.prior_stddev.powi(2)
    }

    fn drift(&self) -> f64 {
        self.acceleration_drift
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("acceleration_drift", self.acceleration_drift)
            .with("prior_stddev", self.prior_stddev)
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "acceleration_drift" => self.acceleration_drift = value,
            "prior_stddev" => self.prior_stddev = value,
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PriorVariances, State, StateLayout};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_init_registers_seeded_extension() {
        let mut state = State::new(&StateLayout::default(), PriorVariances::default());
        let gyro = GyroBiasModel::default();
        gyro.init(&mut state).unwrap();

        let offset = state.extension_index(GYRO_BIAS).unwrap();
        assert_abs_diff_eq!(
            state.covariance()[(offset, offset)],
            (5.0 * PI / 180.0).powi(2),
            epsilon = 1e-15
        );

        state.vector_mut()[offset + 2] = 0.01;
        let bias = gyro.bias(&state, state.vector());
        assert_abs_diff_eq!(bias.z, 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_bias_is_zero_without_extension() {
        let state = State::new(&StateLayout::default(), PriorVariances::default());
        let accel = AccelerometerBiasModel::default();
        assert_eq!(accel.bias(&state, state.vector()), nalgebra::Vector3::zeros());
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let mut accel = AccelerometerBiasModel::default();
        accel.set_parameter("acceleration_drift", 0.5).unwrap();
        assert_eq!(accel.parameters().get("acceleration_drift"), Some(0.5));
        assert!(matches!(
            accel.set_parameter("rate_drift", 0.1),
            Err(KestrelError::UnknownParameter(_))
        ));
    }
}
