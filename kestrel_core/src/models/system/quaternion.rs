// kestrel_core/src/models/system/quaternion.rs

use std::f64::consts::PI;

use crate::error::{KestrelError, Result};
use crate::models::system::{BiasCorrection, BiasModel, BiasQuantity, SystemModel};
use crate::parameters::{split_key, ParameterList};
use crate::state::{quaternion_at, vector3_at, Partition, State};
use crate::status::SystemStatus;
use crate::types::{Jacobian, StateVector, SystemInput, GRAVITY};
use crate::utils::kinematics::{
    quaternion_derivative, quaternion_transition, rate_coupling, rotation_jacobian,
    rotation_matrix,
};

/// Rigid-body kinematics driven by an IMU, with the orientation as a quaternion.
///
/// * `q_dot = 0.5 * Ω(ω) * q`
/// * `v_dot = R(q) * a + g` (gravity on the vertical axis only)
/// * `p_dot = v`
///
/// `ω` is the rate partition when it is active, otherwise the raw gyro input
/// plus the gyro bias. `a` is always the raw accelerometer input plus the
/// accelerometer bias. Only active partitions have non-zero derivatives.
#[derive(Debug, Clone)]
pub struct QuaternionKinematicsModel {
    pub gravity: f64,
    /// Gyro noise, propagated into the quaternion.
    pub rate_stddev: f64,
    pub angular_acceleration_stddev: f64,
    /// Random-walk leak on the position.
    pub velocity_stddev: f64,
    pub acceleration_stddev: f64,
    sub_models: Vec<Box<dyn BiasModel>>,
    // Constant part of the noise diagonal, rebuilt on init.
    noise: StateVector,
}

impl Default for QuaternionKinematicsModel {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            rate_stddev: 0.15 * PI / 180.0,
            angular_acceleration_stddev: 360.0 * PI / 180.0,
            velocity_stddev: 0.0,
            acceleration_stddev: 1.0e-2,
            sub_models: Vec::new(),
            noise: StateVector::zeros(0),
        }
    }
}

impl QuaternionKinematicsModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `add_sub_model`. Duplicate names are ignored here and
    /// rejected by `add_sub_model`.
    pub fn with_sub_model(mut self, model: Box<dyn BiasModel>) -> Self {
        if !self.sub_models.iter().any(|m| m.name() == model.name()) {
            self.sub_models.push(model);
        }
        self
    }

    fn bias_correction(&self, state: &State, x: &StateVector) -> BiasCorrection {
        let mut correction = BiasCorrection::default();
        for model in &self.sub_models {
            let bias = model.bias(state, x);
            match model.quantity() {
                BiasQuantity::Rate => correction.rate += bias,
                BiasQuantity::Acceleration => correction.acceleration += bias,
            }
        }
        correction
    }

    /// Offsets of the extensions owned by sub-models of the given kind.
    fn bias_offsets(&self, state: &State, quantity: BiasQuantity) -> Vec<usize> {
        self.sub_models
            .iter()
            .filter(|m| m.quantity() == quantity)
            .filter_map(|m| state.extension_index(m.name()))
            .collect()
    }

    fn rate_is_estimated(state: &State) -> bool {
        state.rate_index().is_some() && state.is_enabled(Partition::Rate)
    }
}

impl SystemModel for QuaternionKinematicsModel {
    fn init(&mut self, state: &mut State) -> Result<()> {
        if state.orientation_index().is_none() {
            return Err(KestrelError::Configuration {
                model: self.name().to_string(),
                reason: "the state has no orientation partition".to_string(),
            });
        }
        for model in &self.sub_models {
            if state.extension(model.name()).is_none() {
                model.init(state)?;
            }
        }
        self.noise = StateVector::zeros(0);
        Ok(())
    }

    fn add_sub_model(&mut self, model: Box<dyn BiasModel>) -> Result<()> {
        if self.sub_models.iter().any(|m| m.name() == model.name()) {
            return Err(KestrelError::DuplicateName(model.name().to_string()));
        }
        self.sub_models.push(model);
        Ok(())
    }

    fn sub_models(&self) -> &[Box<dyn BiasModel>] {
        &self.sub_models
    }

    fn parameters(&self) -> ParameterList {
        let mut list = ParameterList::new()
            .with("gravity", self.gravity)
            .with("rate_stddev", self.rate_stddev)
            .with("angular_acceleration_stddev", self.angular_acceleration_stddev)
            .with("velocity_stddev", self.velocity_stddev)
            .with("acceleration_stddev", self.acceleration_stddev);
        for model in &self.sub_models {
            list.extend_prefixed(model.name(), model.parameters());
        }
        list
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        if let Some((prefix, rest)) = split_key(key) {
            return match self.sub_models.iter_mut().find(|m| m.name() == prefix) {
                Some(model) => model.set_parameter(rest, value),
                None => Err(KestrelError::UnknownParameter(key.to_string())),
            };
        }
        match key {
            "gravity" => self.gravity = value,
            "rate_stddev" => self.rate_stddev = value,
            "angular_acceleration_stddev" => self.angular_acceleration_stddev = value,
            "velocity_stddev" => self.velocity_stddev = value,
            "acceleration_stddev" => self.acceleration_stddev = value,
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }

    fn status_flags(&self, state: &State) -> SystemStatus {
        let mut flags = state.measurement_status().partitions();

        if flags.contains(SystemStatus::Z_POSITION) {
            flags |= SystemStatus::Z_VELOCITY;
        }
        if flags.contains(SystemStatus::XY_POSITION) {
            flags |= SystemStatus::XY_VELOCITY;
        }
        if flags.contains(SystemStatus::XY_VELOCITY) {
            flags |= SystemStatus::ROLLPITCH;
        }
        if flags.contains(SystemStatus::ROLLPITCH) {
            flags |= SystemStatus::RATE_XY;
        }
        // Without a rate partition the rate always comes from the gyro.
        if state.rate_index().is_none() {
            flags |= SystemStatus::RATE;
        }
        flags
    }

    fn derivative(
        &self,
        state: &State,
        x: &StateVector,
        input: &SystemInput,
    ) -> (StateVector, BiasCorrection) {
        let mut x_dot = StateVector::zeros(state.dimension());
        let bias = self.bias_correction(state, x);

        let Some(qi) = state.orientation_index() else {
            return (x_dot, bias);
        };
        let q = quaternion_at(x, qi);

        let rate = match state.rate_index() {
            Some(ri) if Self::rate_is_estimated(state) => vector3_at(x, ri),
            _ => input.rate + bias.rate,
        };
        x_dot
            .fixed_rows_mut::<4>(qi)
            .copy_from(&quaternion_derivative(&q, &rate));

        if let Some(vi) = state.velocity_index() {
            let acceleration = rotation_matrix(&q) * (input.acceleration + bias.acceleration);
            if state.is_enabled(Partition::HorizontalVelocity) {
                x_dot[vi] = acceleration.x;
                x_dot[vi + 1] = acceleration.y;
            }
            if state.is_enabled(Partition::VerticalVelocity) {
                x_dot[vi + 2] = acceleration.z + self.gravity;
            }

            if let Some(pi) = state.position_index() {
                if state.is_enabled(Partition::HorizontalPosition) {
                    x_dot[pi] = x[vi];
                    x_dot[pi + 1] = x[vi + 1];
                }
                if state.is_enabled(Partition::VerticalPosition) {
                    x_dot[pi + 2] = x[vi + 2];
                }
            }
        }

        (x_dot, bias)
    }

    fn state_jacobian(&self, state: &State, input: &SystemInput) -> Jacobian {
        let n = state.dimension();
        let mut a = Jacobian::zeros(n, n);
        let Some(qi) = state.orientation_index() else {
            return a;
        };
        let x = state.vector();
        let q = quaternion_at(x, qi);
        let bias = self.bias_correction(state, x);

        // --- Quaternion rows ---
        let coupling = rate_coupling(&q);
        let rate = match state.rate_index() {
            Some(ri) if Self::rate_is_estimated(state) => {
                a.fixed_view_mut::<4, 3>(qi, ri).copy_from(&coupling);
                vector3_at(x, ri)
            }
            _ => {
                for bi in self.bias_offsets(state, BiasQuantity::Rate) {
                    a.fixed_view_mut::<4, 3>(qi, bi).copy_from(&coupling);
                }
                input.rate + bias.rate
            }
        };
        a.fixed_view_mut::<4, 4>(qi, qi)
            .copy_from(&quaternion_transition(&rate));

        // --- Velocity rows ---
        let Some(vi) = state.velocity_index() else {
            return a;
        };
        let specific_force = input.acceleration + bias.acceleration;
        let dv_dq = rotation_jacobian(&q, &specific_force);
        let rotation = rotation_matrix(&q);
        let accel_offsets = self.bias_offsets(state, BiasQuantity::Acceleration);

        for axis in 0..3 {
            let partition = if axis < 2 {
                Partition::HorizontalVelocity
            } else {
                Partition::VerticalVelocity
            };
            if !state.is_enabled(partition) {
                continue;
            }
            for k in 0..4 {
                a[(vi + axis, qi + k)] = dv_dq[(axis, k)];
            }
            for bi in &accel_offsets {
                for k in 0..3 {
                    a[(vi + axis, bi + k)] = rotation[(axis, k)];
                }
            }
        }

        // --- Position rows ---
        if let Some(pi) = state.position_index() {
            if state.is_enabled(Partition::HorizontalPosition) {
                a[(pi, vi)] = 1.0;
                a[(pi + 1, vi + 1)] = 1.0;
            }
            if state.is_enabled(Partition::VerticalPosition) {
                a[(pi + 2, vi + 2)] = 1.0;
            }
        }

        a
    }

    fn process_noise(&mut self, state: &State, init: bool) -> StateVector {
        let n = state.dimension();
        if init || self.noise.len() != n {
            let mut noise = StateVector::zeros(n);
            if let Some(ri) = state.rate_index() {
                noise
                    .rows_mut(ri, 3)
                    .fill(self.angular_acceleration_stddev.powi(2));
            }
            if let Some(pi) = state.position_index() {
                noise.rows_mut(pi, 3).fill(self.velocity_stddev.powi(2));
            }
            if let Some(vi) = state.velocity_index() {
                noise.rows_mut(vi, 3).fill(self.acceleration_stddev.powi(2));
            }
            for model in &self.sub_models {
                if let Some(ext) = state.extension(model.name()) {
                    noise.rows_mut(ext.offset, ext.dim).fill(model.drift().powi(2));
                }
            }
            self.noise = noise;
        }

        let mut noise = self.noise.clone();
        if let (Some(qi), true) = (state.orientation_index(), self.rate_stddev > 0.0) {
            let q = quaternion_at(state.vector(), qi);
            let (qw2, qx2, qy2, qz2) = (q.w * q.w, q.i * q.i, q.j * q.j, q.k * q.k);
            let variance = 0.25 * self.rate_stddev.powi(2);
            noise[qi] = variance * (qx2 + qy2 + qz2);
            noise[qi + 1] = variance * (qw2 + qy2 + qz2);
            noise[qi + 2] = variance * (qw2 + qx2 + qz2);
            noise[qi + 3] = variance * (qw2 + qx2 + qy2);
        }
        noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::system::imu_bias::{AccelerometerBiasModel, GyroBiasModel, GYRO_BIAS};
    use crate::state::{PriorVariances, StateLayout};
    use approx::assert_abs_diff_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    const EPSILON: f64 = 1e-9;

    fn model_with_biases() -> QuaternionKinematicsModel {
        QuaternionKinematicsModel::new()
            .with_sub_model(Box::new(GyroBiasModel::default()))
            .with_sub_model(Box::new(AccelerometerBiasModel::default()))
    }

    fn navigating_state(layout: StateLayout, model: &mut QuaternionKinematicsModel) -> State {
        let mut state = State::new(&layout, PriorVariances::default());
        model.init(&mut state).unwrap();
        state.set_system_status(SystemStatus::POSITION | SystemStatus::VELOCITY | SystemStatus::RATE);
        state
    }

    #[test]
    fn test_status_flags_apply_implications() {
        let model = QuaternionKinematicsModel::new();
        let mut state = State::new(&StateLayout::default(), PriorVariances::default());
        state.set_measurement_status(SystemStatus::XY_POSITION | SystemStatus::Z_POSITION);

        let flags = model.status_flags(&state);
        assert!(flags.contains(SystemStatus::XY_VELOCITY | SystemStatus::Z_VELOCITY));
        assert!(flags.contains(SystemStatus::ROLLPITCH));
        // No rate partition in the default layout, so both rate flags are forced on.
        assert!(flags.contains(SystemStatus::RATE));
        assert!(!flags.contains(SystemStatus::YAW));
    }

    #[test]
    fn test_rate_flags_follow_attitude_when_rate_is_estimated() {
        let model = QuaternionKinematicsModel::new();
        let layout = StateLayout {
            rate: true,
            ..StateLayout::default()
        };
        let mut state = State::new(&layout, PriorVariances::default());
        assert!(!model.status_flags(&state).intersects(SystemStatus::RATE));

        state.set_measurement_status(SystemStatus::ROLLPITCH);
        let flags = model.status_flags(&state);
        assert!(flags.contains(SystemStatus::RATE_XY));
        assert!(!flags.contains(SystemStatus::RATE_Z));
    }

    #[test]
    fn test_gravity_cancels_specific_force_at_rest() {
        let mut model = QuaternionKinematicsModel::new();
        let state = navigating_state(StateLayout::default(), &mut model);
        let input = SystemInput::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -GRAVITY));

        let (x_dot, bias) = model.derivative(&state, state.vector(), &input);
        assert_eq!(bias, BiasCorrection::default());
        for i in 0..x_dot.len() {
            assert_abs_diff_eq!(x_dot[i], 0.0, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_gravity_is_not_applied_while_vertical_velocity_is_inactive() {
        let mut model = QuaternionKinematicsModel::new();
        let mut state = State::new(&StateLayout::default(), PriorVariances::default());
        model.init(&mut state).unwrap();
        let (x_dot, _) = model.derivative(&state, state.vector(), &SystemInput::default());
        assert_abs_diff_eq!(x_dot[9], 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_gyro_bias_is_returned_and_applied() {
        let mut model = model_with_biases();
        let mut state = navigating_state(StateLayout::default(), &mut model);
        let offset = state.extension_index(GYRO_BIAS).unwrap();
        state.vector_mut()[offset + 2] = 0.2;

        let input = SystemInput::new(Vector3::new(0.0, 0.0, -0.2), Vector3::zeros());
        let (x_dot, bias) = model.derivative(&state, state.vector(), &input);
        assert_abs_diff_eq!(bias.rate.z, 0.2, epsilon = EPSILON);
        // Bias exactly cancels the raw rate.
        for i in 0..4 {
            assert_abs_diff_eq!(x_dot[i], 0.0, epsilon = EPSILON);
        }
    }

    /// Compares the analytic Jacobian with central differences of `derivative`.
    fn assert_jacobian_matches(layout: StateLayout) {
        let mut model = model_with_biases();
        let mut state = navigating_state(layout, &mut model);

        let q = UnitQuaternion::from_euler_angles(0.2, -0.4, 2.1);
        state.set_orientation(&q);
        state.set_velocity(&Vector3::new(1.0, -2.0, 0.5));
        state.set_rate(&Vector3::new(0.1, 0.3, -0.2));
        let n = state.dimension();
        for i in n - 6..n {
            state.vector_mut()[i] = 0.01 * (i as f64);
        }
        let input = SystemInput::new(Vector3::new(-0.3, 0.2, 0.9), Vector3::new(0.5, 1.5, 9.0));

        let analytic = model.state_jacobian(&state, &input);
        let h = 1e-6;
        for j in 0..n {
            let mut plus = state.vector().clone();
            let mut minus = state.vector().clone();
            plus[j] += h;
            minus[j] -= h;
            let (fp, _) = model.derivative(&state, &plus, &input);
            let (fm, _) = model.derivative(&state, &minus, &input);
            for i in 0..n {
                let numeric = (fp[i] - fm[i]) / (2.0 * h);
                assert_abs_diff_eq!(analytic[(i, j)], numeric, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_jacobian_with_external_rate_matches_finite_differences() {
        assert_jacobian_matches(StateLayout::default());
    }

    #[test]
    fn test_jacobian_with_estimated_rate_matches_finite_differences() {
        assert_jacobian_matches(StateLayout {
            rate: true,
            ..StateLayout::default()
        });
    }

    #[test]
    fn test_input_jacobian_is_a_configuration_error() {
        let model = QuaternionKinematicsModel::new();
        let state = State::new(&StateLayout::default(), PriorVariances::default());
        assert!(matches!(
            model.input_jacobian(&state, &SystemInput::default()),
            Err(KestrelError::NotImplemented { .. })
        ));
    }

    #[test]
    fn test_process_noise_terms() {
        let mut model = model_with_biases();
        model.rate_stddev = 0.2;
        let layout = StateLayout {
            rate: true,
            ..StateLayout::default()
        };
        let state = navigating_state(layout, &mut model);

        let noise = model.process_noise(&state, true);
        // Identity quaternion: only w has "other" components equal to zero.
        assert_abs_diff_eq!(noise[0], 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(noise[1], 0.25 * 0.04, epsilon = EPSILON);
        assert_abs_diff_eq!(noise[4], (2.0 * PI).powi(2), epsilon = EPSILON);
        assert_abs_diff_eq!(noise[10], 1.0e-4, epsilon = EPSILON);
        let gyro = state.extension_index(GYRO_BIAS).unwrap();
        assert_abs_diff_eq!(noise[gyro], (1.0e-2 * PI / 180.0).powi(2), epsilon = EPSILON);
    }

    #[test]
    fn test_nested_parameters_reach_sub_models() {
        let mut model = model_with_biases();
        model.set_parameter("gyro/rate_drift", 0.5).unwrap();
        assert_eq!(model.parameters().get("gyro/rate_drift"), Some(0.5));
        assert!(model.set_parameter("magnet/stddev", 1.0).is_err());
        assert!(model.set_parameter("nonsense", 1.0).is_err());
    }

    #[test]
    fn test_duplicate_sub_model_is_rejected() {
        let mut model = model_with_biases();
        assert_eq!(
            model.add_sub_model(Box::new(GyroBiasModel::default())),
            Err(KestrelError::DuplicateName(GYRO_BIAS.to_string()))
        );
    }
}
