// kestrel_core/src/estimation/filters/ekf.rs

use nalgebra::DMatrix;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::EstimatorConfig;
use crate::error::{Diagnostic, DiagnosticKind, KestrelError, Result};
use crate::estimation::measurement::Measurement;
use crate::estimation::{CorrectionOutcome, SkipReason};
use crate::global_reference::GlobalReference;
use crate::messages::MeasurementUpdate;
use crate::models::measurement::{Fusion, MeasurementModel};
use crate::models::system::{BiasCorrection, BiasModel, SystemModel};
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector, StateVector, SystemInput};
use crate::utils::integrators::IntegratorKind;

/// An Extended Kalman Filter over a partitioned state.
///
/// Both steps work on the active dimensions only: inactive partitions keep
/// their value and their frozen covariance block. Because deactivation clears
/// all cross-covariances, restricting the algebra to the active block is exact.
#[derive(Debug, Clone)]
pub struct ExtendedKalmanFilter {
    state: State,
    system: Box<dyn SystemModel>,
    integrator: IntegratorKind,
    input: SystemInput,
    /// Bias corrections applied during the last prediction.
    bias: BiasCorrection,
    noise_initialized: bool,
    auto_enable_partitions: bool,
    /// `Some` when input noise is propagated through `B`.
    input_variance: Option<f64>,
    diagnostics: VecDeque<Diagnostic>,
    diagnostic_capacity: usize,
}

impl ExtendedKalmanFilter {
    /// Installs the system model on the state.
    ///
    /// # Errors
    /// Fails if the model cannot be initialized on this state, or if input
    /// noise propagation is requested from a model without an input Jacobian.
    pub fn new(
        mut state: State,
        mut system: Box<dyn SystemModel>,
        config: &EstimatorConfig,
    ) -> Result<Self> {
        system.init(&mut state)?;
        let input_variance = if config.propagate_input_noise {
            system.input_jacobian(&state, &SystemInput::default())?;
            Some(config.input_variance)
        } else {
            None
        };

        Ok(Self {
            state,
            system,
            integrator: config.integrator,
            input: SystemInput::default(),
            bias: BiasCorrection::default(),
            noise_initialized: false,
            auto_enable_partitions: config.auto_enable_partitions,
            input_variance,
            diagnostics: VecDeque::with_capacity(config.diagnostic_capacity),
            diagnostic_capacity: config.diagnostic_capacity,
        })
    }

    // --- Accessors ---

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn system(&self) -> &dyn SystemModel {
        self.system.as_ref()
    }

    pub fn input(&self) -> &SystemInput {
        &self.input
    }

    pub fn set_input(&mut self, input: SystemInput) {
        self.input = input;
    }

    pub fn bias(&self) -> &BiasCorrection {
        &self.bias
    }

    pub fn diagnostics(&self) -> &VecDeque<Diagnostic> {
        &self.diagnostics
    }

    pub fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
    }

    // --- Configuration ---

    pub fn add_sub_model(&mut self, model: Box<dyn BiasModel>) -> Result<()> {
        self.system.add_sub_model(model)?;
        self.system.init(&mut self.state)?;
        self.noise_initialized = false;
        Ok(())
    }

    pub fn system_parameters(&self) -> ParameterList {
        self.system.parameters()
    }

    pub fn set_system_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        self.system.set_parameter(key, value)?;
        self.noise_initialized = false;
        Ok(())
    }

    /// Back to the prior. Extensions stay registered.
    pub fn reset(&mut self) {
        self.state.reset();
        self.input = SystemInput::default();
        self.bias = BiasCorrection::default();
        self.noise_initialized = false;
        self.diagnostics.clear();
    }

    // --- Status ---

    /// Re-derives the system status from the measurement status. Mode bits
    /// are owned by the estimator and carried over unchanged.
    pub fn refresh_status(&mut self) {
        let current = self.state.system_status();
        let flags = self.system.status_flags(&self.state);
        let status = (flags - SystemStatus::MODE) | (current & SystemStatus::MODE);
        if status != current {
            self.state.set_system_status(status);
        }
    }

    /// Marks `flags` as observed so their partitions are estimated.
    fn request_status(&mut self, flags: SystemStatus) {
        let measured = self.state.measurement_status();
        if !measured.contains(flags) {
            self.state.set_measurement_status(measured | flags);
            self.refresh_status();
        }
    }

    // --- Predict ---

    /// Advances the state by `dt` seconds using the current input.
    ///
    /// A zero `dt` only refreshes the status flags.
    pub fn predict(&mut self, dt: f64) -> Result<()> {
        if dt < 0.0 {
            return Err(KestrelError::NegativeTimeStep(dt));
        }
        self.refresh_status();
        if dt == 0.0 {
            return Ok(());
        }

        let active = self.state.active_indices();
        let mask = self.state.active_mask();

        let noise = self.system.process_noise(&self.state, !self.noise_initialized);
        self.noise_initialized = true;
        let a = self.system.state_jacobian(&self.state, &self.input);
        let b = match self.input_variance {
            Some(_) => Some(self.system.input_jacobian(&self.state, &self.input)?),
            None => None,
        };

        // 1. Integrate the masked derivative.
        let x0 = self.state.vector().clone();
        let x1 = {
            let system = self.system.as_ref();
            let state = &self.state;
            let input = self.input;
            let derivative = |x: &StateVector| -> StateVector {
                let (mut x_dot, _) = system.derivative(state, x, &input);
                for (value, active) in x_dot.iter_mut().zip(mask.iter()) {
                    if !active {
                        *value = 0.0;
                    }
                }
                x_dot
            };
            self.integrator.step(&derivative, &x0, dt)
        };
        if x1.iter().any(|v| !v.is_finite()) {
            let source = self.system.name().to_string();
            self.record(
                DiagnosticKind::NonFinite,
                &source,
                format!("prediction over {dt} s is not finite, step skipped"),
            );
            return Ok(());
        }
        let (_, bias) = self.system.derivative(&self.state, &x0, &self.input);
        self.bias = bias;

        // 2. Propagate the active covariance block: P = Φ P Φᵀ + Q dt.
        let size = active.len();
        let phi = DMatrix::identity(size, size) + a.select_rows(&active).select_columns(&active) * dt;
        let p_aa = self.state.covariance().select_rows(&active).select_columns(&active);
        let mut q_aa = Covariance::from_diagonal(&noise.select_rows(&active));
        if let (Some(b), Some(variance)) = (&b, self.input_variance) {
            let b_a = b.select_rows(&active);
            q_aa += &b_a * b_a.transpose() * variance;
        }
        let p_pred = &phi * p_aa * phi.transpose() + q_aa * dt;

        // 3. Write back and clean up.
        let x = self.state.vector_mut();
        for &i in &active {
            x[i] = x1[i];
        }
        self.write_block(&active, &p_pred);
        self.system.limit(&mut self.state);
        self.state.symmetrize();
        Ok(())
    }

    // --- Correct ---

    /// Runs one measurement through its whole lifecycle: gating, preparation,
    /// observation, partition activation and correction.
    pub fn process_measurement(
        &mut self,
        measurement: &mut Measurement,
        update: &MeasurementUpdate,
        reference: &mut GlobalReference,
    ) -> CorrectionOutcome {
        if !measurement.enabled {
            return CorrectionOutcome::Skipped(SkipReason::Disabled);
        }
        if !measurement.model().apply_status_mask(self.state.system_status()) {
            return CorrectionOutcome::Skipped(SkipReason::Inactive);
        }
        if measurement.rate_limited() {
            return CorrectionOutcome::Skipped(SkipReason::RateLimited);
        }
        let expected_kind = measurement.model().data_kind();
        if update.data.kind() != expected_kind {
            let message = format!("got {} data, expected {}", update.data.kind(), expected_kind);
            return self.skip(measurement.name(), SkipReason::Mismatch, message);
        }

        let timed_out = measurement.timed_out();
        if !measurement
            .model_mut()
            .prepare(&self.state, &update.data, reference, timed_out)
        {
            return CorrectionOutcome::Skipped(SkipReason::Vetoed);
        }
        let Some(y) = measurement
            .model_mut()
            .observation(&update.data, &self.state, reference)
        else {
            let message = "observation is not available yet".to_string();
            return self.skip(measurement.name(), SkipReason::StaleInput, message);
        };

        // A skipped correction leaves the state as it was, activation included.
        let snapshot = if self.auto_enable_partitions {
            let snapshot = self.state.clone();
            self.request_status(measurement.model().status_flags());
            Some(snapshot)
        } else {
            None
        };

        let outcome = self.correct(
            measurement.name(),
            measurement.model(),
            &y,
            update.covariance.as_ref(),
        );
        if outcome.is_accepted() {
            measurement.mark_updated();
            let measured = self.state.measurement_status();
            self.state
                .set_measurement_status(measured | measurement.status_flags());
            self.refresh_status();
        } else if let Some(snapshot) = snapshot {
            self.state = snapshot;
        }
        outcome
    }

    /// The EKF update on the active block: the Kalman gain
    /// `K = P Cᵀ (C P Cᵀ + R)⁻¹`, or covariance intersection for models whose
    /// [`MeasurementModel::fusion`] asks for it.
    ///
    /// # Arguments
    /// * `source`: Name recorded with any diagnostic.
    /// * `covariance`: Replaces the model's `R` for this update.
    pub fn correct(
        &mut self,
        source: &str,
        model: &dyn MeasurementModel,
        y: &MeasurementVector,
        covariance: Option<&Covariance>,
    ) -> CorrectionOutcome {
        let n = self.state.dimension();
        let m = model.dimension();
        let expected = model.expected_value(&self.state);
        let c = model.jacobian(&self.state);
        let r = match covariance {
            Some(r) => r.clone(),
            None => model.noise(&self.state),
        };

        if y.len() != m || expected.len() != m || c.shape() != (m, n) || r.shape() != (m, m) {
            let message = format!("{m} rows against {n} states do not match the model");
            return self.skip(source, SkipReason::Mismatch, message);
        }
        let finite = |values: &[f64]| values.iter().all(|v| v.is_finite());
        if !(finite(y.as_slice())
            && finite(expected.as_slice())
            && finite(c.as_slice())
            && finite(r.as_slice()))
        {
            let message = "observation, prediction or noise is not finite".to_string();
            return self.skip(source, SkipReason::NonFinite, message);
        }

        let mut error = y - &expected;
        model.limit_error(&mut error);

        // Observed columns that fall on inactive partitions are masked out.
        let mask = self.state.active_mask();
        let observed: Vec<usize> = (0..n)
            .filter(|&j| c.column(j).iter().any(|v| *v != 0.0))
            .collect();
        let masked = observed.iter().filter(|&&j| !mask[j]).count();
        if masked == observed.len() {
            let message = "none of the observed states is active".to_string();
            return self.skip(source, SkipReason::NoActiveDimensions, message);
        }

        let active = self.state.active_indices();
        let c_a = c.select_columns(&active);
        let p_aa = self.state.covariance().select_rows(&active).select_columns(&active);

        let (dx, p_new) = match model.fusion() {
            Fusion::Kalman => {
                let s = &c_a * &p_aa * c_a.transpose() + &r;
                let Some(s_inv) = s.try_inverse() else {
                    let message = "innovation covariance is singular".to_string();
                    return self.skip(source, SkipReason::SingularInnovation, message);
                };
                let k = &p_aa * c_a.transpose() * s_inv;
                let p_new = (DMatrix::identity(active.len(), active.len()) - &k * &c_a) * &p_aa;
                (&k * &error, p_new)
            }
            Fusion::Intersection {
                alpha,
                beta,
                blocks,
            } => {
                if blocks.iter().sum::<usize>() != m {
                    let message = format!("blocks {blocks:?} do not cover {m} rows");
                    return self.skip(source, SkipReason::Mismatch, message);
                }
                // One linearization, blocks fused in turn.
                let mut dx = StateVector::zeros(active.len());
                let mut p = p_aa;
                let mut start = 0;
                for rows in blocks.into_iter().filter(|&rows| rows > 0) {
                    let c_b = c_a.rows(start, rows).clone_owned();
                    let r_b = r.view((start, start), (rows, rows)).clone_owned();
                    let e_b = error.rows(start, rows).clone_owned();
                    start += rows;
                    // Blocks on inactive partitions only are already counted in `masked`.
                    if c_b.iter().all(|v| *v == 0.0) {
                        continue;
                    }
                    let Some((dx_b, p_b)) = intersect(&p, &c_b, &r_b, &e_b, alpha, beta) else {
                        let message = format!("rows {}..{} carry no information", start - rows, start);
                        return self.skip(source, SkipReason::SingularInnovation, message);
                    };
                    dx += dx_b;
                    p = p_b;
                }
                (dx, p)
            }
        };
        if !(finite(dx.as_slice()) && finite(p_new.as_slice())) {
            let message = "correction is not finite".to_string();
            return self.skip(source, SkipReason::NonFinite, message);
        }

        let x = self.state.vector_mut();
        for (row, &i) in active.iter().enumerate() {
            x[i] += dx[row];
        }
        self.write_block(&active, &p_new);
        self.system.limit(&mut self.state);
        self.state.symmetrize();

        let unsupported = self.state.unsupported(model.status_flags());
        if masked > 0 || !unsupported.is_empty() {
            let message = format!(
                "{masked} observed state(s) inactive, unsupported flags: {unsupported}"
            );
            self.record(DiagnosticKind::PartialCorrection, source, message);
            CorrectionOutcome::Partial {
                unsupported,
                masked,
            }
        } else {
            CorrectionOutcome::Applied
        }
    }

    // --- Private Helper Methods ---

    fn write_block(&mut self, indices: &[usize], block: &Covariance) {
        let p = self.state.covariance_mut();
        for (row, &i) in indices.iter().enumerate() {
            for (col, &j) in indices.iter().enumerate() {
                p[(i, j)] = block[(row, col)];
            }
        }
    }

    fn skip(&mut self, source: &str, reason: SkipReason, message: String) -> CorrectionOutcome {
        if let Some(kind) = reason.diagnostic_kind() {
            self.record(kind, source, message);
        }
        CorrectionOutcome::Skipped(reason)
    }

    fn record(&mut self, kind: DiagnosticKind, source: &str, message: String) {
        let diagnostic = Diagnostic {
            kind,
            source: source.to_string(),
            message,
        };
        warn!("{}", diagnostic);
        if self.diagnostic_capacity == 0 {
            return;
        }
        while self.diagnostics.len() >= self.diagnostic_capacity {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(diagnostic);
    }
}

/// Upper bound of the reading's weight in a covariance intersection.
const MAX_READING_WEIGHT: f64 = 0.8;

/// Covariance intersection of the prior block `p` with one block of a reading.
///
/// Fuses the information `Ix = (C P Cᵀ)⁻¹` of the prior with `Iy = R⁻¹` as
/// `alpha·Ix + beta·Iy`. Returns the state correction and the new block, or
/// `None` if either side carries no information.
fn intersect(
    p: &Covariance,
    c: &Jacobian,
    r: &Covariance,
    error: &MeasurementVector,
    alpha: f64,
    beta: f64,
) -> Option<(StateVector, Covariance)> {
    let hph = c * p * c.transpose();
    let ix = hph.clone().try_inverse()?;
    let iy = r.clone().try_inverse()?;

    let (mut alpha, mut beta) = (alpha, beta);
    if alpha == 0.0 && beta == 0.0 {
        beta = iy.trace() / (ix.trace() + iy.trace());
        alpha = 1.0 - beta;
    }
    if beta > MAX_READING_WEIGHT {
        debug!("Reading weight {:.3} capped at {}", beta, MAX_READING_WEIGHT);
        beta = MAX_READING_WEIGHT;
        alpha = 1.0 - beta;
    }

    let information = &ix * (alpha - 1.0) + &iy * beta;
    let size = hph.nrows();
    // Without information gain only the mean moves.
    let s_inv = if information.determinant() > 0.0 {
        information
            .try_inverse()
            .and_then(|r_eff| (r_eff + &hph).try_inverse())?
    } else {
        Covariance::zeros(size, size)
    };
    let p_new = p - p * c.transpose() * s_inv * c * p;
    let dx = &p_new * c.transpose() * iy * beta * error;
    Some((dx, p_new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MeasurementData, PoseFix};
    use crate::models::measurement::height::HeightModel;
    use crate::models::measurement::pose_update::PoseUpdateModel;
    use crate::models::measurement::position::PositionModel;
    use crate::models::measurement::zero_rate::ZeroRateModel;
    use crate::models::system::quaternion::QuaternionKinematicsModel;
    use crate::state::{Partition, PriorVariances, StateLayout};
    use crate::types::GRAVITY;
    use approx::assert_abs_diff_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    const EPSILON: f64 = 1e-9;

    fn filter_with(config: &EstimatorConfig) -> ExtendedKalmanFilter {
        let state = State::new(&config.layout, config.priors.clone());
        ExtendedKalmanFilter::new(state, Box::new(QuaternionKinematicsModel::new()), config).unwrap()
    }

    fn filter() -> ExtendedKalmanFilter {
        filter_with(&EstimatorConfig::default())
    }

    fn scalar(value: f64) -> Covariance {
        Covariance::from_element(1, 1, value)
    }

    fn height_y(value: f64) -> MeasurementVector {
        MeasurementVector::from_element(1, value)
    }

    fn pose_height(z: f64, stddev: f64) -> MeasurementUpdate {
        MeasurementData::Pose(PoseFix {
            position: Vector3::new(0.0, 0.0, z),
            orientation: UnitQuaternion::identity(),
            position_xy_stddev: 0.0,
            position_z_stddev: stddev,
            yaw_stddev: 0.0,
        })
        .into()
    }

    #[test]
    fn test_quaternion_stays_normalized() {
        let mut ekf = filter();
        ekf.set_system_parameter("rate_stddev", 0.0).unwrap();
        ekf.set_input(SystemInput::new(Vector3::new(0.3, -0.2, 0.5), Vector3::zeros()));
        for _ in 0..10_000 {
            ekf.predict(0.01).unwrap();
        }
        let q = ekf.state().orientation().unwrap();
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_constant_rate_rotates_by_rate_times_time() {
        let mut ekf = filter();
        let rate = Vector3::new(0.1, 0.2, -0.2);
        ekf.set_input(SystemInput::new(rate, Vector3::new(0.0, 0.0, -GRAVITY)));
        for _ in 0..100 {
            ekf.predict(0.01).unwrap();
        }
        let q = ekf.state().orientation().unwrap();
        let half_angle = 0.5 * rate.norm();
        assert_abs_diff_eq!(q.w, half_angle.cos(), epsilon = 1e-9);
        assert_abs_diff_eq!(q.k, -0.2 / rate.norm() * half_angle.sin(), epsilon = 1e-9);
    }

    #[test]
    fn test_zero_time_step_leaves_estimate_untouched() {
        let mut ekf = filter();
        ekf.set_input(SystemInput::new(Vector3::new(0.3, 0.0, 0.0), Vector3::zeros()));
        let x = ekf.state().vector().clone();
        let p = ekf.state().covariance().clone();
        ekf.predict(0.0).unwrap();
        assert_eq!(ekf.state().vector(), &x);
        assert_eq!(ekf.state().covariance(), &p);
    }

    #[test]
    fn test_negative_time_step_is_rejected() {
        let mut ekf = filter();
        assert_eq!(ekf.predict(-0.1), Err(KestrelError::NegativeTimeStep(-0.1)));
    }

    #[test]
    fn test_inactive_partitions_do_not_move() {
        let mut ekf = filter();
        ekf.state_mut().set_velocity(&Vector3::new(1.0, 1.0, 1.0));
        ekf.set_input(SystemInput::new(Vector3::zeros(), Vector3::new(3.0, 0.0, 0.0)));
        for _ in 0..10 {
            ekf.predict(0.1).unwrap();
        }
        assert_eq!(ekf.state().position(), Some(Vector3::zeros()));
        assert_eq!(ekf.state().velocity(), Some(Vector3::new(1.0, 1.0, 1.0)));
        assert_eq!(ekf.state().covariance()[(4, 4)], 0.0);
    }

    #[test]
    fn test_infinite_noise_is_inert() {
        let mut ekf = filter();
        ekf.state_mut().enable(Partition::VerticalPosition);
        let model = HeightModel::new();
        let outcome = ekf.correct("height", &model, &height_y(2.0), Some(&scalar(1e30)));
        assert_eq!(outcome, CorrectionOutcome::Applied);
        assert_abs_diff_eq!(ekf.state().vector()[6], 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(ekf.state().covariance()[(6, 6)], 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_vanishing_noise_pins_the_observed_state() {
        let mut ekf = filter();
        ekf.state_mut().enable(Partition::VerticalPosition);
        let model = HeightModel::new();
        ekf.correct("height", &model, &height_y(2.0), Some(&scalar(1e-12)));
        assert_abs_diff_eq!(ekf.state().vector()[6], 2.0, epsilon = 1e-9);
        assert!(ekf.state().covariance()[(6, 6)] < 1e-9);
    }

    #[test]
    fn test_singular_innovation_is_skipped_with_diagnostic() {
        let mut ekf = filter();
        ekf.state_mut().enable(Partition::VerticalPosition);
        ekf.state_mut().covariance_mut()[(6, 6)] = 0.0;
        let x = ekf.state().vector().clone();

        let model = HeightModel::new();
        let outcome = ekf.correct("height", &model, &height_y(2.0), Some(&scalar(0.0)));
        assert_eq!(
            outcome,
            CorrectionOutcome::Skipped(SkipReason::SingularInnovation)
        );
        assert_eq!(ekf.state().vector(), &x);
        let last = ekf.diagnostics().back().unwrap();
        assert_eq!(last.kind, DiagnosticKind::SingularInnovation);
        assert_eq!(last.source, "height");
    }

    #[test]
    fn test_non_finite_observation_is_skipped() {
        let mut ekf = filter();
        ekf.state_mut().enable(Partition::VerticalPosition);
        let model = HeightModel::new();
        let outcome = ekf.correct("height", &model, &height_y(f64::NAN), None);
        assert_eq!(outcome, CorrectionOutcome::Skipped(SkipReason::NonFinite));
        assert_abs_diff_eq!(ekf.state().vector()[6], 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_partially_active_observation_is_partial() {
        let mut ekf = filter();
        ekf.state_mut().enable(Partition::VerticalPosition);
        let model = PositionModel::new();
        let y = MeasurementVector::from_column_slice(&[5.0, 5.0, 1.0]);

        let outcome = ekf.correct("position", &model, &y, None);
        assert_eq!(
            outcome,
            CorrectionOutcome::Partial {
                unsupported: SystemStatus::XY_POSITION,
                masked: 2
            }
        );
        assert_eq!(ekf.state().vector()[4], 0.0);
        assert!(ekf.state().vector()[6] > 0.9);
    }

    #[test]
    fn test_nothing_observable_is_skipped() {
        let mut ekf = filter();
        let model = ZeroRateModel::new();
        let outcome = ekf.correct("zero_rate", &model, &height_y(0.1), None);
        assert_eq!(
            outcome,
            CorrectionOutcome::Skipped(SkipReason::NoActiveDimensions)
        );
    }

    #[test]
    fn test_process_measurement_enables_partitions_and_marks_update() {
        let mut ekf = filter();
        let mut reference = GlobalReference::new();
        let mut height = Measurement::new("height", Box::new(HeightModel::new()));

        let outcome = ekf.process_measurement(
            &mut height,
            &MeasurementData::Height(2.0).into(),
            &mut reference,
        );
        assert_eq!(outcome, CorrectionOutcome::Applied);
        assert!(ekf.state().is_enabled(Partition::VerticalPosition));
        assert!(ekf.state().is_enabled(Partition::VerticalVelocity));
        assert_eq!(height.status_flags(), SystemStatus::Z_POSITION);
        assert!(ekf.state().vector()[6] > 1.9);
    }

    #[test]
    fn test_rejected_reading_does_not_enable_partitions() {
        let mut ekf = filter();
        let mut reference = GlobalReference::new();
        let mut height = Measurement::new("height", Box::new(HeightModel::new()));
        let p = ekf.state().covariance().clone();
        let status = ekf.state().system_status();

        let outcome = ekf.process_measurement(
            &mut height,
            &MeasurementData::Height(f64::NAN).into(),
            &mut reference,
        );
        assert_eq!(outcome, CorrectionOutcome::Skipped(SkipReason::NonFinite));
        assert_eq!(ekf.state().covariance(), &p);
        assert_eq!(ekf.state().system_status(), status);
        assert!(!ekf.state().is_enabled(Partition::VerticalPosition));
        assert!(height.status_flags().is_empty());
        assert_eq!(ekf.diagnostics().len(), 1);
    }

    #[test]
    fn test_process_measurement_without_auto_enable_has_nothing_to_correct() {
        let config = EstimatorConfig {
            auto_enable_partitions: false,
            ..EstimatorConfig::default()
        };
        let mut ekf = filter_with(&config);
        let mut reference = GlobalReference::new();
        let mut height = Measurement::new("height", Box::new(HeightModel::new()));

        let outcome = ekf.process_measurement(
            &mut height,
            &MeasurementData::Height(2.0).into(),
            &mut reference,
        );
        assert_eq!(
            outcome,
            CorrectionOutcome::Skipped(SkipReason::NoActiveDimensions)
        );
        assert!(height.status_flags().is_empty());
    }

    #[test]
    fn test_pose_update_intersects_with_the_prior() {
        let mut ekf = filter();
        let mut reference = GlobalReference::new();
        let mut pose = Measurement::new("pose", Box::new(PoseUpdateModel::new()));

        let outcome = ekf.process_measurement(&mut pose, &pose_height(2.0, 1.0), &mut reference);
        assert_eq!(outcome, CorrectionOutcome::Applied);
        assert_eq!(pose.status_flags(), SystemStatus::Z_POSITION);
        assert!(!ekf.state().is_enabled(Partition::HorizontalPosition));

        // Information 0.01 against 1, the reading weight capped at 0.8.
        let variance = 1.0 / (0.2 * 0.01 + 0.8 * 1.0);
        assert_abs_diff_eq!(ekf.state().covariance()[(6, 6)], variance, epsilon = 1e-9);
        assert_abs_diff_eq!(ekf.state().vector()[6], variance * 0.8 * 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pose_update_fuses_the_active_channels_only() {
        let config = EstimatorConfig {
            auto_enable_partitions: false,
            ..EstimatorConfig::default()
        };
        let mut ekf = filter_with(&config);
        ekf.state_mut().enable(Partition::VerticalPosition);
        let mut reference = GlobalReference::new();
        let mut pose = Measurement::new("pose", Box::new(PoseUpdateModel::new()));
        let mut update = pose_height(2.0, 1.0);
        if let MeasurementData::Pose(fix) = &mut update.data {
            fix.position = Vector3::new(5.0, 5.0, 2.0);
            fix.position_xy_stddev = 1.0;
        }

        let outcome = ekf.process_measurement(&mut pose, &update, &mut reference);
        assert_eq!(
            outcome,
            CorrectionOutcome::Partial {
                unsupported: SystemStatus::XY_POSITION,
                masked: 2
            }
        );
        assert_eq!(ekf.state().vector()[4], 0.0);
        assert_eq!(ekf.state().vector()[5], 0.0);

        let variance = 1.0 / (0.2 * 0.01 + 0.8 * 1.0);
        assert_abs_diff_eq!(ekf.state().covariance()[(6, 6)], variance, epsilon = 1e-9);
        assert_abs_diff_eq!(ekf.state().vector()[6], variance * 0.8 * 2.0, epsilon = 1e-9);
        assert_eq!(ekf.diagnostics().back().unwrap().kind, DiagnosticKind::PartialCorrection);
    }

    #[test]
    fn test_pose_update_with_even_weights_averages() {
        let mut ekf = filter();
        ekf.state_mut().enable(Partition::VerticalPosition);
        ekf.state_mut().covariance_mut()[(6, 6)] = 4.0;
        let mut reference = GlobalReference::new();
        let mut model = PoseUpdateModel::new();
        model.alpha = 0.5;
        model.beta = 0.5;
        let mut pose = Measurement::new("pose", Box::new(model));

        let outcome = ekf.process_measurement(&mut pose, &pose_height(2.0, 2.0), &mut reference);
        assert!(outcome.is_accepted());
        assert_abs_diff_eq!(ekf.state().vector()[6], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ekf.state().covariance()[(6, 6)], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wrong_data_kind_is_a_mismatch() {
        let mut ekf = filter();
        let mut reference = GlobalReference::new();
        let mut height = Measurement::new("height", Box::new(HeightModel::new()));
        let outcome = ekf.process_measurement(
            &mut height,
            &MeasurementData::Heading(0.2).into(),
            &mut reference,
        );
        assert_eq!(outcome, CorrectionOutcome::Skipped(SkipReason::Mismatch));
        assert_eq!(ekf.diagnostics().len(), 1);
    }

    #[test]
    fn test_disabled_measurement_is_skipped_quietly() {
        let mut ekf = filter();
        let mut reference = GlobalReference::new();
        let mut height = Measurement::new("height", Box::new(HeightModel::new()));
        height.enabled = false;
        let outcome = ekf.process_measurement(
            &mut height,
            &MeasurementData::Height(2.0).into(),
            &mut reference,
        );
        assert_eq!(outcome, CorrectionOutcome::Skipped(SkipReason::Disabled));
        assert!(ekf.diagnostics().is_empty());
    }

    #[test]
    fn test_input_noise_needs_an_input_jacobian() {
        let config = EstimatorConfig {
            propagate_input_noise: true,
            ..EstimatorConfig::default()
        };
        let state = State::new(&StateLayout::default(), PriorVariances::default());
        let result = ExtendedKalmanFilter::new(
            state,
            Box::new(QuaternionKinematicsModel::new()),
            &config,
        );
        assert!(matches!(result, Err(KestrelError::NotImplemented { .. })));
    }

    #[test]
    fn test_diagnostics_are_bounded() {
        let config = EstimatorConfig {
            diagnostic_capacity: 3,
            ..EstimatorConfig::default()
        };
        let mut ekf = filter_with(&config);
        let model = ZeroRateModel::new();
        for _ in 0..5 {
            ekf.correct("zero_rate", &model, &height_y(0.1), None);
        }
        assert_eq!(ekf.diagnostics().len(), 3);
    }
}
