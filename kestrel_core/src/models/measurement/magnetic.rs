// kestrel_core/src/models/measurement/magnetic.rs

use nalgebra::{Matrix3x4, Quaternion, Vector3, Vector4};
use std::f64::consts::PI;

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::models::measurement::{diagonal_noise, MeasurementModel};
use crate::parameters::{as_flag, from_flag, ParameterList};
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};
use crate::utils::kinematics::{rotation_jacobian, rotation_matrix, wrap_angle, yaw};

/// Magnetometer used as a heading reference.
///
/// The earth field is modelled from declination and inclination and rotated
/// into the navigation frame by the reference heading, then into the body
/// frame by the current orientation. The Jacobian is projected onto the yaw
/// direction so the magnetometer never corrects roll or pitch.
///
/// A `magnitude` of zero compares directions only: readings are normalized
/// and the noise scaled accordingly.
#[derive(Debug, Clone)]
pub struct MagneticModel {
    pub stddev: f64,
    pub declination: f64,
    pub inclination: f64,
    pub magnitude: f64,
    /// Derives the reference heading from the first reading.
    pub auto_heading: bool,
    reference_heading: f64,
    noise_scale: f64,
}

impl Default for MagneticModel {
    fn default() -> Self {
        Self {
            stddev: 1.0,
            declination: 0.0,
            inclination: 60.0 * PI / 180.0,
            magnitude: 0.0,
            auto_heading: true,
            reference_heading: 0.0,
            noise_scale: 1.0,
        }
    }
}

impl MagneticModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The earth field with x pointing north and y pointing west.
    pub fn field(&self) -> Vector3<f64> {
        let magnitude = if self.magnitude == 0.0 { 1.0 } else { self.magnitude };
        let (sin_dec, cos_dec) = self.declination.sin_cos();
        let (sin_inc, cos_inc) = self.inclination.sin_cos();
        Vector3::new(
            magnitude * cos_inc * cos_dec,
            -magnitude * sin_dec,
            -magnitude * sin_inc * cos_dec,
        )
    }

    /// The earth field in the navigation frame.
    fn reference_field(&self) -> Vector3<f64> {
        let m = self.field();
        let (sin, cos) = self.reference_heading.sin_cos();
        Vector3::new(cos * m.x - sin * m.y, sin * m.x + cos * m.y, m.z)
    }
}

/// `∂(R(q)ᵀ·m)/∂q`, using `R(q)ᵀ = R(q*)`.
fn transposed_rotation_jacobian(q: &Quaternion<f64>, m: &Vector3<f64>) -> Matrix3x4<f64> {
    let mut jacobian = rotation_jacobian(&q.conjugate(), m);
    for row in 0..3 {
        for col in 1..4 {
            jacobian[(row, col)] = -jacobian[(row, col)];
        }
    }
    jacobian
}

impl MeasurementModel for MagneticModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Magnetic
    }

    fn dimension(&self) -> usize {
        3
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::YAW
    }

    fn prepare(
        &mut self,
        state: &State,
        data: &MeasurementData,
        reference: &mut GlobalReference,
        _timed_out: bool,
    ) -> bool {
        let MeasurementData::Magnetic(reading) = data else {
            return true;
        };
        if self.auto_heading && !reference.has_heading() {
            let current_yaw = state.orientation().map(|q| yaw(&q)).unwrap_or(0.0);
            let field = self.field();
            let heading = reading.y.atan2(reading.x) - field.y.atan2(field.x) + current_yaw;
            reference.set_heading(wrap_angle(heading));
        }
        true
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        let MeasurementData::Magnetic(reading) = data else {
            return None;
        };
        self.reference_heading = reference.heading();

        let mut y = *reading;
        self.noise_scale = 1.0;
        if self.magnitude == 0.0 {
            let norm = reading.norm();
            if norm == 0.0 {
                return None;
            }
            y /= norm;
            self.noise_scale = 1.0 / (norm * norm);
        }
        Some(MeasurementVector::from_column_slice(y.as_slice()))
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        let Some(q) = state.orientation() else {
            return MeasurementVector::zeros(3);
        };
        let expected = rotation_matrix(&q).transpose() * self.reference_field();
        MeasurementVector::from_column_slice(expected.as_slice())
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(3, state.dimension());
        let (Some(qi), Some(q)) = (state.orientation_index(), state.orientation()) else {
            return c;
        };
        let full = transposed_rotation_jacobian(&q, &self.reference_field());

        // 2·∂q/∂yaw for a rotation about the world z axis.
        let direction = Vector4::new(-q.k, -q.j, q.i, q.w);
        let projected = full * (direction * direction.transpose());
        for row in 0..3 {
            for k in 0..4 {
                c[(row, qi + k)] = projected[(row, k)];
            }
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        diagonal_noise(&[self.stddev; 3]) * self.noise_scale
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("stddev", self.stddev)
            .with("declination", self.declination)
            .with("inclination", self.inclination)
            .with("magnitude", self.magnitude)
            .with("auto_heading", from_flag(self.auto_heading))
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "stddev" => self.stddev = value,
            "declination" => self.declination = value,
            "inclination" => self.inclination = value,
            "magnitude" => self.magnitude = value,
            "auto_heading" => self.auto_heading = as_flag(value),
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }
}
