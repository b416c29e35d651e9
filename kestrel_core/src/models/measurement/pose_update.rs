// kestrel_core/src/models/measurement/pose_update.rs

use nalgebra::Vector3;

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData, PoseFix};
use crate::models::measurement::{diagonal_noise, Fusion, MeasurementModel};
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};
use crate::utils::kinematics::{wrap_angle, yaw, yaw_jacobian};

/// Standard deviations of the channels present in the last reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Channels {
    xy: Option<f64>,
    z: Option<f64>,
    yaw: Option<f64>,
}

impl Channels {
    fn rows(&self) -> usize {
        self.blocks().iter().sum()
    }

    fn blocks(&self) -> Vec<usize> {
        let mut blocks = Vec::with_capacity(3);
        if self.xy.is_some() {
            blocks.push(2);
        }
        if self.z.is_some() {
            blocks.push(1);
        }
        if self.yaw.is_some() {
            blocks.push(1);
        }
        blocks
    }
}

/// A pose from an external localization source, e.g. SLAM or motion capture.
///
/// The reading has up to three channels: horizontal position, height and yaw.
/// Rows are laid out as `[x, y][z][yaw]` with absent channels left out, and
/// each channel is fused with the prior by covariance intersection, so a
/// source that shares information with the estimate is not counted twice.
#[derive(Debug, Clone)]
pub struct PoseUpdateModel {
    /// Weight of the prior. With `beta` also zero, both weights are derived
    /// from the information of the prior and of the reading.
    pub alpha: f64,
    /// Weight of the reading, at most 0.8.
    pub beta: f64,
    /// Replaces the reading's standard deviation when non-zero.
    pub fixed_position_xy_stddev: f64,
    pub fixed_position_z_stddev: f64,
    pub fixed_yaw_stddev: f64,
    channels: Channels,
}

impl Default for PoseUpdateModel {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            beta: 0.0,
            fixed_position_xy_stddev: 0.0,
            fixed_position_z_stddev: 0.0,
            fixed_yaw_stddev: 0.0,
            channels: Channels::default(),
        }
    }
}

impl PoseUpdateModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels_of(&self, fix: &PoseFix) -> Channels {
        let channel = |stddev: f64, fixed: f64| {
            (stddev > 0.0).then(|| if fixed != 0.0 { fixed } else { stddev })
        };
        Channels {
            xy: channel(fix.position_xy_stddev, self.fixed_position_xy_stddev),
            z: channel(fix.position_z_stddev, self.fixed_position_z_stddev),
            yaw: channel(fix.yaw_stddev, self.fixed_yaw_stddev),
        }
    }
}

impl MeasurementModel for PoseUpdateModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Pose
    }

    fn dimension(&self) -> usize {
        self.channels.rows()
    }

    fn status_flags(&self) -> SystemStatus {
        let mut flags = SystemStatus::empty();
        flags.set(SystemStatus::XY_POSITION, self.channels.xy.is_some());
        flags.set(SystemStatus::Z_POSITION, self.channels.z.is_some());
        flags.set(SystemStatus::YAW, self.channels.yaw.is_some());
        flags
    }

    /// Picks the channels of this reading. A reading without any is vetoed.
    fn prepare(
        &mut self,
        _state: &State,
        data: &MeasurementData,
        _reference: &mut GlobalReference,
        _timed_out: bool,
    ) -> bool {
        let MeasurementData::Pose(fix) = data else {
            return true;
        };
        self.channels = self.channels_of(fix);
        self.channels.rows() > 0
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        _reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        let MeasurementData::Pose(fix) = data else {
            return None;
        };
        let mut y = Vec::with_capacity(4);
        if self.channels.xy.is_some() {
            y.extend_from_slice(&[fix.position.x, fix.position.y]);
        }
        if self.channels.z.is_some() {
            y.push(fix.position.z);
        }
        if self.channels.yaw.is_some() {
            y.push(yaw(fix.orientation.quaternion()));
        }
        Some(MeasurementVector::from_vec(y))
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        let p = state.position().unwrap_or_else(Vector3::zeros);
        let mut y = Vec::with_capacity(4);
        if self.channels.xy.is_some() {
            y.extend_from_slice(&[p.x, p.y]);
        }
        if self.channels.z.is_some() {
            y.push(p.z);
        }
        if self.channels.yaw.is_some() {
            y.push(state.orientation().map(|q| yaw(&q)).unwrap_or(0.0));
        }
        MeasurementVector::from_vec(y)
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(self.dimension(), state.dimension());
        let mut row = 0;
        if self.channels.xy.is_some() {
            if let Some(pi) = state.position_index() {
                c[(row, pi)] = 1.0;
                c[(row + 1, pi + 1)] = 1.0;
            }
            row += 2;
        }
        if self.channels.z.is_some() {
            if let Some(pi) = state.position_index() {
                c[(row, pi + 2)] = 1.0;
            }
            row += 1;
        }
        if self.channels.yaw.is_some() {
            if let (Some(qi), Some(q)) = (state.orientation_index(), state.orientation()) {
                let gradient = yaw_jacobian(&q);
                for k in 0..4 {
                    c[(row, qi + k)] = gradient[k];
                }
            }
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        let Channels { xy, z, yaw } = self.channels;
        let mut stddevs = Vec::with_capacity(4);
        if let Some(s) = xy {
            stddevs.extend_from_slice(&[s, s]);
        }
        stddevs.extend(z);
        stddevs.extend(yaw);
        diagonal_noise(&stddevs)
    }

    fn fusion(&self) -> Fusion {
        Fusion::Intersection {
            alpha: self.alpha,
            beta: self.beta,
            blocks: self.channels.blocks(),
        }
    }

    fn limit_error(&self, error: &mut MeasurementVector) {
        if self.channels.yaw.is_some() {
            let last = error.len() - 1;
            error[last] = wrap_angle(error[last]);
        }
    }

    fn reset(&mut self, _state: &State) {
        self.channels = Channels::default();
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("alpha", self.alpha)
            .with("beta", self.beta)
            .with("fixed_position_xy_stddev", self.fixed_position_xy_stddev)
            .with("fixed_position_z_stddev", self.fixed_position_z_stddev)
            .with("fixed_yaw_stddev", self.fixed_yaw_stddev)
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "alpha" => self.alpha = value,
            "beta" => self.beta = value,
            "fixed_position_xy_stddev" => self.fixed_position_xy_stddev = value,
            "fixed_position_z_stddev" => self.fixed_position_z_stddev = value,
            "fixed_yaw_stddev" => self.fixed_yaw_stddev = value,
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measurement::test_support::navigating_state;
    use approx::assert_abs_diff_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::f64::consts::PI;

    fn fix(xy: f64, z: f64, yaw_stddev: f64) -> PoseFix {
        PoseFix {
            position: Vector3::new(1.0, 2.0, 3.0),
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
            position_xy_stddev: xy,
            position_z_stddev: z,
            yaw_stddev,
        }
    }

    fn prepared(model: &mut PoseUpdateModel, fix: PoseFix, state: &State) -> MeasurementVector {
        let data = MeasurementData::Pose(fix);
        let mut reference = GlobalReference::new();
        assert!(model.prepare(state, &data, &mut reference, false));
        model.observation(&data, state, &reference).unwrap()
    }

    #[test]
    fn test_all_channels_are_stacked() {
        let mut model = PoseUpdateModel::new();
        let state = navigating_state();
        let y = prepared(&mut model, fix(0.5, 0.2, 0.1), &state);

        assert_eq!(model.dimension(), 4);
        assert_abs_diff_eq!(y[2], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y[3], 0.5, epsilon = 1e-12);
        assert_eq!(
            model.status_flags(),
            SystemStatus::XY_POSITION | SystemStatus::Z_POSITION | SystemStatus::YAW
        );
        assert_eq!(
            model.fusion(),
            Fusion::Intersection {
                alpha: 0.0,
                beta: 0.0,
                blocks: vec![2, 1, 1]
            }
        );

        let c = model.jacobian(&state);
        assert_eq!(c.shape(), (4, state.dimension()));
        assert_abs_diff_eq!(c[(1, 5)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[(2, 6)], 1.0, epsilon = 1e-12);
        // Identity orientation: yaw grows with qz only.
        assert_abs_diff_eq!(c[(3, 3)], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.noise(&state)[(3, 3)], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_absent_channels_are_left_out() {
        let mut model = PoseUpdateModel::new();
        let state = navigating_state();
        let y = prepared(&mut model, fix(0.0, 0.2, 0.0), &state);

        assert_eq!(model.dimension(), 1);
        assert_abs_diff_eq!(y[0], 3.0, epsilon = 1e-12);
        assert_eq!(model.status_flags(), SystemStatus::Z_POSITION);
        assert_eq!(model.jacobian(&state).nrows(), 1);
    }

    #[test]
    fn test_reading_without_channels_is_vetoed() {
        let mut model = PoseUpdateModel::new();
        let state = navigating_state();
        let data = MeasurementData::Pose(fix(0.0, -1.0, 0.0));
        assert!(!model.prepare(&state, &data, &mut GlobalReference::new(), false));
    }

    #[test]
    fn test_fixed_stddev_overrides_the_reading() {
        let mut model = PoseUpdateModel::new();
        model.set_parameter("fixed_position_xy_stddev", 3.0).unwrap();
        model.set_parameter("fixed_yaw_stddev", 0.2).unwrap();
        let state = navigating_state();
        prepared(&mut model, fix(0.5, 0.0, 0.1), &state);

        let r = model.noise(&state);
        assert_abs_diff_eq!(r[(0, 0)], 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[(2, 2)], 0.04, epsilon = 1e-12);
        assert!(model.set_parameter("gamma", 1.0).is_err());
    }

    #[test]
    fn test_yaw_innovation_is_wrapped() {
        let mut model = PoseUpdateModel::new();
        let mut state = navigating_state();
        state.set_orientation(&UnitQuaternion::from_euler_angles(0.0, 0.0, 3.1));
        let mut reading = fix(0.0, 0.0, 0.1);
        reading.orientation = UnitQuaternion::from_euler_angles(0.0, 0.0, -3.1);

        let y = prepared(&mut model, reading, &state);
        let mut error = y - model.expected_value(&state);
        model.limit_error(&mut error);
        assert_abs_diff_eq!(error[0], 2.0 * PI - 6.2, epsilon = 1e-9);
    }
}
