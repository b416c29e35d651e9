// kestrel_sim/src/simulation/core/truth.rs

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// The ground-truth trajectory: a body moving forward at constant speed while
/// turning at a constant yaw rate and climbing at a constant rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    pub initial_position: [f64; 3],
    /// Degrees.
    pub initial_yaw: f64,
    /// Forward speed along the body x axis, m/s.
    pub speed: f64,
    /// Degrees per second.
    pub yaw_rate: f64,
    /// m/s.
    pub climb_rate: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            initial_position: [0.0; 3],
            initial_yaw: 0.0,
            speed: 0.0,
            yaw_rate: 0.0,
            climb_rate: 0.0,
        }
    }
}

/// The true kinematic state at one instant, in the local navigation frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TruthState {
    pub time: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Coordinate acceleration, gravity not included.
    pub acceleration: Vector3<f64>,
    /// Body to navigation frame.
    pub orientation: UnitQuaternion<f64>,
    /// Body frame angular rate, rad/s.
    pub rate: Vector3<f64>,
    pub yaw: f64,
}

impl MotionConfig {
    /// Closed-form truth at time `t`.
    pub fn state_at(&self, t: f64) -> TruthState {
        let yaw0 = self.initial_yaw.to_radians();
        let r = self.yaw_rate.to_radians();
        let s = self.speed;
        let yaw = yaw0 + r * t;
        let (sin, cos) = yaw.sin_cos();
        let (sin0, cos0) = yaw0.sin_cos();

        let [x0, y0, z0] = self.initial_position;
        let (dx, dy) = if r.abs() > 1e-12 {
            (s / r * (sin - sin0), -s / r * (cos - cos0))
        } else {
            (s * cos0 * t, s * sin0 * t)
        };

        TruthState {
            time: t,
            position: Vector3::new(x0 + dx, y0 + dy, z0 + self.climb_rate * t),
            velocity: Vector3::new(s * cos, s * sin, self.climb_rate),
            acceleration: Vector3::new(-s * r * sin, s * r * cos, 0.0),
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
            rate: Vector3::new(0.0, 0.0, r),
            yaw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_full_circle_returns_to_start() {
        let motion = MotionConfig {
            initial_position: [1.0, 2.0, 0.0],
            speed: 3.0,
            yaw_rate: 36.0,
            ..MotionConfig::default()
        };
        let truth = motion.state_at(10.0);
        assert_abs_diff_eq!(truth.position.x, 1.0, epsilon = EPSILON);
        assert_abs_diff_eq!(truth.position.y, 2.0, epsilon = EPSILON);
        assert_abs_diff_eq!(truth.velocity.x, 3.0, epsilon = EPSILON);
    }

    #[test]
    fn test_velocity_is_derivative_of_position() {
        let motion = MotionConfig {
            initial_yaw: 30.0,
            speed: 2.0,
            yaw_rate: 10.0,
            climb_rate: 0.5,
            ..MotionConfig::default()
        };
        let h = 1e-6;
        let a = motion.state_at(1.0 - h);
        let b = motion.state_at(1.0 + h);
        let numeric = (b.position - a.position) / (2.0 * h);
        let truth = motion.state_at(1.0);
        assert_abs_diff_eq!(numeric, truth.velocity, epsilon = 1e-6);

        let numeric = (b.velocity - a.velocity) / (2.0 * h);
        assert_abs_diff_eq!(numeric, truth.acceleration, epsilon = 1e-6);
    }

    #[test]
    fn test_straight_line_keeps_heading() {
        let motion = MotionConfig {
            initial_yaw: 90.0,
            speed: 1.0,
            ..MotionConfig::default()
        };
        let truth = motion.state_at(4.0);
        assert_abs_diff_eq!(truth.position.y, 4.0, epsilon = EPSILON);
        assert_abs_diff_eq!(truth.position.x, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(truth.orientation.euler_angles().2, 90f64.to_radians(), epsilon = EPSILON);
    }
}
