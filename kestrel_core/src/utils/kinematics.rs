// kestrel_core/src/utils/kinematics.rs

//! Quaternion kinematics shared by the system and measurement models.
//!
//! All quaternions are (w, x, y, z) and rotate body vectors into the world
//! frame. Nothing here normalizes its input, so the Jacobians are exact for
//! whatever is currently in the state vector.

use nalgebra::{Matrix3, Matrix3x4, Matrix4x3, Quaternion, Vector3, Vector4};
use std::f64::consts::PI;

/// Body-to-world rotation matrix `R(q)`.
pub fn rotation_matrix(q: &Quaternion<f64>) -> Matrix3<f64> {
    let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
    Matrix3::new(
        qw * qw + qx * qx - qy * qy - qz * qz,
        2.0 * (qx * qy - qw * qz),
        2.0 * (qx * qz + qw * qy),
        2.0 * (qx * qy + qw * qz),
        qw * qw - qx * qx + qy * qy - qz * qz,
        2.0 * (qy * qz - qw * qx),
        2.0 * (qx * qz - qw * qy),
        2.0 * (qy * qz + qw * qx),
        qw * qw - qx * qx - qy * qy + qz * qz,
    )
}

/// `q_dot = 0.5 * Ω(ω) * q`, returned as (w, x, y, z).
pub fn quaternion_derivative(q: &Quaternion<f64>, rate: &Vector3<f64>) -> Vector4<f64> {
    let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
    let (wx, wy, wz) = (rate.x, rate.y, rate.z);
    Vector4::new(
        0.5 * (-wx * qx - wy * qy - wz * qz),
        0.5 * (wx * qw + wz * qy - wy * qz),
        0.5 * (wy * qw - wz * qx + wx * qz),
        0.5 * (wz * qw + wy * qx - wx * qy),
    )
}

/// `∂q_dot/∂q` for a fixed rate.
pub fn quaternion_transition(rate: &Vector3<f64>) -> nalgebra::Matrix4<f64> {
    let (wx, wy, wz) = (0.5 * rate.x, 0.5 * rate.y, 0.5 * rate.z);
    nalgebra::Matrix4::new(
        0.0, -wx, -wy, -wz, //
        wx, 0.0, wz, -wy, //
        wy, -wz, 0.0, wx, //
        wz, wy, -wx, 0.0,
    )
}

/// `∂q_dot/∂ω`: how the quaternion derivative couples to the angular rate.
pub fn rate_coupling(q: &Quaternion<f64>) -> Matrix4x3<f64> {
    let (qw, qx, qy, qz) = (0.5 * q.w, 0.5 * q.i, 0.5 * q.j, 0.5 * q.k);
    Matrix4x3::new(
        -qx, -qy, -qz, //
        qw, -qz, qy, //
        qz, qw, -qx, //
        -qy, qx, qw,
    )
}

/// `∂(R(q)·a)/∂q`. Each row is the gradient of one component of the rotated
/// vector, i.e. of a quadratic form in the quaternion components.
pub fn rotation_jacobian(q: &Quaternion<f64>, a: &Vector3<f64>) -> Matrix3x4<f64> {
    let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
    let (ax, ay, az) = (a.x, a.y, a.z);
    Matrix3x4::new(
        2.0 * (qw * ax - qz * ay + qy * az),
        2.0 * (qx * ax + qy * ay + qz * az),
        2.0 * (-qy * ax + qx * ay + qw * az),
        2.0 * (-qz * ax - qw * ay + qx * az),
        //
        2.0 * (qz * ax + qw * ay - qx * az),
        2.0 * (qy * ax - qx * ay - qw * az),
        2.0 * (qx * ax + qy * ay + qz * az),
        2.0 * (qw * ax - qz * ay + qy * az),
        //
        2.0 * (-qy * ax + qx * ay + qw * az),
        2.0 * (qz * ax + qw * ay - qx * az),
        2.0 * (-qw * ax + qz * ay - qy * az),
        2.0 * (qx * ax + qy * ay + qz * az),
    )
}

/// Heading of the body x axis about the world z axis.
pub fn yaw(q: &Quaternion<f64>) -> f64 {
    let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
    (2.0 * (qx * qy + qw * qz)).atan2(qw * qw + qx * qx - qy * qy - qz * qz)
}

/// `∂yaw/∂q` as (w, x, y, z).
pub fn yaw_jacobian(q: &Quaternion<f64>) -> Vector4<f64> {
    let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
    let u = 2.0 * (qx * qy + qw * qz);
    let v = qw * qw + qx * qx - qy * qy - qz * qz;
    let d = u * u + v * v;
    if d == 0.0 {
        return Vector4::zeros();
    }
    let du = Vector4::new(2.0 * qz, 2.0 * qy, 2.0 * qx, 2.0 * qw);
    let dv = Vector4::new(2.0 * qw, 2.0 * qx, -2.0 * qy, -2.0 * qz);
    (du * v - dv * u) / d
}

/// Wraps an angle into (-π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;

    const EPSILON: f64 = 1e-9;

    fn sample_quaternion() -> Quaternion<f64> {
        *UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1).quaternion()
    }

    #[test]
    fn test_rotation_matrix_matches_nalgebra() {
        let unit = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1);
        let expected = unit.to_rotation_matrix().into_inner();
        let actual = rotation_matrix(unit.quaternion());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_rotation_jacobian_matches_finite_differences() {
        let q = sample_quaternion();
        let a = Vector3::new(0.4, -1.3, 9.7);
        let analytic = rotation_jacobian(&q, &a);
        let h = 1e-6;
        for col in 0..4 {
            let mut plus = q.coords;
            let mut minus = q.coords;
            // coords are stored (x, y, z, w); map column order (w, x, y, z)
            let idx = if col == 0 { 3 } else { col - 1 };
            plus[idx] += h;
            minus[idx] -= h;
            let fp = rotation_matrix(&Quaternion::from(plus)) * a;
            let fm = rotation_matrix(&Quaternion::from(minus)) * a;
            let numeric = (fp - fm) / (2.0 * h);
            for row in 0..3 {
                assert_abs_diff_eq!(analytic[(row, col)], numeric[row], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_rate_coupling_is_derivative_of_quaternion_rate() {
        let q = sample_quaternion();
        let rate = Vector3::new(0.2, -0.1, 0.7);
        let linear = rate_coupling(&q) * rate;
        let direct = quaternion_derivative(&q, &rate);
        for i in 0..4 {
            assert_abs_diff_eq!(linear[i], direct[i], epsilon = EPSILON);
        }
    }

    #[test]
    fn test_yaw_and_jacobian() {
        let q = *UnitQuaternion::from_euler_angles(0.0, 0.0, 0.8).quaternion();
        assert_abs_diff_eq!(yaw(&q), 0.8, epsilon = EPSILON);

        let analytic = yaw_jacobian(&q);
        let h = 1e-6;
        let mut plus = q;
        plus.w += h;
        let mut minus = q;
        minus.w -= h;
        let numeric = (yaw(&plus) - yaw(&minus)) / (2.0 * h);
        assert_abs_diff_eq!(analytic[0], numeric, epsilon = 1e-6);
    }

    #[test]
    fn test_wrap_angle() {
        assert_abs_diff_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = EPSILON);
        assert_abs_diff_eq!(wrap_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = EPSILON);
        assert_abs_diff_eq!(wrap_angle(PI), PI, epsilon = EPSILON);
        assert_abs_diff_eq!(wrap_angle(0.25), 0.25, epsilon = EPSILON);
    }
}
