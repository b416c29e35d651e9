// kestrel_core/src/utils/integrators.rs

use serde::{Deserialize, Serialize};

use crate::types::StateVector;

/// One fixed step of an explicit solver for `x_dot = f(x)`.
///
/// The process input is held over the step, so the derivative depends on the
/// state alone.
pub trait Integrator {
    fn step(
        &self,
        derivative: &dyn Fn(&StateVector) -> StateVector,
        x0: &StateVector,
        dt: f64,
    ) -> StateVector;
}

/// Forward Euler.
#[derive(Debug, Default, Clone, Copy)]
pub struct RK1;

impl Integrator for RK1 {
    fn step(
        &self,
        derivative: &dyn Fn(&StateVector) -> StateVector,
        x0: &StateVector,
        dt: f64,
    ) -> StateVector {
        let mut x = x0.clone();
        x.axpy(dt, &derivative(x0), 1.0);
        x
    }
}

/// Classic fourth-order Runge-Kutta.
#[derive(Debug, Default, Clone, Copy)]
pub struct RK4;

impl Integrator for RK4 {
    fn step(
        &self,
        derivative: &dyn Fn(&StateVector) -> StateVector,
        x0: &StateVector,
        dt: f64,
    ) -> StateVector {
        // x0 + h·k
        let offset = |k: &StateVector, h: f64| {
            let mut x = x0.clone();
            x.axpy(h, k, 1.0);
            x
        };
        let k1 = derivative(x0);
        let k2 = derivative(&offset(&k1, 0.5 * dt));
        let k3 = derivative(&offset(&k2, 0.5 * dt));
        let k4 = derivative(&offset(&k3, dt));

        let mut x = x0.clone();
        x.axpy(dt / 6.0, &k1, 1.0);
        x.axpy(dt / 3.0, &k2, 1.0);
        x.axpy(dt / 3.0, &k3, 1.0);
        x.axpy(dt / 6.0, &k4, 1.0);
        x
    }
}

/// Selects the integration scheme used by the filter's predict step.
///
/// The Jacobian is always evaluated at the start of the step, so one scheme is
/// used for the whole lifetime of a filter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    Rk1,
    #[default]
    Rk4,
}

impl IntegratorKind {
    pub fn step(
        self,
        derivative: &dyn Fn(&StateVector) -> StateVector,
        x0: &StateVector,
        dt: f64,
    ) -> StateVector {
        match self {
            IntegratorKind::Rk1 => RK1.step(derivative, x0, dt),
            IntegratorKind::Rk4 => RK4.step(derivative, x0, dt),
        }
    }
}
