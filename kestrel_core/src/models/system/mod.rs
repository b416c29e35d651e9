// kestrel_core/src/models/system/mod.rs

use dyn_clone::DynClone;
use nalgebra::Vector3;
use std::fmt::Debug;

use crate::error::{KestrelError, Result};
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Jacobian, StateVector, SystemInput};

pub mod imu_bias;
pub mod quaternion;

// --- Bias Sub-Models ---

/// Which raw IMU channel a bias sub-model corrects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasQuantity {
    Rate,
    Acceleration,
}

/// The bias corrections in effect for one derivative evaluation.
///
/// Returned alongside `x_dot` so the caller sees exactly which corrections
/// were applied to the raw input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BiasCorrection {
    pub rate: Vector3<f64>,
    pub acceleration: Vector3<f64>,
}

/// A sub-model that estimates an additive bias on one IMU channel.
///
/// Each bias model owns a three-dimensional extension of the state, registered
/// under its name. The system model reads the bias from there and adds it to
/// the raw input.
pub trait BiasModel: DynClone + Debug + Send + Sync {
    /// Unique name, also used as the name of its state extension.
    fn name(&self) -> &str;

    fn quantity(&self) -> BiasQuantity;

    /// Variance the extension is seeded with on (re)activation.
    fn prior_variance(&self) -> f64;

    /// Random-walk standard deviation of the bias, per sqrt(second).
    fn drift(&self) -> f64;

    fn parameters(&self) -> ParameterList;

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()>;

    /// Registers the bias extension with the state.
    fn init(&self, state: &mut State) -> Result<()> {
        state
            .add_extension(self.name(), 3, self.prior_variance())
            .map(|_| ())
    }

    /// Current bias estimate, read from `x` using the offsets in `state`.
    fn bias(&self, state: &State, x: &StateVector) -> Vector3<f64> {
        match state.extension_index(self.name()) {
            Some(i) => Vector3::new(x[i], x[i + 1], x[i + 2]),
            None => Vector3::zeros(),
        }
    }
}

dyn_clone::clone_trait_object!(BiasModel);

// --- SYSTEM MODEL TRAIT ---
// Represents the continuous-time process model. `x_dot = f(x, u)`
/// The process model of the filter.
///
/// Implementations are stateless apart from parameters and scratch buffers:
/// the `State` is passed in on every call and never retained.
pub trait SystemModel: DynClone + Debug + Send + Sync {
    fn name(&self) -> &str {
        "system"
    }

    /// Registers sub-model extensions with the state. Called once when the
    /// model is installed and again whenever a sub-model is added.
    fn init(&mut self, state: &mut State) -> Result<()>;

    /// Adds a bias sub-model. Models that have no use for sub-models reject them.
    fn add_sub_model(&mut self, model: Box<dyn BiasModel>) -> Result<()> {
        Err(KestrelError::Configuration {
            model: self.name().to_string(),
            reason: format!("does not accept sub-model '{}'", model.name()),
        })
    }

    fn sub_models(&self) -> &[Box<dyn BiasModel>] {
        &[]
    }

    fn parameters(&self) -> ParameterList;

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()>;

    /// Derives the system status from the current measurement status.
    fn status_flags(&self, state: &State) -> SystemStatus;

    /// Computes the time derivative of the state.
    ///
    /// # Arguments
    /// * `state`: Layout, activation and status of the filter.
    /// * `x`: The state vector to differentiate at. During integration this is
    ///   an intermediate vector, not necessarily `state.vector()`.
    /// * `input`: The latest IMU sample.
    ///
    /// # Returns
    /// `(x_dot, bias)` where `bias` holds the corrections that were added to the input.
    fn derivative(
        &self,
        state: &State,
        x: &StateVector,
        input: &SystemInput,
    ) -> (StateVector, BiasCorrection);

    /// Calculates `A = ∂f/∂x` at the current state.
    fn state_jacobian(&self, state: &State, input: &SystemInput) -> Jacobian;

    /// Calculates `B = ∂f/∂u`. Not every model can provide this; asking a model
    /// that cannot is a configuration error.
    fn input_jacobian(&self, state: &State, input: &SystemInput) -> Result<Jacobian> {
        let _ = (state, input);
        Err(KestrelError::NotImplemented {
            model: self.name().to_string(),
            capability: "input Jacobian",
        })
    }

    /// Diagonal of the continuous process noise `Q`.
    ///
    /// Constant terms are recomputed only when `init` is set. State-dependent
    /// terms are recomputed on every call.
    fn process_noise(&mut self, state: &State, init: bool) -> StateVector;

    /// Keeps the state inside its valid domain after each step.
    fn limit(&self, state: &mut State) {
        state.normalize();
    }
}

dyn_clone::clone_trait_object!(SystemModel);
