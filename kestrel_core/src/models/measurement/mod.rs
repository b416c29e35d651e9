// kestrel_core/src/models/measurement/mod.rs

use dyn_clone::DynClone;
use std::fmt::Debug;

use crate::error::Result;
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};

pub mod gps;
pub mod gravity;
pub mod heading;
pub mod height;
pub mod magnetic;
pub mod pose_update;
pub mod position;
pub mod rate;
pub mod zero_rate;

/// How a reading is fused with the prior.
#[derive(Debug, Clone, PartialEq)]
pub enum Fusion {
    /// The standard Kalman gain.
    Kalman,
    /// Covariance intersection, applied to consecutive blocks of rows in turn.
    /// `alpha` weighs the prior and `beta` the reading. When both are zero
    /// the weights are derived from the information of each block.
    Intersection {
        alpha: f64,
        beta: f64,
        blocks: Vec<usize>,
    },
}

// --- MEASUREMENT MODEL TRAIT ---
// Represents the mathematical model of a sensor. `y = h(x) + v`
/// The model of one sensor.
///
/// Models never store the `State`. The engine passes it into every call, and
/// the Jacobian columns are laid out against `state.dimension()`.
pub trait MeasurementModel: DynClone + Debug + Send + Sync {
    /// The variant of [`MeasurementData`] this model consumes.
    fn data_kind(&self) -> DataKind;

    /// Length of `y`.
    fn dimension(&self) -> usize;

    /// The partitions a successful update makes observable.
    fn status_flags(&self) -> SystemStatus;

    /// Gates pseudo-measurements. Returns `false` if the model has nothing to
    /// contribute under the given system status.
    fn apply_status_mask(&self, status: SystemStatus) -> bool {
        let _ = status;
        true
    }

    /// Runs before the observation is formed. Models that anchor on the
    /// [`GlobalReference`] establish it here. Returning `false` vetoes the update.
    fn prepare(
        &mut self,
        state: &State,
        data: &MeasurementData,
        reference: &mut GlobalReference,
        timed_out: bool,
    ) -> bool {
        let _ = (state, data, reference, timed_out);
        true
    }

    /// Converts the raw reading into `y`.
    ///
    /// # Returns
    /// `None` if the reading cannot be used, e.g. because the reference it
    /// must be expressed against is not established.
    fn observation(
        &mut self,
        data: &MeasurementData,
        state: &State,
        reference: &GlobalReference,
    ) -> Option<MeasurementVector>;

    /// Predicts the measurement `ŷ = h(x)` from the state.
    fn expected_value(&self, state: &State) -> MeasurementVector;

    /// Calculates the measurement Jacobian `C = ∂h/∂x`.
    fn jacobian(&self, state: &State) -> Jacobian;

    /// Returns the measurement noise covariance matrix `R`.
    fn noise(&self, state: &State) -> Covariance;

    fn fusion(&self) -> Fusion {
        Fusion::Kalman
    }

    /// Brings the innovation into its canonical range, e.g. wraps angles.
    fn limit_error(&self, error: &mut MeasurementVector) {
        let _ = error;
    }

    /// Called when the estimator resets.
    fn reset(&mut self, state: &State) {
        let _ = state;
    }

    fn parameters(&self) -> ParameterList;

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()>;
}

// This macro automatically generates the implementation of `Clone` for `Box<dyn MeasurementModel>`.
dyn_clone::clone_trait_object!(MeasurementModel);

/// A diagonal `R` from per-row standard deviations.
pub(crate) fn diagonal_noise(stddevs: &[f64]) -> Covariance {
    let variances: Vec<f64> = stddevs.iter().map(|s| s * s).collect();
    Covariance::from_diagonal(&MeasurementVector::from_vec(variances))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::state::{PriorVariances, State, StateLayout};
    use crate::status::SystemStatus;

    /// A default-layout state with every partition active.
    pub fn navigating_state() -> State {
        let mut state = State::new(&StateLayout::default(), PriorVariances::default());
        state.set_system_status(SystemStatus::POSITION | SystemStatus::VELOCITY);
        state
    }
}
