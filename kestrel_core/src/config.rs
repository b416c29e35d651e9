// kestrel_core/src/config.rs

use serde::{Deserialize, Serialize};

use crate::state::{PriorVariances, StateLayout};
use crate::status::SystemStatus;
use crate::utils::integrators::IntegratorKind;

/// Static configuration of an estimator. Model tunables are not part of this;
/// they live in each model's `ParameterList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    pub layout: StateLayout,
    pub priors: PriorVariances,
    pub integrator: IntegratorKind,
    /// Seconds after a reset during which the filter reports ALIGNMENT.
    pub alignment_time: f64,
    /// Flags treated as always observed, e.g. `"ROLLPITCH | YAW"`.
    pub forced_status: SystemStatus,
    /// Activate the partitions a measurement provides before correcting with it.
    pub auto_enable_partitions: bool,
    /// Add `B·Bᵀ·input_variance` to the process noise. Requires a system
    /// model with an input Jacobian.
    pub propagate_input_noise: bool,
    pub input_variance: f64,
    /// Number of diagnostics kept before the oldest are dropped.
    pub diagnostic_capacity: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            layout: StateLayout::default(),
            priors: PriorVariances::default(),
            integrator: IntegratorKind::default(),
            alignment_time: 0.0,
            forced_status: SystemStatus::empty(),
            auto_enable_partitions: true,
            propagate_input_noise: false,
            input_variance: 0.0,
            diagnostic_capacity: 64,
        }
    }
}
