// kestrel_sim/src/prelude.rs

// Logging macros, shared by every module of the runner.
pub use tracing::{debug, error, info, warn};

// Re-export the entire kestrel_core prelude so estimator types are at hand.
pub use kestrel_core::prelude::*;

// Re-export common simulation-specific types for easy access in other modules.
pub use crate::simulation::config::{ScenarioConfig, SimulationConfig};
pub use crate::simulation::core::prng::SimulationRng;
pub use crate::simulation::core::truth::TruthState;
pub use crate::simulation::sensors::SyntheticSensor;
pub use crate::SimError;
