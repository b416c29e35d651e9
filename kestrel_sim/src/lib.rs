// kestrel_sim/src/lib.rs

//! Headless scenario runner for the `kestrel_core` estimator.
//!
//! A scenario describes a ground-truth motion, a set of synthetic sensors and
//! an estimator configuration. The runner steps the truth, samples the
//! sensors, feeds the estimator and reports how far the estimate ended up
//! from the truth.

// This prelude is for convenience for other files WITHIN the kestrel_sim crate.
pub mod prelude;

pub mod cli;
pub mod simulation;

use thiserror::Error;

/// Everything that can stop a scenario from running.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to load scenario: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Estimator(#[from] kestrel_core::error::KestrelError),

    #[error("sensor '{name}': {reason}")]
    InvalidSensor { name: String, reason: String },

    #[error("invalid simulation settings: {0}")]
    InvalidSimulation(String),
}

impl From<figment::Error> for SimError {
    fn from(e: figment::Error) -> Self {
        SimError::Config(Box::new(e))
    }
}
