// kestrel_core/src/error.rs

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Fatal errors. These are returned while the estimator is being configured
/// and stop the affected model from being used.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KestrelError {
    #[error("configuration error in '{model}': {reason}")]
    Configuration { model: String, reason: String },

    #[error("model '{model}' does not implement the {capability}")]
    NotImplemented {
        model: String,
        capability: &'static str,
    },

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("a sub-state named '{0}' is already registered")]
    DuplicateName(String),

    #[error("no measurement named '{0}' is registered")]
    UnknownMeasurement(String),

    #[error("time step {0} s is negative")]
    NegativeTimeStep(f64),
}

pub type Result<T> = std::result::Result<T, KestrelError>;

/// The kinds of recoverable problems a cycle can run into. None of them stop
/// the filter; the affected step is skipped or narrowed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// `S = C P Cᵀ + R` could not be inverted.
    SingularInnovation,
    /// A NaN or infinity showed up in an observation, Jacobian or result.
    NonFinite,
    /// The observation depends on a reference that is not established.
    StaleInput,
    /// Some of the observed dimensions were inactive or absent.
    PartialCorrection,
    /// None of the observed dimensions were active.
    NoActiveDimensions,
    /// The update carried data of the wrong kind or size for the model.
    Mismatch,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DiagnosticKind::SingularInnovation => "singular innovation covariance",
            DiagnosticKind::NonFinite => "non-finite value",
            DiagnosticKind::StaleInput => "stale input",
            DiagnosticKind::PartialCorrection => "partial correction",
            DiagnosticKind::NoActiveDimensions => "no active dimensions",
            DiagnosticKind::Mismatch => "data mismatch",
        };
        f.write_str(text)
    }
}

/// A record of one recoverable problem, kept by the filter for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Name of the measurement or model that raised it.
    pub source: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.source, self.kind, self.message)
    }
}
