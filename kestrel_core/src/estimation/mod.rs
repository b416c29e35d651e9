// kestrel_core/src/estimation/mod.rs

use std::fmt;

use crate::error::DiagnosticKind;
use crate::status::SystemStatus;

pub mod estimator;
pub mod filters;
pub mod measurement;

/// Why a measurement update did not change the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The measurement is switched off.
    Disabled,
    /// The model's status mask rejected the current system status.
    Inactive,
    /// Less than `min_interval` has passed since the last accepted update.
    RateLimited,
    /// The model declined the update in `prepare`.
    Vetoed,
    /// The observation depends on a reference that is not established.
    StaleInput,
    SingularInnovation,
    NonFinite,
    /// None of the observed dimensions are currently estimated.
    NoActiveDimensions,
    /// Data of the wrong kind or size for the model.
    Mismatch,
}

impl SkipReason {
    /// The diagnostic recorded for this reason. Deliberate skips record nothing.
    pub fn diagnostic_kind(self) -> Option<DiagnosticKind> {
        match self {
            SkipReason::Disabled
            | SkipReason::Inactive
            | SkipReason::RateLimited
            | SkipReason::Vetoed => None,
            SkipReason::StaleInput => Some(DiagnosticKind::StaleInput),
            SkipReason::SingularInnovation => Some(DiagnosticKind::SingularInnovation),
            SkipReason::NonFinite => Some(DiagnosticKind::NonFinite),
            SkipReason::NoActiveDimensions => Some(DiagnosticKind::NoActiveDimensions),
            SkipReason::Mismatch => Some(DiagnosticKind::Mismatch),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The result of one measurement update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    Applied,
    /// Applied to the active part of the state only.
    Partial {
        /// Flags the model provides whose partitions are not active.
        unsupported: SystemStatus,
        /// Number of observed state dimensions that were masked out.
        masked: usize,
    },
    Skipped(SkipReason),
}

impl CorrectionOutcome {
    /// `true` if the state was corrected, fully or partially.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, CorrectionOutcome::Skipped(_))
    }
}
