// kestrel_core/src/status.rs

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Which physical quantities are currently estimated or observable.
    ///
    /// The low three bits describe the overall mode of the estimator, the rest
    /// describe individual state partitions. Both the process model and the
    /// measurement models declare their capabilities with these flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SystemStatus: u32 {
        const ALIGNMENT   = 1 << 0;
        const DEGRADED    = 1 << 1;
        const READY       = 1 << 2;
        const ROLLPITCH   = 1 << 3;
        const YAW         = 1 << 4;
        const XY_VELOCITY = 1 << 5;
        const XY_POSITION = 1 << 6;
        const Z_VELOCITY  = 1 << 7;
        const Z_POSITION  = 1 << 8;
        const RATE_XY     = 1 << 9;
        const RATE_Z      = 1 << 10;

        // --- Composite masks ---
        const MODE        = Self::ALIGNMENT.bits() | Self::DEGRADED.bits() | Self::READY.bits();
        const ORIENTATION = Self::ROLLPITCH.bits() | Self::YAW.bits();
        const RATE        = Self::RATE_XY.bits() | Self::RATE_Z.bits();
        const VELOCITY    = Self::XY_VELOCITY.bits() | Self::Z_VELOCITY.bits();
        const POSITION    = Self::XY_POSITION.bits() | Self::Z_POSITION.bits();
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::empty()
    }
}

impl SystemStatus {
    /// The quantities that must all be known before the estimator reports `READY`.
    pub const NAVIGATION: SystemStatus = SystemStatus::ROLLPITCH
        .union(SystemStatus::YAW)
        .union(SystemStatus::XY_POSITION)
        .union(SystemStatus::Z_POSITION);

    /// Returns the flags that describe state partitions, without the mode bits.
    pub fn partitions(self) -> SystemStatus {
        self.difference(SystemStatus::MODE)
    }
}

/// Prints the set flags separated by spaces, e.g. `ROLLPITCH YAW Z_POSITION`.
impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}
