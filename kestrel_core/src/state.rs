// kestrel_core/src/state.rs

use nalgebra::{DVector, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::info;

use crate::error::{KestrelError, Result};
use crate::status::SystemStatus;
use crate::types::{Covariance, StateVector};

// =========================================================================
// == Partitions and Layout ==
// =========================================================================

/// An independently activatable block of the state vector.
///
/// Position and velocity are split into a horizontal (xy) and a vertical (z)
/// part so that e.g. a barometer can enable the z axis alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Orientation,
    Rate,
    HorizontalPosition,
    VerticalPosition,
    HorizontalVelocity,
    VerticalVelocity,
    /// A block appended by a sub-model. The value is its registration order.
    Extension(usize),
}

impl Partition {
    /// Partitions that must be active for this one to be active.
    fn prerequisites(self) -> &'static [Partition] {
        match self {
            Partition::Rate | Partition::HorizontalVelocity | Partition::VerticalVelocity => {
                &[Partition::Orientation]
            }
            Partition::HorizontalPosition => &[Partition::HorizontalVelocity],
            Partition::VerticalPosition => &[Partition::VerticalVelocity],
            Partition::Orientation | Partition::Extension(_) => &[],
        }
    }

    /// Partitions that can only be active while this one is.
    fn dependents(self) -> &'static [Partition] {
        match self {
            Partition::Orientation => &[
                Partition::Rate,
                Partition::HorizontalVelocity,
                Partition::VerticalVelocity,
            ],
            Partition::HorizontalVelocity => &[Partition::HorizontalPosition],
            Partition::VerticalVelocity => &[Partition::VerticalPosition],
            _ => &[],
        }
    }

    /// The status flags that correspond to this partition.
    pub fn status_flags(self) -> SystemStatus {
        match self {
            Partition::Orientation => SystemStatus::ORIENTATION,
            Partition::Rate => SystemStatus::RATE,
            Partition::HorizontalPosition => SystemStatus::XY_POSITION,
            Partition::VerticalPosition => SystemStatus::Z_POSITION,
            Partition::HorizontalVelocity => SystemStatus::XY_VELOCITY,
            Partition::VerticalVelocity => SystemStatus::Z_VELOCITY,
            Partition::Extension(_) => SystemStatus::empty(),
        }
    }
}

/// Which of the built-in partitions exist in the state vector.
///
/// The vector is laid out as `[q(4), rate(3), position(3), velocity(3), extensions..]`,
/// skipping whatever is disabled here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateLayout {
    pub orientation: bool,
    pub rate: bool,
    pub position: bool,
    pub velocity: bool,
}

impl Default for StateLayout {
    fn default() -> Self {
        Self {
            orientation: true,
            rate: false,
            position: true,
            velocity: true,
        }
    }
}

/// Variances seeded into a partition's covariance block whenever it is (re)activated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriorVariances {
    pub orientation: f64,
    pub rate: f64,
    pub position: f64,
    pub velocity: f64,
}

impl Default for PriorVariances {
    fn default() -> Self {
        Self {
            orientation: 1.0,
            rate: 1.0,
            position: 100.0,
            velocity: 1.0,
        }
    }
}

/// A block of the state vector owned by a sub-model.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub name: String,
    pub offset: usize,
    pub dim: usize,
    pub prior_variance: f64,
}

// =========================================================================
// == State ==
// =========================================================================

/// The filter state: vector, covariance, active partitions and status flags.
///
/// This is the single source of truth for where each quantity lives in the
/// vector and whether it is currently being estimated. Models never cache a
/// `State`; they receive it by reference for the duration of one call.
#[derive(Debug, Clone)]
pub struct State {
    priors: PriorVariances,
    orientation: Option<usize>,
    rate: Option<usize>,
    position: Option<usize>,
    velocity: Option<usize>,
    extensions: Vec<Extension>,
    x: StateVector,
    p: Covariance,
    enabled: Vec<Partition>,
    system_status: SystemStatus,
    measurement_status: SystemStatus,
}

impl State {
    pub fn new(layout: &StateLayout, priors: PriorVariances) -> Self {
        let mut dim = 0;
        let mut take = |present: bool, size: usize| -> Option<usize> {
            if !present {
                return None;
            }
            let offset = dim;
            dim += size;
            Some(offset)
        };
        let orientation = take(layout.orientation, 4);
        let rate = take(layout.rate, 3);
        let position = take(layout.position, 3);
        let velocity = take(layout.velocity, 3);

        let mut state = Self {
            priors,
            orientation,
            rate,
            position,
            velocity,
            extensions: Vec::new(),
            x: StateVector::zeros(dim),
            p: Covariance::zeros(dim, dim),
            enabled: Vec::new(),
            system_status: SystemStatus::empty(),
            measurement_status: SystemStatus::empty(),
        };
        state.reset();
        state
    }

    /// Returns to the initial estimate: identity orientation, zero everywhere
    /// else, no status flags. Orientation and all extensions are re-seeded.
    pub fn reset(&mut self) {
        self.x.fill(0.0);
        self.p.fill(0.0);
        if let Some(q) = self.orientation {
            self.x[q] = 1.0;
        }
        self.enabled.clear();
        self.system_status = SystemStatus::empty();
        self.measurement_status = SystemStatus::empty();

        self.enable(Partition::Orientation);
        for id in 0..self.extensions.len() {
            self.enable(Partition::Extension(id));
        }
    }

    // --- Layout Queries ---

    pub fn dimension(&self) -> usize {
        self.x.len()
    }

    pub fn orientation_index(&self) -> Option<usize> {
        self.orientation
    }

    pub fn rate_index(&self) -> Option<usize> {
        self.rate
    }

    pub fn position_index(&self) -> Option<usize> {
        self.position
    }

    pub fn velocity_index(&self) -> Option<usize> {
        self.velocity
    }

    pub fn extension(&self, name: &str) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.name == name)
    }

    pub fn extension_index(&self, name: &str) -> Option<usize> {
        self.extension(name).map(|e| e.offset)
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// The index range a partition occupies, or `None` if it is not part of the layout.
    pub fn range(&self, partition: Partition) -> Option<Range<usize>> {
        match partition {
            Partition::Orientation => self.orientation.map(|i| i..i + 4),
            Partition::Rate => self.rate.map(|i| i..i + 3),
            Partition::HorizontalPosition => self.position.map(|i| i..i + 2),
            Partition::VerticalPosition => self.position.map(|i| i + 2..i + 3),
            Partition::HorizontalVelocity => self.velocity.map(|i| i..i + 2),
            Partition::VerticalVelocity => self.velocity.map(|i| i + 2..i + 3),
            Partition::Extension(id) => self
                .extensions
                .get(id)
                .map(|e| e.offset..e.offset + e.dim),
        }
    }

    /// Appends a block of `dim` dimensions owned by a sub-model and activates it.
    ///
    /// # Returns
    /// The offset of the new block in the state vector.
    pub fn add_extension(&mut self, name: &str, dim: usize, prior_variance: f64) -> Result<usize> {
        if self.extension(name).is_some() {
            return Err(KestrelError::DuplicateName(name.to_string()));
        }
        let offset = self.dimension();
        let n = offset + dim;

        self.x = std::mem::replace(&mut self.x, StateVector::zeros(0)).resize_vertically(n, 0.0);
        self.p = std::mem::replace(&mut self.p, Covariance::zeros(0, 0)).resize(n, n, 0.0);

        let id = self.extensions.len();
        self.extensions.push(Extension {
            name: name.to_string(),
            offset,
            dim,
            prior_variance,
        });
        self.enable(Partition::Extension(id));
        Ok(offset)
    }

    // --- Activation ---

    pub fn is_enabled(&self, partition: Partition) -> bool {
        self.enabled.contains(&partition)
    }

    pub fn enabled_partitions(&self) -> &[Partition] {
        &self.enabled
    }

    /// Activates a partition and its prerequisites.
    ///
    /// A newly activated block has its covariance rows and columns cleared and
    /// its diagonal set to the configured prior variance. Does nothing if the
    /// partition is already active or not part of the layout.
    ///
    /// # Returns
    /// `true` if the partition was switched on by this call.
    pub fn enable(&mut self, partition: Partition) -> bool {
        let Some(range) = self.range(partition) else {
            return false;
        };
        if self.is_enabled(partition) {
            return false;
        }
        for prerequisite in partition.prerequisites() {
            self.enable(*prerequisite);
        }

        let variance = self.prior_variance(partition);
        for i in range {
            self.p.row_mut(i).fill(0.0);
            self.p.column_mut(i).fill(0.0);
            self.p[(i, i)] = variance;
        }
        self.enabled.push(partition);
        true
    }

    /// Deactivates a partition and everything that depends on it.
    ///
    /// The cross-covariance between the block and the rest of the state is
    /// cleared, its own block is left frozen.
    ///
    /// # Returns
    /// `true` if the partition was switched off by this call.
    pub fn disable(&mut self, partition: Partition) -> bool {
        if !self.is_enabled(partition) {
            return false;
        }
        for dependent in partition.dependents() {
            self.disable(*dependent);
        }
        if let Some(range) = self.range(partition) {
            let n = self.dimension();
            for i in range.clone() {
                for j in (0..n).filter(|j| !range.contains(j)) {
                    self.p[(i, j)] = 0.0;
                    self.p[(j, i)] = 0.0;
                }
            }
        }
        self.enabled.retain(|p| *p != partition);
        true
    }

    fn prior_variance(&self, partition: Partition) -> f64 {
        match partition {
            Partition::Orientation => self.priors.orientation,
            Partition::Rate => self.priors.rate,
            Partition::HorizontalPosition | Partition::VerticalPosition => self.priors.position,
            Partition::HorizontalVelocity | Partition::VerticalVelocity => self.priors.velocity,
            Partition::Extension(id) => self
                .extensions
                .get(id)
                .map(|e| e.prior_variance)
                .unwrap_or(0.0),
        }
    }

    /// Brings the active partitions in line with a set of status flags.
    fn apply_status(&mut self, status: SystemStatus) {
        let flagged = |p: Partition| match p {
            Partition::Orientation | Partition::Extension(_) => true,
            other => status.intersects(other.status_flags()),
        };
        // A partition stays on while anything that depends on it is flagged.
        let wanted = |p: Partition| flagged(p) || p.dependents().iter().any(|d| flagged(*d));

        // Dependents first, so disabling never has to cascade into something
        // that is about to be enabled again.
        for p in [
            Partition::HorizontalPosition,
            Partition::VerticalPosition,
            Partition::HorizontalVelocity,
            Partition::VerticalVelocity,
            Partition::Rate,
        ] {
            if !wanted(p) {
                self.disable(p);
            }
        }
        for p in [
            Partition::Orientation,
            Partition::Rate,
            Partition::HorizontalVelocity,
            Partition::VerticalVelocity,
            Partition::HorizontalPosition,
            Partition::VerticalPosition,
        ] {
            if wanted(p) {
                self.enable(p);
            }
        }
    }

    /// Per-dimension activity mask.
    pub fn active_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.dimension()];
        for partition in &self.enabled {
            if let Some(range) = self.range(*partition) {
                for i in range {
                    mask[i] = true;
                }
            }
        }
        mask
    }

    /// Sorted indices of all active dimensions.
    pub fn active_indices(&self) -> Vec<usize> {
        self.active_mask()
            .iter()
            .enumerate()
            .filter_map(|(i, active)| active.then_some(i))
            .collect()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.enabled.iter().any(|p| {
            self.range(*p)
                .map(|range| range.contains(&index))
                .unwrap_or(false)
        })
    }

    /// The subset of `flags` whose partitions are not currently active.
    pub fn unsupported(&self, flags: SystemStatus) -> SystemStatus {
        let mut covered = SystemStatus::empty();
        for partition in &self.enabled {
            covered |= partition.status_flags();
        }
        flags.partitions() - covered
    }

    // --- Status Flags ---

    pub fn system_status(&self) -> SystemStatus {
        self.system_status
    }

    pub fn measurement_status(&self) -> SystemStatus {
        self.measurement_status
    }

    /// Replaces the system status and activates/deactivates partitions to match.
    pub fn set_system_status(&mut self, status: SystemStatus) {
        let set = status - self.system_status;
        let cleared = self.system_status - status;
        if !set.is_empty() {
            info!("Set system status {}", set);
        }
        if !cleared.is_empty() {
            info!("Cleared system status {}", cleared);
        }
        self.system_status = status;
        self.apply_status(status);
    }

    pub fn update_system_status(&mut self, set: SystemStatus, clear: SystemStatus) {
        self.set_system_status((self.system_status | set) - clear);
    }

    pub fn set_measurement_status(&mut self, status: SystemStatus) {
        self.measurement_status = status;
    }

    // --- Vector and Covariance Access ---

    pub fn vector(&self) -> &StateVector {
        &self.x
    }

    pub fn vector_mut(&mut self) -> &mut StateVector {
        &mut self.x
    }

    pub fn covariance(&self) -> &Covariance {
        &self.p
    }

    pub fn covariance_mut(&mut self) -> &mut Covariance {
        &mut self.p
    }

    /// The orientation quaternion as (w, x, y, z), read from `x`.
    pub fn orientation(&self) -> Option<Quaternion<f64>> {
        self.orientation.map(|i| quaternion_at(&self.x, i))
    }

    pub fn set_orientation(&mut self, orientation: &UnitQuaternion<f64>) {
        if let Some(i) = self.orientation {
            self.x[i] = orientation.w;
            self.x[i + 1] = orientation.i;
            self.x[i + 2] = orientation.j;
            self.x[i + 3] = orientation.k;
        }
    }

    pub fn rate(&self) -> Option<Vector3<f64>> {
        self.rate.map(|i| vector3_at(&self.x, i))
    }

    pub fn set_rate(&mut self, rate: &Vector3<f64>) {
        if let Some(i) = self.rate {
            self.x.fixed_rows_mut::<3>(i).copy_from(rate);
        }
    }

    pub fn position(&self) -> Option<Vector3<f64>> {
        self.position.map(|i| vector3_at(&self.x, i))
    }

    pub fn set_position(&mut self, position: &Vector3<f64>) {
        if let Some(i) = self.position {
            self.x.fixed_rows_mut::<3>(i).copy_from(position);
        }
    }

    pub fn velocity(&self) -> Option<Vector3<f64>> {
        self.velocity.map(|i| vector3_at(&self.x, i))
    }

    pub fn set_velocity(&mut self, velocity: &Vector3<f64>) {
        if let Some(i) = self.velocity {
            self.x.fixed_rows_mut::<3>(i).copy_from(velocity);
        }
    }

    // --- Housekeeping ---

    /// Restores unit norm of the orientation quaternion.
    pub fn normalize(&mut self) {
        if let Some(i) = self.orientation {
            let mut q = self.x.fixed_rows_mut::<4>(i);
            let norm = q.norm();
            if norm > 0.0 && norm.is_finite() {
                q /= norm;
            } else {
                q.copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
            }
        }
    }

    /// Forces `P` to be exactly symmetric.
    pub fn symmetrize(&mut self) {
        let transposed = self.p.transpose();
        self.p += transposed;
        self.p *= 0.5;
    }
}

/// Reads a (w, x, y, z) quaternion starting at `offset`.
pub fn quaternion_at(x: &DVector<f64>, offset: usize) -> Quaternion<f64> {
    Quaternion::new(x[offset], x[offset + 1], x[offset + 2], x[offset + 3])
}

pub fn vector3_at(x: &DVector<f64>, offset: usize) -> Vector3<f64> {
    Vector3::new(x[offset], x[offset + 1], x[offset + 2])
}
