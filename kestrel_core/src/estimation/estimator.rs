// kestrel_core/src/estimation/estimator.rs

use nalgebra::UnitQuaternion;
use std::collections::VecDeque;
use tracing::{info, warn};

use crate::config::EstimatorConfig;
use crate::error::{Diagnostic, KestrelError, Result};
use crate::estimation::filters::ekf::ExtendedKalmanFilter;
use crate::estimation::measurement::Measurement;
use crate::estimation::CorrectionOutcome;
use crate::global_reference::GlobalReference;
use crate::messages::{MeasurementUpdate, PoseSnapshot};
use crate::models::measurement::MeasurementModel;
use crate::models::system::{BiasModel, SystemModel};
use crate::parameters::{split_key, ParameterList};
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, StateVector, SystemInput};

/// A time step below this resets the estimator instead of being ignored.
const RESET_TIME_STEP: f64 = -1.0;

/// The outcome of one measurement update within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub measurement: String,
    pub outcome: CorrectionOutcome,
}

/// The pose estimator: a filter, its measurements and the global reference.
///
/// Sensor callbacks queue updates with [`Estimator::add_update`]. Each call to
/// [`Estimator::update`] then predicts with the latest input and drains all
/// queues, in the order the measurements were registered.
#[derive(Debug, Clone)]
pub struct Estimator {
    config: EstimatorConfig,
    filter: ExtendedKalmanFilter,
    measurements: Vec<Measurement>,
    reference: GlobalReference,
    alignment_elapsed: f64,
    timestamp: Option<f64>,
}

impl Estimator {
    pub fn new(config: EstimatorConfig, system: Box<dyn SystemModel>) -> Result<Self> {
        let state = State::new(&config.layout, config.priors.clone());
        let filter = ExtendedKalmanFilter::new(state, system, &config)?;
        let mut estimator = Self {
            config,
            filter,
            measurements: Vec::new(),
            reference: GlobalReference::new(),
            alignment_elapsed: 0.0,
            timestamp: None,
        };
        estimator.reset();
        Ok(estimator)
    }

    /// Replaces the system model. The state is rebuilt from the prior.
    pub fn set_system_model(&mut self, system: Box<dyn SystemModel>) -> Result<()> {
        let state = State::new(&self.config.layout, self.config.priors.clone());
        self.filter = ExtendedKalmanFilter::new(state, system, &self.config)?;
        self.reset();
        Ok(())
    }

    pub fn add_sub_model(&mut self, model: Box<dyn BiasModel>) -> Result<()> {
        self.filter.add_sub_model(model)
    }

    /// Registers a measurement. A measurement with the same name is replaced
    /// in place, keeping its position in the update order.
    pub fn add_measurement(
        &mut self,
        name: &str,
        model: Box<dyn MeasurementModel>,
    ) -> &mut Measurement {
        let index = match self.measurements.iter().position(|m| m.name() == name) {
            Some(index) => {
                info!("Replacing measurement {}", name);
                self.measurements[index].replace_model(model);
                index
            }
            None => {
                self.measurements.push(Measurement::new(name, model));
                self.measurements.len() - 1
            }
        };
        self.update_measurement_status();
        &mut self.measurements[index]
    }

    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.name() == name)
    }

    pub fn measurement_mut(&mut self, name: &str) -> Option<&mut Measurement> {
        self.measurements.iter_mut().find(|m| m.name() == name)
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Back to the initial state and prior. Timers, queues and the global
    /// reference are cleared.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.reference.reset();
        for measurement in &mut self.measurements {
            measurement.reset(self.filter.state());
        }
        self.alignment_elapsed = 0.0;
        self.timestamp = None;

        let mode = if self.config.alignment_time > 0.0 {
            SystemStatus::ALIGNMENT
        } else {
            SystemStatus::DEGRADED
        };
        let state = self.filter.state_mut();
        state.set_measurement_status(self.config.forced_status);
        state.set_system_status(mode);
        self.filter.refresh_status();
        info!("Estimator reset");
    }

    // --- Cycle ---

    /// Stores the latest process input and its timestamp for [`Estimator::update_at`].
    pub fn set_input(&mut self, input: SystemInput) {
        self.filter.set_input(input);
    }

    /// Runs a cycle up to `timestamp` with the input last given to `set_input`.
    pub fn update_at(&mut self, timestamp: f64) -> Vec<UpdateReport> {
        let dt = match self.timestamp {
            Some(last) => timestamp - last,
            None => 0.0,
        };
        let input = *self.filter.input();
        let reports = self.update(input, dt);
        if dt >= 0.0 {
            self.timestamp = Some(timestamp);
        }
        reports
    }

    /// Runs one cycle: predict over `dt`, then every queued measurement.
    ///
    /// A `dt` below -1 s is taken as a jump back in time and resets the
    /// estimator. Any other negative `dt` is ignored.
    pub fn update(&mut self, input: SystemInput, dt: f64) -> Vec<UpdateReport> {
        if dt < RESET_TIME_STEP {
            warn!("Time jumped back by {:.3} s, resetting", -dt);
            self.reset();
            return Vec::new();
        }
        if dt < 0.0 {
            warn!("Ignoring negative time step of {:.3} s", dt);
            return Vec::new();
        }
        self.filter.set_input(input);

        // 1. Alignment phase.
        if self.aligning() {
            self.alignment_elapsed += dt;
            if self.alignment_elapsed >= self.config.alignment_time {
                info!("Alignment finished after {:.2} s", self.alignment_elapsed);
                self.filter
                    .state_mut()
                    .update_system_status(SystemStatus::DEGRADED, SystemStatus::ALIGNMENT);
            }
        }

        // 2. Predict. `dt` is non-negative here.
        if let Err(e) = self.filter.predict(dt) {
            warn!("Prediction failed: {}", e);
        }

        // 3. Corrections, in registration order.
        let mut reports = Vec::new();
        for measurement in self.measurements.iter_mut() {
            while let Some(update) = measurement.dequeue() {
                let outcome =
                    self.filter
                        .process_measurement(measurement, &update, &mut self.reference);
                reports.push(UpdateReport {
                    measurement: measurement.name().to_string(),
                    outcome,
                });
            }
            measurement.increase_timer(dt);
        }

        // 4. Status.
        self.update_measurement_status();
        if !self.aligning() {
            let navigating = self
                .filter
                .state()
                .system_status()
                .contains(SystemStatus::NAVIGATION);
            let state = self.filter.state_mut();
            if navigating {
                state.update_system_status(SystemStatus::READY, SystemStatus::DEGRADED);
            } else {
                state.update_system_status(SystemStatus::DEGRADED, SystemStatus::READY);
            }
        }

        if let Some(timestamp) = self.timestamp.as_mut() {
            *timestamp += dt;
        }
        reports
    }

    fn aligning(&self) -> bool {
        self.filter
            .state()
            .system_status()
            .contains(SystemStatus::ALIGNMENT)
    }

    /// Recomputes the measurement status from all measurements plus the forced flags.
    fn update_measurement_status(&mut self) {
        let measured = self
            .measurements
            .iter()
            .fold(self.config.forced_status, |acc, m| acc | m.status_flags());
        self.filter.state_mut().set_measurement_status(measured);
        self.filter.refresh_status();
    }

    // --- Measurement Input ---

    /// Queues an update for the next cycle.
    pub fn add_update(&mut self, name: &str, update: MeasurementUpdate) -> Result<()> {
        let measurement = self
            .measurement_mut(name)
            .ok_or_else(|| KestrelError::UnknownMeasurement(name.to_string()))?;
        measurement.enqueue(update);
        Ok(())
    }

    /// Applies an update right away, outside of the cycle.
    pub fn process_update(
        &mut self,
        name: &str,
        update: &MeasurementUpdate,
    ) -> Result<CorrectionOutcome> {
        let measurement = self
            .measurements
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| KestrelError::UnknownMeasurement(name.to_string()))?;
        Ok(self
            .filter
            .process_measurement(measurement, update, &mut self.reference))
    }

    // --- Output ---

    pub fn state(&self) -> &StateVector {
        self.filter.state().vector()
    }

    pub fn covariance(&self) -> &Covariance {
        self.filter.state().covariance()
    }

    pub fn system_status(&self) -> SystemStatus {
        self.filter.state().system_status()
    }

    pub fn measurement_status(&self) -> SystemStatus {
        self.filter.state().measurement_status()
    }

    pub fn filter(&self) -> &ExtendedKalmanFilter {
        &self.filter
    }

    pub fn global_reference(&self) -> &GlobalReference {
        &self.reference
    }

    pub fn global_reference_mut(&mut self) -> &mut GlobalReference {
        &mut self.reference
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub fn pose(&self) -> PoseSnapshot {
        let state = self.filter.state();
        PoseSnapshot {
            timestamp: self.timestamp,
            orientation: state.orientation().map(UnitQuaternion::from_quaternion),
            rate: state.rate(),
            position: state.position(),
            velocity: state.velocity(),
            status: state.system_status(),
        }
    }

    pub fn diagnostics(&self) -> &VecDeque<Diagnostic> {
        self.filter.diagnostics()
    }

    // --- Parameters ---

    /// All tunables as `"system/..."`, `"reference/..."` and `"<measurement>/..."`.
    pub fn parameters(&self) -> ParameterList {
        let mut list = ParameterList::new();
        list.extend_prefixed("system", self.filter.system_parameters());
        list.extend_prefixed("reference", self.reference.parameters());
        for measurement in &self.measurements {
            list.extend_prefixed(measurement.name(), measurement.parameters());
        }
        list
    }

    pub fn set_parameter(&mut self, path: &str, value: f64) -> Result<()> {
        let unknown = || KestrelError::UnknownParameter(path.to_string());
        let (owner, key) = split_key(path).ok_or_else(unknown)?;
        match owner {
            "system" => self
                .filter
                .set_system_parameter(key, value)
                .map_err(|_| unknown()),
            "reference" => self.reference.set_parameter(key, value).map_err(|_| unknown()),
            name => self
                .measurement_mut(name)
                .ok_or_else(unknown)?
                .set_parameter(key, value)
                .map_err(|_| unknown()),
        }
    }
}
