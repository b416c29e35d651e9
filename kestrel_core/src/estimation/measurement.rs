// kestrel_core/src/estimation/measurement.rs

use std::collections::VecDeque;
use tracing::debug;

use crate::error::{KestrelError, Result};
use crate::messages::MeasurementUpdate;
use crate::models::measurement::MeasurementModel;
use crate::parameters::{as_flag, from_flag, ParameterList};
use crate::state::State;
use crate::status::SystemStatus;

/// Updates kept per measurement between two cycles. The oldest is dropped first.
pub const QUEUE_CAPACITY: usize = 10;

/// A named measurement: a model plus its lifecycle.
///
/// The wrapper owns the update queue, the time since the last accepted update
/// and the status flags the measurement currently contributes.
#[derive(Debug, Clone)]
pub struct Measurement {
    name: String,
    model: Box<dyn MeasurementModel>,
    pub enabled: bool,
    /// Seconds without an accepted update after which the flags are dropped.
    /// Zero disables the timeout.
    pub timeout: f64,
    /// Minimum seconds between two accepted updates.
    pub min_interval: f64,
    timer: f64,
    updated: bool,
    status_flags: SystemStatus,
    queue: VecDeque<MeasurementUpdate>,
}

impl Measurement {
    pub fn new(name: &str, model: Box<dyn MeasurementModel>) -> Self {
        Self {
            name: name.to_string(),
            model,
            enabled: true,
            timeout: 1.0,
            min_interval: 0.0,
            timer: 0.0,
            updated: false,
            status_flags: SystemStatus::empty(),
            queue: VecDeque::with_capacity(QUEUE_CAPACITY),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &dyn MeasurementModel {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn MeasurementModel {
        self.model.as_mut()
    }

    pub(crate) fn replace_model(&mut self, model: Box<dyn MeasurementModel>) {
        self.model = model;
        self.status_flags = SystemStatus::empty();
        self.updated = false;
        self.timer = 0.0;
    }

    /// Flags contributed by the last accepted update, empty after a timeout.
    pub fn status_flags(&self) -> SystemStatus {
        self.status_flags
    }

    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn timed_out(&self) -> bool {
        self.timeout > 0.0 && self.timer > self.timeout
    }

    pub fn rate_limited(&self) -> bool {
        self.updated && self.timer < self.min_interval
    }

    pub fn increase_timer(&mut self, dt: f64) {
        self.timer += dt;
        if self.timed_out() && !self.status_flags.is_empty() {
            debug!(
                "Measurement {} timed out after {:.2} s, dropping {}",
                self.name, self.timer, self.status_flags
            );
            self.status_flags = SystemStatus::empty();
        }
    }

    /// Records an accepted update.
    pub(crate) fn mark_updated(&mut self) {
        self.timer = 0.0;
        self.updated = true;
        self.status_flags = self.model.status_flags();
    }

    // --- Queue ---

    pub fn enqueue(&mut self, update: MeasurementUpdate) {
        if self.queue.len() >= QUEUE_CAPACITY {
            debug!("Queue of measurement {} is full, dropping oldest update", self.name);
            self.queue.pop_front();
        }
        self.queue.push_back(update);
    }

    pub(crate) fn dequeue(&mut self) -> Option<MeasurementUpdate> {
        self.queue.pop_front()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn reset(&mut self, state: &State) {
        self.timer = 0.0;
        self.updated = false;
        self.status_flags = SystemStatus::empty();
        self.queue.clear();
        self.model.reset(state);
    }

    // --- Parameters ---

    pub fn parameters(&self) -> ParameterList {
        let mut list = ParameterList::new()
            .with("enabled", from_flag(self.enabled))
            .with("timeout", self.timeout)
            .with("min_interval", self.min_interval);
        for p in self.model.parameters().iter() {
            list.add(&p.key, p.value);
        }
        list
    }

    pub fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "enabled" => self.enabled = as_flag(value),
            "timeout" => self.timeout = value,
            "min_interval" => self.min_interval = value,
            _ => {
                return self.model.set_parameter(key, value).map_err(|_| {
                    KestrelError::UnknownParameter(format!("{}/{}", self.name, key))
                })
            }
        }
        Ok(())
    }
}
