// kestrel_core/src/prelude.rs

// --- Core Abstractions ---
pub use crate::models::measurement::{Fusion, MeasurementModel};
pub use crate::models::system::{BiasModel, SystemModel};

// --- Core Data Structures ---
pub use crate::config::EstimatorConfig;
pub use crate::error::{Diagnostic, DiagnosticKind, KestrelError, Result};
pub use crate::global_reference::GlobalReference;
pub use crate::messages::{GpsFix, MeasurementData, MeasurementUpdate, PoseFix, PoseSnapshot};
pub use crate::parameters::ParameterList;
pub use crate::state::{Partition, PriorVariances, State, StateLayout};
pub use crate::status::SystemStatus;
pub use crate::types::{SystemInput, GRAVITY};

// --- Estimation ---
pub use crate::estimation::estimator::{Estimator, UpdateReport};
pub use crate::estimation::filters::ekf::ExtendedKalmanFilter;
pub use crate::estimation::measurement::Measurement;
pub use crate::estimation::{CorrectionOutcome, SkipReason};
pub use crate::utils::integrators::IntegratorKind;

// --- Concrete Model Implementations ---
pub use crate::models::measurement::gps::GpsModel;
pub use crate::models::measurement::gravity::GravityModel;
pub use crate::models::measurement::heading::HeadingModel;
pub use crate::models::measurement::height::HeightModel;
pub use crate::models::measurement::magnetic::MagneticModel;
pub use crate::models::measurement::pose_update::PoseUpdateModel;
pub use crate::models::measurement::position::PositionModel;
pub use crate::models::measurement::rate::RateModel;
pub use crate::models::measurement::zero_rate::ZeroRateModel;
pub use crate::models::system::imu_bias::{AccelerometerBiasModel, GyroBiasModel};
pub use crate::models::system::quaternion::QuaternionKinematicsModel;
