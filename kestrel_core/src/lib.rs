// kestrel_core/src/lib.rs

//! Pose and navigation estimation around a partitioned Extended Kalman Filter.
//!
//! The state holds an orientation quaternion plus optional rate, position and
//! velocity partitions. Which partitions are estimated follows from the status
//! flags the registered measurements provide.
pub mod config;
pub mod error;
pub mod estimation;
pub mod global_reference;
pub mod messages;
pub mod models;
pub mod parameters;
pub mod prelude;
pub mod state;
pub mod status;
pub mod types;
pub mod utils;
