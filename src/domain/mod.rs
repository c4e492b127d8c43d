//! Domain layer: transaction values, run policy and the ports to the outside world.
//!
//! Nothing in here performs I/O. The decline policy and the offline limit evaluator
//! are pure functions.

pub mod amount;
pub mod audit;
pub mod cancellation;
pub mod intent;
pub mod offline;
pub mod parameters;
pub mod policy;
pub mod ports;
pub mod run_config;
