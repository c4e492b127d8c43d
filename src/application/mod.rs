//! Application layer: the transaction state machine and the flows around it.
//!
//! `TransactionOrchestrator` drives one run at a time as a spawned `tokio` task and
//! hands back a `RunHandle` for cancellation. Capture and collect-data are separate
//! coordinators so they can be used and tested on their own.

pub mod capture;
pub mod collect_data;
pub mod delegate;
pub mod orchestrator;
pub mod run_handle;
