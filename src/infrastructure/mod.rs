//! Adapters for the domain ports: offline log stores and the scripted collaborators.

pub mod in_memory;
pub mod json_lines;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod scripted;
