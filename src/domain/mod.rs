//! Domain layer for the test station
//!
//! Pure data types, the fault taxonomy and the port traits the core drives.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DutFault, ErrorCode, FaultKind, StationError, StationResult};
