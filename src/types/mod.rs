//! Shared data structures for the telemetry alerting pipeline
//!
//! - Probe: one canonical telemetry sample for a vehicle
//! - Vehicle / VehicleInfo: per-vehicle state the rule engine reads
//! - Alert: open/close domain event produced by alert rules
//! - DeviceEvent: inbound device messages after decoding (status, telemetry, command)

mod alert;
mod event;
mod probe;
mod vehicle;

pub use alert::*;
pub use event::*;
pub use probe::*;
pub use vehicle::*;
