//! System-wide default constants.
//!
//! Grouped by subsystem. Config structs in `fleet_config.rs` use these as
//! their serde defaults.

// ============================================================================
// Transport
// ============================================================================

/// Device type whose telemetry is normalized into probes.
pub const VEHICLE_DEVICE_TYPE: &str = "vehicle";

/// Event name used when a status payload carries no `Action`.
pub const UNKNOWN_STATUS_ACTION: &str = "Unknown";

// ============================================================================
// Serial Queue
// ============================================================================

/// Pause between one task's callback returning and the next task starting (ms).
pub const QUEUE_YIELD_DELAY_MS: u64 = 10;

// ============================================================================
// Rules
// ============================================================================

/// Vehicles from this vendor are flagged as simulated on their alerts.
pub const SIMULATION_VENDOR: &str = "IBM";

/// Fuel ratio below which `low_fuel` fires.
pub const LOW_FUEL_RATIO: f64 = 0.10;

/// Fuel ratio below which `half_fuel` fires.
pub const HALF_FUEL_RATIO: f64 = 0.50;

/// Engine temperature above which `high_engine_temp` fires.
pub const HIGH_ENGINE_TEMP_LIMIT: f64 = 120.0;

// ============================================================================
// Pipeline
// ============================================================================

/// Capacity of the router → pipeline worker channel (events).
pub const PIPELINE_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// Simulation
// ============================================================================

/// Fuel tank capacity for simulated vehicles (litres).
pub const SIM_FUEL_TANK: f64 = 60.0;

/// Initial fuel for simulated vehicles (litres).
pub const SIM_FUEL_DEFAULT: f64 = 50.0;

/// Initial engine temperature for simulated vehicles.
pub const SIM_ENGINE_TEMP_DEFAULT: f64 = 80.0;

/// Upper bound of the simulated engine temperature; beyond it the value resets.
pub const SIM_ENGINE_TEMP_MAX: f64 = 130.0;
