//! Fleet Configuration Module
//!
//! Deployment configuration loaded from TOML files: which device type carries
//! vehicle telemetry, the commands each device type accepts, queue tuning,
//! alert rule thresholds, and the static asset directory.
//!
//! ## Loading Order
//!
//! 1. `FLEET_CONFIG` environment variable (path to TOML file)
//! 2. `fleet_config.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! The config is an explicit value: load it once at startup and pass it by
//! reference to the components that need it.
//!
//! ```ignore
//! let config = FleetConfig::load();
//! let engine = RuleEngine::from_config(&config.rules);
//! ```

mod fleet_config;
pub mod defaults;
pub mod validation;

pub use fleet_config::*;
