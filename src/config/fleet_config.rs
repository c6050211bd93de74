//! Fleet Configuration - transport, queue, rule and asset settings as TOML
//!
//! Every struct implements `Default` with the values in `defaults.rs`, so a
//! missing file or section behaves exactly like the built-in constants.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "FLEET_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "fleet_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a deployment.
///
/// Built once in `main` and passed by reference to the components that need
/// it. Load with `FleetConfig::load()` which searches:
/// 1. `$FLEET_CONFIG`
/// 2. `./fleet_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Inbound transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Device types and the commands they accept
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Serial queue tuning
    #[serde(default)]
    pub queue: QueueSettings,

    /// Alert rule thresholds
    #[serde(default)]
    pub rules: RulesConfig,

    /// Pipeline worker settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Static asset directory entries (device → vehicle/driver)
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

impl FleetConfig {
    /// Load configuration using the standard search order:
    /// 1. `$FLEET_CONFIG` environment variable
    /// 2. `./fleet_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), assets = config.assets.len(), "Loaded fleet config from FLEET_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from FLEET_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "FLEET_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(assets = config.assets.len(), "Loaded fleet config from ./fleet_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./fleet_config.toml, using defaults");
                }
            }
        }

        info!("No fleet_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate thresholds and table entries for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.transport.vehicle_device_type.trim().is_empty() {
            errors.push("transport.vehicle_device_type must not be empty".to_string());
        }

        Self::check_ratio(self.rules.low_fuel.threshold_ratio, "rules.low_fuel.threshold_ratio", &mut errors);
        Self::check_ratio(self.rules.half_fuel.threshold_ratio, "rules.half_fuel.threshold_ratio", &mut errors);
        if !self.rules.high_engine_temp.limit.is_finite() {
            errors.push(format!(
                "rules.high_engine_temp.limit must be finite (got {})",
                self.rules.high_engine_temp.limit
            ));
        }

        if self.pipeline.channel_capacity == 0 {
            errors.push("pipeline.channel_capacity must be > 0".to_string());
        }
        if self.queue.task_timeout_ms == Some(0) {
            errors.push("queue.task_timeout_ms must be > 0 when set".to_string());
        }

        let mut seen_commands = HashSet::new();
        for device in &self.devices {
            for command in &device.commands {
                if command.name.trim().is_empty() {
                    errors.push(format!("devices[{}]: command name must not be empty", device.device_type));
                } else if !seen_commands.insert((device.device_type.as_str(), command.name.as_str())) {
                    errors.push(format!(
                        "devices[{}]: duplicate command '{}'",
                        device.device_type, command.name
                    ));
                }
            }
        }

        let mut seen_devices = HashSet::new();
        for asset in &self.assets {
            if asset.device_id.trim().is_empty() || asset.vehicle_id.trim().is_empty() {
                errors.push("assets: device_id and vehicle_id must not be empty".to_string());
            } else if !seen_devices.insert((asset.device_type.as_str(), asset.device_id.as_str())) {
                errors.push(format!(
                    "assets: duplicate entry for device '{}' ({})",
                    asset.device_id, asset.device_type
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_ratio(ratio: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, so check finiteness first
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            errors.push(format!("{name}: must be within (0, 1] (got {ratio})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Only telemetry from this device type is turned into probes
    #[serde(default = "default_vehicle_device_type")]
    pub vehicle_device_type: String,
}

fn default_vehicle_device_type() -> String {
    defaults::VEHICLE_DEVICE_TYPE.to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            vehicle_device_type: default_vehicle_device_type(),
        }
    }
}

/// One device type and the commands that may be sent to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_type: String,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Pause before starting the next task (ms)
    #[serde(default = "default_yield_delay_ms")]
    pub yield_delay_ms: u64,
    /// Abandon a task whose run takes longer than this (ms). Unset: wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout_ms: Option<u64>,
}

fn default_yield_delay_ms() -> u64 {
    defaults::QUEUE_YIELD_DELAY_MS
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            yield_delay_ms: default_yield_delay_ms(),
            task_timeout_ms: None,
        }
    }
}

impl QueueSettings {
    pub fn to_queue_config(&self) -> crate::queue::QueueConfig {
        crate::queue::QueueConfig {
            yield_delay: Duration::from_millis(self.yield_delay_ms),
            task_timeout: self.task_timeout_ms.map(Duration::from_millis),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Vendor whose vehicles produce `simulated` alerts
    #[serde(default = "default_simulation_vendor")]
    pub simulation_vendor: String,

    #[serde(default)]
    pub low_fuel: LowFuelRuleConfig,

    #[serde(default)]
    pub half_fuel: HalfFuelRuleConfig,

    #[serde(default)]
    pub high_engine_temp: EngineTempRuleConfig,
}

fn default_simulation_vendor() -> String {
    defaults::SIMULATION_VENDOR.to_string()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            simulation_vendor: default_simulation_vendor(),
            low_fuel: LowFuelRuleConfig::default(),
            half_fuel: HalfFuelRuleConfig::default(),
            high_engine_temp: EngineTempRuleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowFuelRuleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fires when the fuel ratio drops below this value
    #[serde(default = "default_low_fuel_ratio")]
    pub threshold_ratio: f64,
}

fn default_low_fuel_ratio() -> f64 {
    defaults::LOW_FUEL_RATIO
}

impl Default for LowFuelRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_ratio: default_low_fuel_ratio(),
        }
    }
}

/// Off unless enabled explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HalfFuelRuleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_half_fuel_ratio")]
    pub threshold_ratio: f64,
}

fn default_half_fuel_ratio() -> f64 {
    defaults::HALF_FUEL_RATIO
}

impl Default for HalfFuelRuleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_ratio: default_half_fuel_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineTempRuleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fires above, closes at or below
    #[serde(default = "default_engine_temp_limit")]
    pub limit: f64,
}

fn default_true() -> bool {
    true
}

fn default_engine_temp_limit() -> f64 {
    defaults::HIGH_ENGINE_TEMP_LIMIT
}

impl Default for EngineTempRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_engine_temp_limit(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Telemetry events buffered between the router and the worker
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Drop telemetry when the channel is full instead of pausing ingestion.
    /// Only for live transports that must never stall the reader.
    #[serde(default)]
    pub drop_when_full: bool,
}

fn default_channel_capacity() -> usize {
    defaults::PIPELINE_CHANNEL_CAPACITY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            drop_when_full: false,
        }
    }
}

// ============================================================================
// Assets
// ============================================================================

/// A device registered in the static asset directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub device_id: String,
    #[serde(default = "default_vehicle_device_type")]
    pub device_type: String,
    pub vehicle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Vehicle properties, e.g. `fueltank = 60`
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}
