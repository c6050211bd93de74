//! Fleet Sentinel: vehicle telemetry routing and edge-triggered alerting
//!
//! Ingests device messages from many vehicles, fans them out to subscribers,
//! and opens/closes per-vehicle alerts from threshold rules.
//!
//! ## Architecture
//!
//! - **SerialQueue**: one-at-a-time execution of async tasks (outbound commands)
//! - **EventRouter**: wildcard publish/subscribe over per-device, per-type and global topics
//! - **ProbeNormalizer**: raw telemetry → canonical probe, via the asset directory
//! - **RuleEngine**: edge-triggered low fuel / engine temperature alerts
//! - **Pipeline**: ties the above together on a single worker task

pub mod acquisition;
pub mod commands;
pub mod config;
pub mod pipeline;
pub mod queue;
pub mod router;
pub mod rules;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::FleetConfig;

// Re-export commonly used types
pub use types::{Alert, DeviceEvent, InboundMessage, Probe, Severity, Vehicle, VehicleInfo};

// Re-export core components
pub use acquisition::{AssetDirectory, ProbeNormalizer, StaticAssetDirectory};
pub use commands::{CommandDispatcher, CommandSink, TracingCommandSink};
pub use pipeline::{PipelineCoordinator, PipelineStats, ProcessingLoop};
pub use queue::{QueueConfig, QueuedTask, SerialQueue, TaskError};
pub use router::{EventRouter, TopicPattern};
pub use rules::{AlertRule, Evaluation, RuleEngine};
pub use storage::{AlertStore, InMemoryAlertStore};
