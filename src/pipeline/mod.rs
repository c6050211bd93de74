//! Processing Pipeline Module
//!
//! ## Flow
//!
//! ```text
//! MessageSource ──► EventRouter.dispatch ──► "+" handler ──► bounded channel
//!                                                                  │
//!        AlertStore ◄── RuleEngine.evaluate ◄── VehicleTracker ◄── ProbeNormalizer
//! ```
//!
//! The router handler never awaits: it enqueues telemetry for a single worker
//! task, which normalizes, evaluates and stores one probe at a time.

mod coordinator;
mod state;
mod tracker;
pub mod processing_loop;
pub mod source;

pub use coordinator::{PipelineCoordinator, PipelineHandle};
pub use processing_loop::ProcessingLoop;
pub use source::{FileSource, MessageSource, ReplaySource, SourceEvent, StdinSource};
pub use state::{PipelineCounters, PipelineStats};
pub use tracker::VehicleTracker;
