//! Telemetry acquisition module
//!
//! Turns decoded vehicle telemetry into canonical probes, resolving device
//! identity through the asset directory.

pub mod directory;
pub mod normalizer;

pub use directory::{AssetDirectory, AssetIdentity, DirectoryError, StaticAssetDirectory};
pub use normalizer::{NormalizeError, ProbeNormalizer, SkipReason};
