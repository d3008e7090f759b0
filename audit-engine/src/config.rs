// Engine tuning knobs.
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

/// Engine-wide configuration shared by the view and export paths.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub limits: OperationLimits,
    pub export: ExportConfig,
    pub rate_limits: RateLimitConfig,
}

/// Bounds on individual downstream calls.
#[derive(Debug, Clone)]
pub struct OperationLimits {
    /// Ceiling on a single event store call.
    pub store_timeout: Duration,
    /// Ceiling on a single artifact sink call.
    pub sink_timeout: Duration,
}

impl Default for OperationLimits {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            sink_timeout: Duration::from_secs(10),
        }
    }
}

/// Export pipeline configuration.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Number of concurrent export executions system-wide.
    pub workers: usize,
    /// Events fetched from the store per page while streaming an export.
    pub batch_size: usize,
    /// Hard cap on the records a single export may contain.
    pub max_records: u64,
    /// How long a completed artifact stays downloadable.
    pub download_ttl: chrono::Duration,
    /// How many times a completed artifact may be downloaded.
    pub max_downloads: u32,
    /// Terminal jobs older than this are reported as garbage-collectable.
    pub retention: chrono::Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            batch_size: 1000,
            max_records: 10_000,
            download_ttl: chrono::Duration::days(7),
            max_downloads: 5,
            retention: chrono::Duration::days(30),
        }
    }
}
