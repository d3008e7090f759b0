use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use audit_engine::export::{ExportJobManager, FsArtifactSink, FsExportJobRepository};
use audit_engine::permissions::StaticPermissionResolver;
use audit_engine::rate_limit::RateLimiter;
use audit_engine::store::InMemoryAuditEventStore;
use audit_engine::{AuditViewService, EngineConfig};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory for durable export job records
    pub data_dir: PathBuf,
    /// Directory for completed export artifacts
    pub export_dir: PathBuf,
    /// Concurrent export executions
    pub export_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/export-jobs"),
            export_dir: PathBuf::from("./data/exports"),
            export_workers: 2,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Read path: permission-scoped search and single-entry lookup
    pub views: Arc<AuditViewService>,
    /// Async export pipeline
    pub exports: Arc<ExportJobManager>,
}

impl AppState {
    pub fn new(views: Arc<AuditViewService>, exports: Arc<ExportJobManager>) -> Self {
        Self { views, exports }
    }

    /// Wire the engine with the file-backed job store and artifact sink.
    ///
    /// The event store and permission resolver are deployment adapters; this
    /// bootstrap installs the in-memory pair, which deployments replace via
    /// [`AppState::new`].
    pub async fn bootstrap(config: &ServerConfig) -> Result<Self> {
        let engine_config = EngineConfig {
            export: audit_engine::ExportConfig {
                workers: config.export_workers,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(InMemoryAuditEventStore::new());
        let resolver = Arc::new(StaticPermissionResolver::new());
        let limiter = Arc::new(RateLimiter::new(engine_config.rate_limits.clone()));
        let repo = Arc::new(FsExportJobRepository::open(&config.data_dir).await?);
        let sink = Arc::new(FsArtifactSink::open(&config.export_dir).await?);

        let views = Arc::new(AuditViewService::new(
            store.clone(),
            resolver.clone(),
            limiter.clone(),
            engine_config.clone(),
        ));
        let exports = ExportJobManager::start(
            repo,
            store,
            resolver,
            sink,
            limiter,
            engine_config,
        );

        // Pick up jobs left over from a previous process before traffic.
        let report = exports.recover().await?;
        info!(
            requeued = report.requeued,
            failed = report.failed,
            "export recovery complete"
        );

        Ok(Self::new(views, exports))
    }
}
