//! Audit log viewing and export engine for AuditView
//!
//! This crate is the read side of the platform's audit trail. It provides:
//! - Permission-scoped search over an append-only audit event store
//! - Field-level redaction with a stable response shape
//! - Opaque, tamper-checked pagination cursors
//! - Asynchronous export jobs (CSV/JSON) with a bounded worker pool
//! - Durable export job records that survive a process restart
//! - Per-user rate limiting for queries and export submissions
//!
//! The event store and the permission resolver are external collaborators
//! behind traits, so the engine can run against fixed in-memory fakes in
//! tests and against real adapters in production.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use audit_engine::{
//!     AuditLogFilter, AuditViewService, EngineConfig, PermissionSet, UserContext,
//! };
//! use audit_engine::permissions::StaticPermissionResolver;
//! use audit_engine::rate_limit::RateLimiter;
//! use audit_engine::store::InMemoryAuditEventStore;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let store = Arc::new(InMemoryAuditEventStore::new());
//!     let resolver = Arc::new(StaticPermissionResolver::new());
//!     let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
//!
//!     let ctx = UserContext::new(Uuid::new_v4(), Uuid::new_v4());
//!     resolver.insert(&ctx, PermissionSet::new().grant("login", "create"));
//!
//!     let views = AuditViewService::new(store, resolver, limiter, config);
//!     let page = views.search(&ctx, &AuditLogFilter::default()).await?;
//!     assert!(page.entries.is_empty());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cursor;
pub mod entry;
pub mod error;
pub mod export;
pub mod filter;
pub mod permissions;
pub mod rate_limit;
pub mod store;
pub mod view;

pub use config::*;
pub use entry::*;
pub use error::*;
pub use export::{
    ArtifactHandle, ExportDownload, ExportFormat, ExportJob, ExportJobManager, ExportStatus,
    JobOwner, RecoveryReport,
};
pub use filter::*;
pub use permissions::{PermissionResolver, PermissionSet, UserContext, REDACTED_PLACEHOLDER};
pub use view::*;
