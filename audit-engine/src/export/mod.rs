//! Asynchronous export pipeline: durable job records, a bounded worker pool,
//! streaming serialization, and artifact storage.

pub mod job;
pub mod manager;
pub mod repository;
pub mod sink;
pub mod writer;

pub use job::{ArtifactHandle, ExportFormat, ExportJob, ExportStatus, JobOwner};
pub use manager::{ExportDownload, ExportJobManager, RecoveryReport};
pub use repository::{ExportJobRepository, FsExportJobRepository, InMemoryExportJobRepository};
pub use sink::{ArtifactSink, ArtifactWriter, FsArtifactSink};
