// Artifact storage for completed exports.
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{AuditError, Result};
use crate::export::job::{ArtifactHandle, ExportJob};

/// Destination for serialized export output.
///
/// Writers stream chunks as the worker walks store pages; `finish` makes the
/// artifact visible and `abort` discards it, so a failed job never exposes
/// partial bytes.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn begin(&self, job: &ExportJob) -> Result<Box<dyn ArtifactWriter>>;

    /// Read back a completed artifact.
    async fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait ArtifactWriter: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Flush and publish the artifact, returning its location and byte size.
    async fn finish(self: Box<Self>) -> Result<(String, u64)>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>);
}

/// Filesystem-backed sink. Artifacts are written as
/// `audit-export-<job id><ext>.part` and renamed into place on finish.
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating export directory {}", dir.display()))
            .map_err(AuditError::Internal)?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn begin(&self, job: &ExportJob) -> Result<Box<dyn ArtifactWriter>> {
        let name = format!("audit-export-{}{}", job.id, job.format.file_extension());
        let final_path = self.dir.join(&name);
        let part_path = self.dir.join(format!("{name}.part"));

        let file = File::create(&part_path)
            .await
            .map_err(|err| AuditError::SinkError(format!("creating artifact file: {err}")))?;

        Ok(Box::new(FsArtifactWriter {
            file,
            part_path,
            final_path,
            bytes: 0,
        }))
    }

    async fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        tokio::fs::read(&handle.location)
            .await
            .map_err(|err| AuditError::SinkError(format!("reading artifact: {err}")))
    }
}

struct FsArtifactWriter {
    file: File,
    part_path: PathBuf,
    final_path: PathBuf,
    bytes: u64,
}

#[async_trait]
impl ArtifactWriter for FsArtifactWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|err| AuditError::SinkError(format!("writing artifact chunk: {err}")))?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<(String, u64)> {
        self.file
            .flush()
            .await
            .map_err(|err| AuditError::SinkError(format!("flushing artifact: {err}")))?;
        self.file
            .sync_all()
            .await
            .map_err(|err| AuditError::SinkError(format!("syncing artifact: {err}")))?;
        drop(self.file);

        tokio::fs::rename(&self.part_path, &self.final_path)
            .await
            .map_err(|err| AuditError::SinkError(format!("publishing artifact: {err}")))?;

        Ok((self.final_path.display().to_string(), self.bytes))
    }

    async fn abort(self: Box<Self>) {
        drop(self.file);
        if let Err(err) = tokio::fs::remove_file(&self.part_path).await {
            warn!(path = %self.part_path.display(), error = %err, "failed to remove partial artifact");
        }
    }
}
