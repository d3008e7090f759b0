// Export job orchestration: submission, status, downloads, and the worker
// pool that executes jobs.
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{AuditError, Result};
use crate::export::job::{ArtifactHandle, ExportFormat, ExportJob, ExportStatus, JobOwner};
use crate::export::repository::ExportJobRepository;
use crate::export::sink::{ArtifactSink, ArtifactWriter};
use crate::export::writer::ExportSerializer;
use crate::filter::AuditLogFilter;
use crate::permissions::{redact_event, PermissionResolver, UserContext};
use crate::rate_limit::{QuotaCategory, RateLimiter};
use crate::store::AuditEventStore;

const DOWNLOAD_TOKEN_LEN: usize = 32;

/// A served artifact: the bytes plus what a transport needs to describe them.
#[derive(Debug, Clone)]
pub struct ExportDownload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: &'static str,
    pub size_bytes: u64,
}

/// Outcome of startup recovery.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
}

/// Owns the export job lifecycle.
///
/// `submit` freezes the caller's effective scope into a durable `PENDING`
/// record and enqueues it without waiting for a worker. A bounded pool of
/// workers claims jobs one at a time (repository-level compare-and-set),
/// streams matching events page by page through the frozen redaction rules,
/// and lands the serialized output in the artifact sink. Requesters only
/// ever poll; nothing here pushes notifications.
pub struct ExportJobManager {
    repo: Arc<dyn ExportJobRepository>,
    store: Arc<dyn AuditEventStore>,
    resolver: Arc<dyn PermissionResolver>,
    sink: Arc<dyn ArtifactSink>,
    limiter: Arc<RateLimiter>,
    config: EngineConfig,
    queue: mpsc::UnboundedSender<Uuid>,
}

impl ExportJobManager {
    /// Build the manager and spawn its worker pool. With zero configured
    /// workers, submitted jobs stay `PENDING` until another process claims
    /// them; useful for tests asserting pre-execution state.
    pub fn start(
        repo: Arc<dyn ExportJobRepository>,
        store: Arc<dyn AuditEventStore>,
        resolver: Arc<dyn PermissionResolver>,
        sink: Arc<dyn ArtifactSink>,
        limiter: Arc<RateLimiter>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (queue, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            repo,
            store,
            resolver,
            sink,
            limiter,
            config,
            queue,
        });

        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..manager.config.export.workers {
            let manager = manager.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                manager.worker_loop(rx, worker).await;
            });
        }

        manager
    }

    /// Submit an export request. Validation matches the view path; the job is
    /// durable and `PENDING` when this returns.
    pub async fn submit(
        &self,
        ctx: &UserContext,
        filter: &AuditLogFilter,
        format: ExportFormat,
    ) -> Result<Uuid> {
        filter.validate()?;

        if !self
            .limiter
            .try_acquire(ctx.user_id, QuotaCategory::ExportSubmit)
        {
            return Err(AuditError::RateLimited(
                "export submission budget exhausted".into(),
            ));
        }
        if !self.limiter.try_acquire_export_slot(ctx.user_id) {
            return Err(AuditError::RateLimited(
                "too many exports already in flight".into(),
            ));
        }

        match self.submit_inner(ctx, filter, format).await {
            Ok(job_id) => Ok(job_id),
            Err(err) => {
                self.limiter.release_export_slot(ctx.user_id);
                Err(err)
            }
        }
    }

    async fn submit_inner(
        &self,
        ctx: &UserContext,
        filter: &AuditLogFilter,
        format: ExportFormat,
    ) -> Result<Uuid> {
        let permissions = self.resolver.resolve(ctx).await?;
        let scoped = permissions.scope_filter(ctx, filter);
        let job = ExportJob::new(
            JobOwner::from(ctx),
            scoped,
            permissions.redaction_rules().clone(),
            format,
        );
        let job_id = job.id;

        self.repo.create(&job).await?;
        if self.queue.send(job_id).is_err() {
            // Workers are gone; the durable record will be picked up by the
            // next process's recovery pass.
            warn!(job_id = %job_id, "export queue closed; job stays pending");
        }

        info!(job_id = %job_id, user_id = %ctx.user_id, ?format, "accepted export job");
        Ok(job_id)
    }

    /// Snapshot of a job's state. Missing jobs and jobs owned by someone else
    /// are both `NotFound`, so callers cannot probe for existence.
    pub async fn get_status(&self, ctx: &UserContext, job_id: Uuid) -> Result<ExportJob> {
        let owner = JobOwner::from(ctx);
        match self.repo.get(job_id).await? {
            Some(job) if job.owner == owner => Ok(job),
            _ => Err(AuditError::NotFound),
        }
    }

    /// The caller's export history, newest first.
    pub async fn list_jobs(&self, ctx: &UserContext) -> Result<Vec<ExportJob>> {
        self.repo.list_for_owner(&JobOwner::from(ctx)).await
    }

    /// Serve a completed artifact. Counts the download and enforces the
    /// expiry window and download cap.
    pub async fn fetch_artifact(&self, ctx: &UserContext, job_id: Uuid) -> Result<ExportDownload> {
        let mut job = self.get_status(ctx, job_id).await?;
        if job.status != ExportStatus::Completed {
            return Err(AuditError::NotReady);
        }
        if !job.can_download(self.config.export.max_downloads) {
            return Err(AuditError::ArtifactExpired);
        }
        let artifact = match job.artifact.clone() {
            Some(artifact) => artifact,
            None => {
                return Err(AuditError::Internal(anyhow::anyhow!(
                    "completed job {job_id} has no artifact"
                )))
            }
        };

        let bytes = timeout(self.config.limits.sink_timeout, self.sink.read(&artifact))
            .await
            .map_err(|_| AuditError::SinkError("artifact read timed out".into()))??;

        job.download_count += 1;
        self.repo.update(&job).await?;

        Ok(ExportDownload {
            bytes,
            filename: format!(
                "audit-logs-{}{}",
                job.created_at.format("%Y-%m-%d"),
                job.format.file_extension()
            ),
            mime_type: job.format.mime_type(),
            size_bytes: artifact.size_bytes,
        })
    }

    /// Terminal jobs past the retention window. Deleting them (and their
    /// artifacts) is the host system's concern.
    pub async fn gc_eligible(&self) -> Result<Vec<Uuid>> {
        self.repo
            .list_gc_eligible(Utc::now() - self.config.export.retention)
            .await
    }

    /// Startup recovery: re-enqueue jobs that never started and fail jobs
    /// interrupted mid-run. Call once before serving traffic.
    ///
    /// A job found `RUNNING` here was claimed by a process that no longer
    /// exists; execution is not idempotent against the sink, so the job is
    /// failed rather than resumed and the owner must resubmit.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for mut job in self.repo.list_incomplete().await? {
            match job.status {
                ExportStatus::Pending => {
                    self.limiter.note_active_export(job.owner.user_id);
                    if self.queue.send(job.id).is_ok() {
                        report.requeued += 1;
                    }
                }
                ExportStatus::Running => {
                    job.mark_failed("interrupted by process restart; resubmit the export");
                    self.repo.update(&job).await?;
                    report.failed += 1;
                }
                ExportStatus::Completed | ExportStatus::Failed => {}
            }
        }
        info!(
            requeued = report.requeued,
            failed = report.failed,
            "export job recovery finished"
        );
        Ok(report)
    }

    async fn worker_loop(&self, rx: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>, worker: usize) {
        loop {
            let job_id = {
                let mut rx = rx.lock().await;
                rx.recv().await
            };
            let Some(job_id) = job_id else {
                break;
            };

            let claimed = match self.repo.try_claim(job_id).await {
                Ok(claimed) => claimed,
                Err(err) => {
                    error!(worker, job_id = %job_id, error = %err, "failed to claim export job");
                    continue;
                }
            };
            let Some(job) = claimed else {
                debug!(worker, job_id = %job_id, "export job already claimed or gone");
                continue;
            };

            debug!(worker, job_id = %job_id, "claimed export job");
            let owner = job.owner.user_id;
            self.execute(job).await;
            self.limiter.release_export_slot(owner);
        }
    }

    /// Run one claimed job to a terminal state.
    async fn execute(&self, mut job: ExportJob) {
        let job_id = job.id;
        match self.run_export(&mut job).await {
            Ok(artifact) => {
                job.mark_completed(artifact);
                if let Err(err) = self.repo.update(&job).await {
                    error!(job_id = %job_id, error = %err, "failed to persist completed export");
                }
                info!(
                    job_id = %job_id,
                    records = job.processed_records,
                    "export completed"
                );
            }
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "export failed");
                job.mark_failed(err.to_string());
                if let Err(err) = self.repo.update(&job).await {
                    error!(job_id = %job_id, error = %err, "failed to persist failed export");
                }
            }
        }
    }

    async fn run_export(&self, job: &mut ExportJob) -> Result<ArtifactHandle> {
        // An empty effective filter matches nothing; the store is not
        // consulted and the artifact contains only framing.
        let total = if job.filter.is_empty() {
            0
        } else {
            timeout(
                self.config.limits.store_timeout,
                self.store.count(&job.filter),
            )
            .await
            .map_err(|_| AuditError::StoreUnavailable("count timed out".into()))??
        };

        if total > self.config.export.max_records {
            return Err(AuditError::ExportTooLarge);
        }
        job.total_records = Some(total);
        self.repo.update(job).await?;

        let writer = timeout(self.config.limits.sink_timeout, self.sink.begin(job))
            .await
            .map_err(|_| AuditError::SinkError("opening artifact timed out".into()))??;

        let mut writer = writer;
        match self.stream_events(&mut writer, job).await {
            Ok(()) => {
                let (location, size_bytes) = timeout(self.config.limits.sink_timeout, writer.finish())
                    .await
                    .map_err(|_| AuditError::SinkError("finishing artifact timed out".into()))??;
                Ok(ArtifactHandle {
                    location,
                    size_bytes,
                    download_token: download_token(),
                    expires_at: Utc::now() + self.config.export.download_ttl,
                })
            }
            Err(err) => {
                // Never leave partial output behind a failed job.
                writer.abort().await;
                Err(err)
            }
        }
    }

    async fn stream_events(
        &self,
        writer: &mut Box<dyn ArtifactWriter>,
        job: &mut ExportJob,
    ) -> Result<()> {
        let mut serializer = ExportSerializer::new(job.format);
        self.sink_write(writer, serializer.header(job)).await?;

        if job.filter.is_empty() {
            return self.sink_write(writer, serializer.footer()).await;
        }

        let mut after = None;
        loop {
            let page = timeout(
                self.config.limits.store_timeout,
                self.store
                    .query(&job.filter, after, self.config.export.batch_size),
            )
            .await
            .map_err(|_| AuditError::StoreUnavailable("page read timed out".into()))??;

            for event in &page.events {
                let entry = redact_event(event, &job.redaction_rules);
                let chunk = serializer.record(&entry)?;
                self.sink_write(writer, chunk).await?;
                job.processed_records += 1;
            }
            // Checkpoint progress once per page so pollers see movement.
            self.repo.update(job).await?;

            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        self.sink_write(writer, serializer.footer()).await
    }

    async fn sink_write(&self, writer: &mut Box<dyn ArtifactWriter>, chunk: Vec<u8>) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        timeout(self.config.limits.sink_timeout, writer.write_chunk(&chunk))
            .await
            .map_err(|_| AuditError::SinkError("artifact write timed out".into()))?
    }
}

// 32 alphanumeric characters, as the platform's download links always used.
fn download_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOWNLOAD_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_tokens_are_distinct_and_sized() {
        let a = download_token();
        let b = download_token();
        assert_eq!(a.len(), DOWNLOAD_TOKEN_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
