// Durable storage for export job records.
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AuditError, Result};
use crate::export::job::{ExportJob, ExportStatus, JobOwner};

/// Storage interface for export job records.
///
/// Records are kept in an arena keyed by job id, so a worker claim is a
/// single guarded status update rather than a structural mutation.
#[async_trait]
pub trait ExportJobRepository: Send + Sync {
    /// Persist a new job. The record must be durable before this returns.
    async fn create(&self, job: &ExportJob) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<ExportJob>>;

    /// Atomically move a `Pending` job to `Running` and return the claimed
    /// snapshot. Returns `None` if the job is missing or already claimed, so
    /// at most one worker ever transitions a given job out of `Pending`.
    async fn try_claim(&self, id: Uuid) -> Result<Option<ExportJob>>;

    /// Persist an updated job. Status changes away from an already-terminal
    /// stored record are rejected.
    async fn update(&self, job: &ExportJob) -> Result<()>;

    async fn list_for_owner(&self, owner: &JobOwner) -> Result<Vec<ExportJob>>;

    /// Jobs that are not in a terminal state, for startup recovery.
    async fn list_incomplete(&self) -> Result<Vec<ExportJob>>;

    /// Terminal jobs older than the cutoff, eligible for external garbage
    /// collection.
    async fn list_gc_eligible(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

/// In-memory repository for tests and development.
pub struct InMemoryExportJobRepository {
    jobs: DashMap<Uuid, ExportJob>,
}

impl InMemoryExportJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }
}

impl Default for InMemoryExportJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn claim_in_place(entry: &mut ExportJob) -> Option<ExportJob> {
    if entry.status != ExportStatus::Pending {
        return None;
    }
    entry.mark_started();
    Some(entry.clone())
}

fn guard_terminal(existing: &ExportJob, update: &ExportJob) -> Result<()> {
    if existing.status.is_terminal() && update.status != existing.status {
        return Err(AuditError::Internal(anyhow!(
            "export job {} is terminal and cannot change state",
            existing.id
        )));
    }
    Ok(())
}

fn sorted_for_owner<'a, I>(jobs: I, owner: &JobOwner) -> Vec<ExportJob>
where
    I: Iterator<Item = ExportJob>,
{
    let mut owned: Vec<ExportJob> = jobs.filter(|job| job.owner == *owner).collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    owned
}

#[async_trait]
impl ExportJobRepository for InMemoryExportJobRepository {
    async fn create(&self, job: &ExportJob) -> Result<()> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExportJob>> {
        Ok(self.jobs.get(&id).map(|entry| entry.clone()))
    }

    async fn try_claim(&self, id: Uuid) -> Result<Option<ExportJob>> {
        Ok(self
            .jobs
            .get_mut(&id)
            .and_then(|mut entry| claim_in_place(&mut entry)))
    }

    async fn update(&self, job: &ExportJob) -> Result<()> {
        match self.jobs.get_mut(&job.id) {
            Some(mut entry) => {
                guard_terminal(&entry, job)?;
                *entry = job.clone();
                Ok(())
            }
            None => Err(AuditError::NotFound),
        }
    }

    async fn list_for_owner(&self, owner: &JobOwner) -> Result<Vec<ExportJob>> {
        Ok(sorted_for_owner(
            self.jobs.iter().map(|entry| entry.clone()),
            owner,
        ))
    }

    async fn list_incomplete(&self) -> Result<Vec<ExportJob>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .map(|entry| entry.clone())
            .collect())
    }

    async fn list_gc_eligible(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| entry.is_gc_eligible(cutoff))
            .map(|entry| entry.id)
            .collect())
    }
}

/// File-backed repository: one JSON document per job under a directory,
/// fronted by an in-memory index for claims and listings.
///
/// Writes go to a temp file first and are renamed into place, so a record is
/// never observed half-written and jobs survive a process restart.
pub struct FsExportJobRepository {
    dir: PathBuf,
    jobs: DashMap<Uuid, ExportJob>,
}

impl FsExportJobRepository {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating export job directory {}", dir.display()))
            .map_err(AuditError::Internal)?;

        let jobs = DashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .context("reading export job directory")
            .map_err(AuditError::Internal)?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("reading export job directory")
            .map_err(AuditError::Internal)?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&path).await {
                Ok(job) => {
                    jobs.insert(job.id, job);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable export job record");
                }
            }
        }

        Ok(Self { dir, jobs })
    }

    async fn load(path: &std::path::Path) -> Result<ExportJob> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))
            .map_err(AuditError::Internal)?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", path.display()))
            .map_err(AuditError::Internal)
    }

    async fn persist(&self, job: &ExportJob) -> Result<()> {
        let path = self.dir.join(format!("{}.json", job.id));
        let tmp = self.dir.join(format!("{}.json.tmp", job.id));
        let bytes = serde_json::to_vec_pretty(job)
            .context("serializing export job")
            .map_err(AuditError::Internal)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))
            .map_err(AuditError::Internal)?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming {}", tmp.display()))
            .map_err(AuditError::Internal)?;
        Ok(())
    }
}

#[async_trait]
impl ExportJobRepository for FsExportJobRepository {
    async fn create(&self, job: &ExportJob) -> Result<()> {
        self.jobs.insert(job.id, job.clone());
        self.persist(job).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExportJob>> {
        Ok(self.jobs.get(&id).map(|entry| entry.clone()))
    }

    async fn try_claim(&self, id: Uuid) -> Result<Option<ExportJob>> {
        // Claim in the index first (the guard makes it atomic), then write
        // through before the caller does any store I/O.
        let claimed = self
            .jobs
            .get_mut(&id)
            .and_then(|mut entry| claim_in_place(&mut entry));
        if let Some(job) = &claimed {
            self.persist(job).await?;
        }
        Ok(claimed)
    }

    async fn update(&self, job: &ExportJob) -> Result<()> {
        match self.jobs.get_mut(&job.id) {
            Some(mut entry) => {
                guard_terminal(&entry, job)?;
                *entry = job.clone();
            }
            None => return Err(AuditError::NotFound),
        }
        self.persist(job).await
    }

    async fn list_for_owner(&self, owner: &JobOwner) -> Result<Vec<ExportJob>> {
        Ok(sorted_for_owner(
            self.jobs.iter().map(|entry| entry.clone()),
            owner,
        ))
    }

    async fn list_incomplete(&self) -> Result<Vec<ExportJob>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .map(|entry| entry.clone())
            .collect())
    }

    async fn list_gc_eligible(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| entry.is_gc_eligible(cutoff))
            .map(|entry| entry.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ScopedFilter;
    use crate::permissions::RedactionRules;
    use crate::export::job::ExportFormat;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn job() -> ExportJob {
        let owner = JobOwner {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
        };
        let filter = ScopedFilter {
            organization_id: owner.organization_id,
            date_from: DateTime::UNIX_EPOCH,
            date_to: Utc::now(),
            actor_ids: None,
            visible: BTreeSet::from([("login".to_string(), "create".to_string())]),
            search: None,
        };
        ExportJob::new(owner, filter, RedactionRules::new(), ExportFormat::Json)
    }

    #[tokio::test]
    async fn claim_is_exclusive_under_contention() {
        let repo = Arc::new(InMemoryExportJobRepository::new());
        let job = job();
        repo.create(&job).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let id = job.id;
            handles.push(tokio::spawn(async move { repo.try_claim(id).await }));
        }

        let mut claims = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                claims += 1;
            }
        }
        assert_eq!(claims, 1);
    }

    #[tokio::test]
    async fn terminal_records_reject_state_changes() {
        let repo = InMemoryExportJobRepository::new();
        let mut job = job();
        repo.create(&job).await.unwrap();

        job.mark_started();
        repo.update(&job).await.unwrap();
        job.mark_failed("boom");
        repo.update(&job).await.unwrap();

        let mut resurrect = job.clone();
        resurrect.status = ExportStatus::Running;
        assert!(repo.update(&resurrect).await.is_err());

        // Non-state fields of a terminal record may still move.
        job.download_count += 1;
        assert!(repo.update(&job).await.is_ok());
    }

    #[tokio::test]
    async fn fs_repository_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let job = job();
        {
            let repo = FsExportJobRepository::open(dir.path()).await.unwrap();
            repo.create(&job).await.unwrap();
        }

        let reopened = FsExportJobRepository::open(dir.path()).await.unwrap();
        let loaded = reopened.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, ExportStatus::Pending);
        assert_eq!(loaded.owner, job.owner);
    }

    #[tokio::test]
    async fn incomplete_listing_skips_terminal_jobs() {
        let repo = InMemoryExportJobRepository::new();
        let pending = job();
        repo.create(&pending).await.unwrap();

        let mut failed = job();
        repo.create(&failed).await.unwrap();
        failed.mark_started();
        failed.mark_failed("boom");
        repo.update(&failed).await.unwrap();

        let incomplete = repo.list_incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id, pending.id);
    }
}
