// Export job records and their lifecycle.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::ScopedFilter;
use crate::permissions::{RedactionRules, UserContext};

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Csv => ".csv",
            Self::Json => ".json",
        }
    }
}

/// Lifecycle state of an export job.
///
/// `Pending → Running → (Completed | Failed)`; there is no transition out of
/// a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The requesting user. Ownership checks compare this record, not live
/// permissions: the job's scope was already narrowed at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOwner {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

impl From<&UserContext> for JobOwner {
    fn from(ctx: &UserContext) -> Self {
        Self {
            user_id: ctx.user_id,
            organization_id: ctx.organization_id,
        }
    }
}

/// Reference to a completed export artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Sink-specific location of the artifact (a path for the fs sink).
    pub location: String,
    pub size_bytes: u64,
    pub download_token: String,
    pub expires_at: DateTime<Utc>,
}

/// A durable record of one export request.
///
/// Created by `submit`, mutated only by the worker that claimed it. Terminal
/// states are immutable; only the download counter moves afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: Uuid,
    pub owner: JobOwner,
    /// Permission-intersected filter, frozen at submit time so later
    /// permission changes cannot widen or narrow the job's scope.
    pub filter: ScopedFilter,
    /// Redaction rules frozen alongside the filter.
    pub redaction_rules: RedactionRules,
    pub format: ExportFormat,
    pub status: ExportStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_records: Option<u64>,
    pub processed_records: u64,
    pub artifact: Option<ArtifactHandle>,
    pub error: Option<String>,
    pub download_count: u32,
}

impl ExportJob {
    pub fn new(
        owner: JobOwner,
        filter: ScopedFilter,
        redaction_rules: RedactionRules,
        format: ExportFormat,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            filter,
            redaction_rules,
            format,
            status: ExportStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_records: None,
            processed_records: 0,
            artifact: None,
            error: None,
            download_count: 0,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = ExportStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, artifact: ArtifactHandle) {
        self.status = ExportStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.artifact = Some(artifact);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ExportStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.artifact = None;
        self.error = Some(error.into());
    }

    pub fn progress_percentage(&self) -> f64 {
        match self.total_records {
            Some(total) if total > 0 => (self.processed_records as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }

    /// Whether the artifact may still be served, given the configured
    /// download cap. Expiry is a predicate over a completed job, not a
    /// separate state: terminal states never change.
    pub fn can_download(&self, max_downloads: u32) -> bool {
        if self.status != ExportStatus::Completed || self.download_count >= max_downloads {
            return false;
        }
        self.artifact
            .as_ref()
            .map_or(false, |artifact| Utc::now() <= artifact.expires_at)
    }

    /// Whether this record may be garbage-collected by the host system.
    /// The engine only reports eligibility; it never deletes.
    pub fn is_gc_eligible(&self, cutoff: DateTime<Utc>) -> bool {
        self.status.is_terminal() && self.completed_at.unwrap_or(self.created_at) < cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

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
        ExportJob::new(owner, filter, RedactionRules::new(), ExportFormat::Csv)
    }

    #[test]
    fn new_jobs_are_pending() {
        let job = job();
        assert_eq!(job.status, ExportStatus::Pending);
        assert!(job.started_at.is_none());
        assert!(job.artifact.is_none());
    }

    #[test]
    fn failure_discards_artifact() {
        let mut job = job();
        job.mark_started();
        job.mark_failed("store went away");

        assert_eq!(job.status, ExportStatus::Failed);
        assert!(job.artifact.is_none());
        assert_eq!(job.error.as_deref(), Some("store went away"));
        assert!(!job.can_download(5));
    }

    #[test]
    fn download_gate_honors_expiry_and_count() {
        let mut job = job();
        job.mark_started();
        job.mark_completed(ArtifactHandle {
            location: "/tmp/export.csv".into(),
            size_bytes: 10,
            download_token: "t".into(),
            expires_at: Utc::now() + chrono::Duration::days(7),
        });

        assert!(job.can_download(2));
        job.download_count = 2;
        assert!(!job.can_download(2));

        job.download_count = 0;
        if let Some(artifact) = job.artifact.as_mut() {
            artifact.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
        assert!(!job.can_download(2));
    }

    #[test]
    fn gc_eligibility_requires_terminal_state() {
        let mut job = job();
        let future = Utc::now() + chrono::Duration::days(1);
        assert!(!job.is_gc_eligible(future));

        job.mark_started();
        job.mark_failed("boom");
        assert!(job.is_gc_eligible(future));
        assert!(!job.is_gc_eligible(Utc::now() - chrono::Duration::days(1)));
    }
}
