use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid pagination cursor")]
    InvalidCursor,

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("resource not found")]
    NotFound,

    #[error("export is not ready for download")]
    NotReady,

    #[error("export artifact is no longer available")]
    ArtifactExpired,

    #[error("export exceeds the configured record cap")]
    ExportTooLarge,

    #[error("permission resolver unavailable: {0}")]
    PermissionResolverUnavailable(String),

    #[error("audit event store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("artifact sink error: {0}")]
    SinkError(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
