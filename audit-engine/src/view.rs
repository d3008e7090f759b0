// The synchronous read path: permission-scoped, redacted, paginated queries.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::cursor;
use crate::entry::AuditLogEntry;
use crate::error::{AuditError, Result};
use crate::filter::AuditLogFilter;
use crate::permissions::{redact_event, PermissionResolver, UserContext};
use crate::rate_limit::{QuotaCategory, RateLimiter};
use crate::store::AuditEventStore;

/// One page of redacted results plus the token for the next page.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogPage {
    pub entries: Vec<AuditLogEntry>,
    pub next_cursor: Option<String>,
}

impl AuditLogPage {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Aggregate counts over the caller's effective scope.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogStatistics {
    pub total_entries: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Audit log read service.
///
/// Every call resolves the caller's permission set, narrows the requested
/// filter to it, and redacts results before returning them. Calls hold no
/// locks across awaits and are safe to issue concurrently; the only shared
/// state is rate-limit bookkeeping.
pub struct AuditViewService {
    store: Arc<dyn AuditEventStore>,
    resolver: Arc<dyn PermissionResolver>,
    limiter: Arc<RateLimiter>,
    config: EngineConfig,
}

impl AuditViewService {
    pub fn new(
        store: Arc<dyn AuditEventStore>,
        resolver: Arc<dyn PermissionResolver>,
        limiter: Arc<RateLimiter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            limiter,
            config,
        }
    }

    /// Search audit logs under the caller's effective filter.
    pub async fn search(&self, ctx: &UserContext, filter: &AuditLogFilter) -> Result<AuditLogPage> {
        filter.validate()?;
        let after = filter.cursor.as_deref().map(cursor::decode).transpose()?;

        if !self.limiter.try_acquire(ctx.user_id, QuotaCategory::ViewQuery) {
            return Err(AuditError::RateLimited(
                "view query budget exhausted".into(),
            ));
        }

        let permissions = self.resolver.resolve(ctx).await?;
        let scoped = permissions.scope_filter(ctx, filter);
        if scoped.is_empty() {
            debug!(user_id = %ctx.user_id, "effective filter is empty, skipping store query");
            return Ok(AuditLogPage::empty());
        }

        let page = timeout(
            self.config.limits.store_timeout,
            self.store.query(&scoped, after, filter.page_size()),
        )
        .await
        .map_err(|_| AuditError::StoreUnavailable("query timed out".into()))??;

        let rules = permissions.redaction_rules();
        let entries: Vec<AuditLogEntry> = page
            .events
            .iter()
            .map(|event| redact_event(event, rules))
            .collect();

        debug!(
            user_id = %ctx.user_id,
            entries = entries.len(),
            has_more = page.next.is_some(),
            "audit log search"
        );

        Ok(AuditLogPage {
            entries,
            next_cursor: page.next.map(|pos| cursor::encode(&pos)),
        })
    }

    /// Fetch a single entry. An event outside the caller's permission set is
    /// indistinguishable from a missing one.
    pub async fn fetch_entry(
        &self,
        ctx: &UserContext,
        event_id: Uuid,
    ) -> Result<Option<AuditLogEntry>> {
        if !self.limiter.try_acquire(ctx.user_id, QuotaCategory::ViewQuery) {
            return Err(AuditError::RateLimited(
                "view query budget exhausted".into(),
            ));
        }

        let permissions = self.resolver.resolve(ctx).await?;
        let event = timeout(
            self.config.limits.store_timeout,
            self.store.fetch(ctx.organization_id, event_id),
        )
        .await
        .map_err(|_| AuditError::StoreUnavailable("fetch timed out".into()))??;

        match event {
            Some(event) if permissions.allows(&event.resource_type, &event.action) => {
                Ok(Some(redact_event(&event, permissions.redaction_rules())))
            }
            Some(event) => {
                warn!(
                    user_id = %ctx.user_id,
                    event_id = %event.id,
                    "denied access to audit entry outside permission set"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Totals and most recent activity for the caller's effective scope.
    pub async fn statistics(
        &self,
        ctx: &UserContext,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<AuditLogStatistics> {
        let filter = AuditLogFilter {
            date_from,
            date_to,
            ..Default::default()
        };
        filter.validate()?;

        if !self.limiter.try_acquire(ctx.user_id, QuotaCategory::ViewQuery) {
            return Err(AuditError::RateLimited(
                "view query budget exhausted".into(),
            ));
        }

        let permissions = self.resolver.resolve(ctx).await?;
        let scoped = permissions.scope_filter(ctx, &filter);
        let period_start = scoped.date_from;
        let period_end = scoped.date_to;

        if scoped.is_empty() {
            return Ok(AuditLogStatistics {
                total_entries: 0,
                last_activity: None,
                period_start,
                period_end,
            });
        }

        let total_entries = timeout(
            self.config.limits.store_timeout,
            self.store.count(&scoped),
        )
        .await
        .map_err(|_| AuditError::StoreUnavailable("count timed out".into()))??;

        let latest = timeout(
            self.config.limits.store_timeout,
            self.store.query(&scoped, None, 1),
        )
        .await
        .map_err(|_| AuditError::StoreUnavailable("query timed out".into()))??;

        Ok(AuditLogStatistics {
            total_entries,
            last_activity: latest.events.first().map(|event| event.timestamp),
            period_start,
            period_end,
        })
    }
}
