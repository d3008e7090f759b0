use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use audit_engine::{AuditError, AuditLogEntry, AuditLogFilter, AuditLogPage, AuditLogStatistics};

use crate::{error::ApiError, middleware::auth_context::AuthContext, server::AppState};

/// Query parameters for audit log search. Multi-valued fields arrive as
/// comma-separated lists.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub actor_ids: Option<String>,
    pub resource_types: Option<String>,
    pub actions: Option<String>,
    pub search: Option<String>,
    pub cursor: Option<String>,
    pub page_size: Option<usize>,
}

impl SearchParams {
    pub fn into_filter(self) -> Result<AuditLogFilter, ApiError> {
        let actor_ids = match self.actor_ids.as_deref() {
            Some(raw) => Some(parse_uuid_list(raw)?),
            None => None,
        };
        Ok(AuditLogFilter {
            date_from: self.date_from,
            date_to: self.date_to,
            actor_ids,
            resource_types: self.resource_types.as_deref().map(parse_string_list),
            actions: self.actions.as_deref().map(parse_string_list),
            search: self.search,
            cursor: self.cursor,
            page_size: self.page_size,
        })
    }
}

fn parse_string_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_uuid_list(raw: &str) -> Result<BTreeSet<Uuid>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part).map_err(|_| {
                ApiError::Engine(AuditError::InvalidFilter(format!(
                    "malformed actor id: {part}"
                )))
            })
        })
        .collect()
}

/// GET /api/audit/logs
pub async fn search_logs(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<SearchParams>,
) -> Result<Json<AuditLogPage>, ApiError> {
    let filter = params.into_filter()?;
    let page = state.views.search(&auth.user_context(), &filter).await?;
    Ok(Json(page))
}

/// GET /api/audit/logs/:id
pub async fn get_log_detail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<AuditLogEntry>, ApiError> {
    match state.views.fetch_entry(&auth.user_context(), id).await? {
        Some(entry) => Ok(Json(entry)),
        None => Err(ApiError::Engine(AuditError::NotFound)),
    }
}

/// Query parameters for statistics.
#[derive(Debug, Default, Deserialize)]
pub struct StatisticsParams {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// GET /api/audit/statistics
pub async fn get_statistics(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<AuditLogStatistics>, ApiError> {
    let stats = state
        .views
        .statistics(&auth.user_context(), params.date_from, params.date_to)
        .await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_lists_are_parsed_and_trimmed() {
        let params = SearchParams {
            resource_types: Some("login, payment ,".into()),
            ..Default::default()
        };
        let filter = params.into_filter().unwrap();
        let types = filter.resource_types.unwrap();
        assert_eq!(types.len(), 2);
        assert!(types.contains("login"));
        assert!(types.contains("payment"));
    }

    #[test]
    fn malformed_actor_ids_are_invalid_filters() {
        let params = SearchParams {
            actor_ids: Some("not-a-uuid".into()),
            ..Default::default()
        };
        assert!(params.into_filter().is_err());
    }
}
