// Caller-facing filter model and the permission-scoped filter that reaches
// the event store.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::entry::AuditEvent;
use crate::error::AuditError;

pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 500;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_SEARCH_LEN: usize = 256;

/// A caller's query over the audit event stream.
///
/// An empty filter matches every event the caller is authorized to see.
/// Multi-valued fields narrow by OR within the field and AND across fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub actor_ids: Option<BTreeSet<Uuid>>,
    pub resource_types: Option<BTreeSet<String>>,
    pub actions: Option<BTreeSet<String>>,
    pub search: Option<String>,
    pub cursor: Option<String>,
    pub page_size: Option<usize>,
}

impl AuditLogFilter {
    /// Validate range and size constraints. The view and export paths apply
    /// identical validation.
    pub fn validate(&self) -> Result<(), AuditError> {
        if let Some(size) = self.page_size {
            if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&size) {
                return Err(AuditError::InvalidFilter(format!(
                    "page size {size} is outside {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE}"
                )));
            }
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AuditError::InvalidFilter(
                    "date range start is after end".into(),
                ));
            }
        }
        if let Some(search) = &self.search {
            if search.len() > MAX_SEARCH_LEN {
                return Err(AuditError::InvalidFilter(format!(
                    "search term longer than {MAX_SEARCH_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Absent range bounds default to the epoch and "now".
    pub fn date_from_or_epoch(&self) -> DateTime<Utc> {
        self.date_from.unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn date_to_or_now(&self) -> DateTime<Utc> {
        self.date_to.unwrap_or_else(Utc::now)
    }

    pub fn has_search(&self) -> bool {
        self.search.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_date_range(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }
}

/// The caller's filter narrowed to what their permission set allows and
/// pinned to their organization. This is the only filter shape that reaches
/// the event store, and the shape frozen into export jobs at submit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedFilter {
    pub organization_id: Uuid,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub actor_ids: Option<BTreeSet<Uuid>>,
    /// The (resource type, action) pairs the query may return: the caller's
    /// grants intersected with what the filter requested. Empty means the
    /// query matches nothing and the store should not be consulted.
    pub visible: BTreeSet<(String, String)>,
    pub search: Option<String>,
}

impl ScopedFilter {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Whether an event falls inside this filter. Shared by the in-memory
    /// store and by tests asserting query soundness.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if event.organization_id != self.organization_id {
            return false;
        }
        if event.timestamp < self.date_from || event.timestamp > self.date_to {
            return false;
        }
        if let Some(actors) = &self.actor_ids {
            if !actors.contains(&event.actor_id) {
                return false;
            }
        }
        if !self
            .visible
            .contains(&(event.resource_type.clone(), event.action.clone()))
        {
            return false;
        }
        if let Some(term) = self.search.as_deref() {
            let term = term.trim();
            if !term.is_empty() && !event_matches_search(event, term) {
                return false;
            }
        }
        true
    }
}

fn event_matches_search(event: &AuditEvent, term: &str) -> bool {
    let needle = term.to_lowercase();
    if event.resource_type.to_lowercase().contains(&needle)
        || event.action.to_lowercase().contains(&needle)
    {
        return true;
    }
    event
        .fields
        .values()
        .any(|value| value_contains(value, &needle))
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Object(map) => map.values().any(|v| value_contains(v, needle)),
        _ => false,
    }
}
