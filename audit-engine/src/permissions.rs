// Permission sets, the resolver seam, and field-level redaction.
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::entry::{AuditEvent, AuditLogEntry};
use crate::error::AuditError;
use crate::filter::{AuditLogFilter, ScopedFilter};

/// Placeholder substituted for redacted field values. Fixed and documented so
/// clients can distinguish redaction from genuine data.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Identity of the caller as established by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

impl UserContext {
    pub fn new(user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }
}

/// Everything a user may see within one organization: the visible
/// (resource type, action) pairs, and the payload fields that must be
/// redacted per resource type.
///
/// Redaction replaces values rather than removing fields, so the response
/// shape is identical at every permission level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionSet {
    grants: BTreeSet<(String, String)>,
    redacted_fields: BTreeMap<String, BTreeSet<String>>,
}

/// Redaction rules as frozen into export jobs: resource type to the set of
/// field names that must be replaced with the placeholder.
pub type RedactionRules = BTreeMap<String, BTreeSet<String>>;

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow events of this (resource type, action) pair.
    pub fn grant(mut self, resource_type: impl Into<String>, action: impl Into<String>) -> Self {
        self.grants.insert((resource_type.into(), action.into()));
        self
    }

    /// Mark a payload field of a resource type as redacted for this user.
    pub fn redact_field(
        mut self,
        resource_type: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.redacted_fields
            .entry(resource_type.into())
            .or_default()
            .insert(field.into());
        self
    }

    pub fn allows(&self, resource_type: &str, action: &str) -> bool {
        self.grants
            .contains(&(resource_type.to_string(), action.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn redaction_rules(&self) -> &RedactionRules {
        &self.redacted_fields
    }

    /// Intersect a caller's filter with this permission set, producing the
    /// filter that actually reaches the event store.
    ///
    /// Resource types or actions the caller requested but is not permitted to
    /// see are dropped silently; surfacing them as an error would leak the
    /// existence of restricted categories.
    pub fn scope_filter(&self, ctx: &UserContext, filter: &AuditLogFilter) -> ScopedFilter {
        let visible = self
            .grants
            .iter()
            .filter(|(resource_type, action)| {
                filter
                    .resource_types
                    .as_ref()
                    .map_or(true, |requested| requested.contains(resource_type))
                    && filter
                        .actions
                        .as_ref()
                        .map_or(true, |requested| requested.contains(action))
            })
            .cloned()
            .collect();

        ScopedFilter {
            organization_id: ctx.organization_id,
            date_from: filter.date_from_or_epoch(),
            date_to: filter.date_to_or_now(),
            actor_ids: filter.actor_ids.clone(),
            visible,
            search: filter.search.clone(),
        }
    }
}

/// Redact an event according to the given rules, preserving field names and
/// ordering exactly.
pub fn redact_event(event: &AuditEvent, rules: &RedactionRules) -> AuditLogEntry {
    let redacted = rules.get(&event.resource_type);
    let mut fields = Map::new();
    for (name, value) in &event.fields {
        let value = match redacted {
            Some(set) if set.contains(name) => Value::String(REDACTED_PLACEHOLDER.to_string()),
            _ => value.clone(),
        };
        fields.insert(name.clone(), value);
    }
    AuditLogEntry {
        id: event.id,
        timestamp: event.timestamp,
        actor_id: event.actor_id,
        organization_id: event.organization_id,
        resource_type: event.resource_type.clone(),
        action: event.action.clone(),
        fields,
    }
}

/// Resolves the caller's permission set.
///
/// Abstracted behind a trait so the engine runs against a fixed in-memory
/// resolver in tests instead of a live identity system.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn resolve(&self, ctx: &UserContext) -> Result<PermissionSet, AuditError>;
}

/// In-memory resolver for tests and development. Unknown users resolve to an
/// empty permission set and therefore see nothing.
pub struct StaticPermissionResolver {
    sets: DashMap<(Uuid, Uuid), PermissionSet>,
}

impl StaticPermissionResolver {
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
        }
    }

    pub fn insert(&self, ctx: &UserContext, set: PermissionSet) {
        self.sets.insert((ctx.user_id, ctx.organization_id), set);
    }

    pub fn remove(&self, ctx: &UserContext) {
        self.sets.remove(&(ctx.user_id, ctx.organization_id));
    }
}

impl Default for StaticPermissionResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionResolver for StaticPermissionResolver {
    async fn resolve(&self, ctx: &UserContext) -> Result<PermissionSet, AuditError> {
        Ok(self
            .sets
            .get(&(ctx.user_id, ctx.organization_id))
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }
}
