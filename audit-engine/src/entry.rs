// Audit event types shared by the view and export paths
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Sensitivity classification assigned to a payload field by the event
/// producer. Recorded alongside the event; the engine never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSensitivity {
    Public,
    Sensitive,
}

/// An immutable record of an action taken by an actor on a resource.
///
/// Owned by the external event store; read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Uuid,
    pub organization_id: Uuid,
    pub resource_type: String,
    pub action: String,
    /// Event payload. `serde_json::Map` keeps a deterministic key order, so
    /// redacted and unredacted renderings of the same event always agree on
    /// field names and ordering.
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub sensitivity: HashMap<String, FieldSensitivity>,
}

impl AuditEvent {
    /// Build a new event stamped with a fresh id and the current time.
    /// Used by dev seeding and tests; production events come from the store.
    pub fn record(
        actor_id: Uuid,
        organization_id: Uuid,
        resource_type: impl Into<String>,
        action: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id,
            organization_id,
            resource_type: resource_type.into(),
            action: action.into(),
            fields,
            sensitivity: HashMap::new(),
        }
    }

    pub fn with_sensitivity(mut self, field: impl Into<String>, level: FieldSensitivity) -> Self {
        self.sensitivity.insert(field.into(), level);
        self
    }
}

/// A single audit event as returned to callers, after redaction.
///
/// The field set and ordering are identical to the unredacted event whatever
/// the caller's permission level; redacted values are replaced in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Uuid,
    pub organization_id: Uuid,
    pub resource_type: String,
    pub action: String,
    pub fields: Map<String, Value>,
}
