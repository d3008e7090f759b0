// Streaming serializers for export artifacts.
//
// Both formats emit exactly the same field set and redaction placeholders
// for a given event; only the framing differs.
use anyhow::Context;
use chrono::{SecondsFormat, Utc};

use crate::entry::AuditLogEntry;
use crate::error::{AuditError, Result};
use crate::export::job::{ExportFormat, ExportJob};

const CSV_HEADER: &str =
    "id,timestamp,actor_id,organization_id,resource_type,action,fields\n";

/// Incremental serializer, fed one redacted entry at a time so exports never
/// materialize the full result set.
pub enum ExportSerializer {
    Csv,
    Json { first: bool },
}

impl ExportSerializer {
    pub fn new(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Csv => Self::Csv,
            ExportFormat::Json => Self::Json { first: true },
        }
    }

    /// Bytes emitted before the first record.
    pub fn header(&self, job: &ExportJob) -> Vec<u8> {
        match self {
            Self::Csv => CSV_HEADER.as_bytes().to_vec(),
            Self::Json { .. } => format!(
                "{{\"export\":{{\"id\":\"{}\",\"generated_at\":\"{}\",\"format\":\"json\"}},\"events\":[",
                job.id,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            )
            .into_bytes(),
        }
    }

    /// Serialize one entry.
    pub fn record(&mut self, entry: &AuditLogEntry) -> Result<Vec<u8>> {
        match self {
            Self::Csv => {
                let fields = serde_json::to_string(&entry.fields)
                    .context("serializing event payload")
                    .map_err(AuditError::Internal)?;
                Ok(format!(
                    "{},{},{},{},{},{},{}\n",
                    csv_quote(&entry.id.to_string()),
                    csv_quote(&entry.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
                    csv_quote(&entry.actor_id.to_string()),
                    csv_quote(&entry.organization_id.to_string()),
                    csv_quote(&entry.resource_type),
                    csv_quote(&entry.action),
                    csv_quote(&fields),
                )
                .into_bytes())
            }
            Self::Json { first } => {
                let record = serde_json::to_vec(entry)
                    .context("serializing event")
                    .map_err(AuditError::Internal)?;
                let mut out = Vec::with_capacity(record.len() + 2);
                if *first {
                    *first = false;
                } else {
                    out.push(b',');
                }
                out.push(b'\n');
                out.extend_from_slice(&record);
                Ok(out)
            }
        }
    }

    /// Bytes emitted after the last record.
    pub fn footer(&self) -> Vec<u8> {
        match self {
            Self::Csv => Vec::new(),
            Self::Json { .. } => b"\n]}\n".to_vec(),
        }
    }
}

// Quote every value; embedded quotes are doubled per RFC 4180.
fn csv_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditEvent;
    use crate::export::job::JobOwner;
    use crate::filter::ScopedFilter;
    use crate::permissions::{redact_event, PermissionSet, REDACTED_PLACEHOLDER};
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn entry() -> AuditLogEntry {
        let mut fields = serde_json::Map::new();
        fields.insert("note".into(), json!("said \"hello\""));
        fields.insert("secret".into(), json!("hunter2"));
        let event = AuditEvent::record(Uuid::new_v4(), Uuid::new_v4(), "login", "create", fields);
        let set = PermissionSet::new()
            .grant("login", "create")
            .redact_field("login", "secret");
        redact_event(&event, set.redaction_rules())
    }

    fn job(format: ExportFormat) -> ExportJob {
        let owner = JobOwner {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
        };
        let filter = ScopedFilter {
            organization_id: owner.organization_id,
            date_from: DateTime::UNIX_EPOCH,
            date_to: Utc::now(),
            actor_ids: None,
            visible: BTreeSet::new(),
            search: None,
        };
        ExportJob::new(
            owner,
            filter,
            crate::permissions::RedactionRules::new(),
            format,
        )
    }

    #[test]
    fn csv_quotes_and_doubles_embedded_quotes() {
        let mut serializer = ExportSerializer::new(ExportFormat::Csv);
        let line = String::from_utf8(serializer.record(&entry()).unwrap()).unwrap();
        assert!(line.contains("\"login\""));
        assert!(line.contains("said \\\"\"hello\\\"\""));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn json_output_parses_back() {
        let job = job(ExportFormat::Json);
        let mut serializer = ExportSerializer::new(ExportFormat::Json);
        let mut out = serializer.header(&job);
        out.extend(serializer.record(&entry()).unwrap());
        out.extend(serializer.record(&entry()).unwrap());
        out.extend(serializer.footer());

        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["export"]["format"], json!("json"));
        assert_eq!(doc["events"].as_array().unwrap().len(), 2);
        assert_eq!(doc["events"][0]["fields"]["secret"], json!(REDACTED_PLACEHOLDER));
    }

    #[test]
    fn formats_agree_on_redaction() {
        let entry = entry();
        let mut csv = ExportSerializer::new(ExportFormat::Csv);
        let line = String::from_utf8(csv.record(&entry).unwrap()).unwrap();
        assert!(line.contains(REDACTED_PLACEHOLDER));

        let mut json_ser = ExportSerializer::new(ExportFormat::Json);
        let record = String::from_utf8(json_ser.record(&entry).unwrap()).unwrap();
        assert!(record.contains(REDACTED_PLACEHOLDER));
    }
}
