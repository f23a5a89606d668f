use std::path::{Path, PathBuf};

use hims_sync_core::models::{
    ChangeOutcome, Payload, PullResult, PushResult, SyncConflict, SyncStatusSummary,
};
use hims_sync_core::registry::EntitySchema;
use hims_sync_core::{Registry, SyncEngine, SyncSettings};

use crate::error::CliError;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path.unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hims-sync")
        .join("hims-sync.db")
}

pub async fn open_engine(db_path: &Path) -> Result<SyncEngine, CliError> {
    Ok(SyncEngine::open_path(db_path, Registry::standard(), SyncSettings::default()).await?)
}

/// A global option some commands cannot run without
pub fn require_option<'a>(
    value: Option<&'a str>,
    flag: &'static str,
) -> Result<&'a str, CliError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(CliError::MissingOption(flag))
}

/// Parse a JSON object, the shape of every record payload.
pub fn parse_payload(raw: &str) -> Result<Payload, CliError> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(payload) => Ok(payload),
        other => Err(CliError::InvalidPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_status_lines(summary: &SyncStatusSummary) -> Vec<String> {
    vec![
        format!("pending:   {}", summary.pending_count),
        format!("conflicts: {}", summary.conflict_count),
        format!("failed:    {}", summary.failed_count),
        format!(
            "last sync: {}",
            summary
                .last_sync_at
                .map_or_else(|| "never".to_string(), format_sync_timestamp)
        ),
    ]
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}  {:<16}  {}/{}  fields={}  client={}",
                format_sync_timestamp(conflict.created_at),
                conflict.id,
                conflict.conflict_type.as_str(),
                conflict.entity_type,
                conflict.entity_id,
                conflict.conflicting_fields.join(","),
                conflict.client_id
            )
        })
        .collect()
}

pub fn format_push_result_lines(result: &PushResult) -> Vec<String> {
    let mut lines = vec![format!(
        "synced={} conflicts={} failed={}",
        result.synced, result.conflicts, result.failed
    )];
    for item in &result.results {
        match item.status {
            ChangeOutcome::Synced => {}
            ChangeOutcome::Conflict => lines.push(format!(
                "  conflict  {}  {}",
                item.entity_id,
                item.conflict_id
                    .map_or_else(String::new, |conflict_id| conflict_id.to_string())
            )),
            ChangeOutcome::Failed => lines.push(format!(
                "  failed    {}  {}",
                item.entity_id,
                item.error.as_deref().unwrap_or("")
            )),
        }
    }
    lines
}

pub fn format_pull_lines(result: &PullResult, since: i64) -> Vec<String> {
    let mut lines = result
        .changes
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<6}  {}/{}",
                entry.timestamp,
                entry.operation.as_str(),
                entry.entity_type,
                entry.entity_id
            )
        })
        .collect::<Vec<_>>();
    lines.push(format!(
        "checkpoint={} has_more={}",
        result.changes.last().map_or(since, |entry| entry.timestamp),
        result.has_more
    ));
    lines
}

pub fn format_entity_lines(schemas: &[EntitySchema]) -> Vec<String> {
    schemas
        .iter()
        .map(|schema| {
            let fields = schema
                .fields
                .iter()
                .map(|field| field.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{:<16} {:<24} {fields}", schema.kind, schema.table)
        })
        .collect()
}
