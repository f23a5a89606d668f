//! Queued client change model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ConflictId, Payload};
use crate::error::{Error, Result};

/// A unique identifier for a queued change, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(Uuid);

impl ChangeId {
    /// Create a new unique change ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Mutation kind carried by a change or a feed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("Unknown operation: {other}"))),
        }
    }
}

/// Lifecycle state of a queued change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Processing,
    Synced,
    Conflict,
    Failed,
}

impl ChangeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("Unknown change status: {other}"))),
        }
    }
}

/// One change as sent by a client in a push batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingChange {
    /// Entity kind tag (validated against the registry at apply time)
    pub entity_type: String,
    pub entity_id: String,
    pub operation: Operation,
    /// Client-local version counter
    #[serde(default)]
    pub client_version: i64,
    /// When the client last knew its copy to be current (Unix ms)
    pub client_timestamp: i64,
    #[serde(default)]
    pub payload: Payload,
    /// Client's last-known server state, the three-way merge base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_payload: Option<Payload>,
}

/// A batch of changes pushed by one client device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatch {
    pub facility_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    pub changes: Vec<IncomingChange>,
}

impl PushBatch {
    /// Reject batches that are structurally unusable.
    ///
    /// Individual changes are never rejected here; they get per-item outcomes.
    pub fn validate(&self, max_changes: usize) -> Result<()> {
        if self.facility_id.trim().is_empty() {
            return Err(Error::InvalidInput("facilityId is required".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidInput("clientId is required".into()));
        }
        if self.changes.len() > max_changes {
            return Err(Error::InvalidInput(format!(
                "Batch holds {} changes, the limit is {max_changes}",
                self.changes.len()
            )));
        }
        Ok(())
    }
}

/// A change persisted in the sync queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedChange {
    pub id: ChangeId,
    pub facility_id: String,
    pub client_id: String,
    /// Informational only
    pub device_name: Option<String>,
    /// Informational only
    pub device_type: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: Operation,
    pub client_version: i64,
    pub client_timestamp: i64,
    pub payload: Payload,
    pub previous_payload: Option<Payload>,
    pub status: ChangeStatus,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub conflict_id: Option<ConflictId>,
    /// Acting user who pushed the change
    pub user_id: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Set when the change reaches `synced` (Unix ms)
    pub synced_at: Option<i64>,
}

impl QueuedChange {
    /// Build a queue entry in `processing` for an incoming change.
    pub fn intake(batch: &PushBatch, change: &IncomingChange, user_id: &str, now: i64) -> Self {
        Self {
            id: ChangeId::new(),
            facility_id: batch.facility_id.clone(),
            client_id: batch.client_id.clone(),
            device_name: batch.device_name.clone(),
            device_type: batch.device_type.clone(),
            entity_type: change.entity_type.clone(),
            entity_id: change.entity_id.clone(),
            operation: change.operation,
            client_version: change.client_version,
            client_timestamp: change.client_timestamp,
            payload: change.payload.clone(),
            previous_payload: change.previous_payload.clone(),
            status: ChangeStatus::Processing,
            retry_count: 0,
            error_message: None,
            conflict_id: None,
            user_id: user_id.to_string(),
            created_at: now,
            synced_at: None,
        }
    }
}

/// Outcome tag of one processed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOutcome {
    Synced,
    Conflict,
    Failed,
}

/// Per-item entry of a push result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResult {
    pub entity_id: String,
    pub status: ChangeOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<ConflictId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeResult {
    pub fn synced(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            status: ChangeOutcome::Synced,
            conflict_id: None,
            error: None,
        }
    }

    pub fn conflict(entity_id: &str, conflict_id: ConflictId) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            status: ChangeOutcome::Conflict,
            conflict_id: Some(conflict_id),
            error: None,
        }
    }

    pub fn failed(entity_id: &str, error: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            status: ChangeOutcome::Failed,
            conflict_id: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result of a push (or reprocess) pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub synced: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub results: Vec<ChangeResult>,
}

impl PushResult {
    /// Count and keep one per-item outcome.
    pub fn record(&mut self, result: ChangeResult) {
        match result.status {
            ChangeOutcome::Synced => self.synced += 1,
            ChangeOutcome::Conflict => self.conflicts += 1,
            ChangeOutcome::Failed => self.failed += 1,
        }
        self.results.push(result);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn batch_json() -> serde_json::Value {
        json!({
            "facilityId": "fac-1",
            "clientId": "tablet-7",
            "deviceName": "Ward B tablet",
            "changes": [{
                "entityType": "patient",
                "entityId": "p-1",
                "operation": "update",
                "clientVersion": 3,
                "clientTimestamp": 1_700_000_000_000_i64,
                "payload": {"first_name": "Amina"},
                "previousPayload": {"first_name": "Amna"}
            }]
        })
    }

    #[test]
    fn test_push_batch_deserializes_camel_case() {
        let batch: PushBatch = serde_json::from_value(batch_json()).unwrap();
        assert_eq!(batch.facility_id, "fac-1");
        assert_eq!(batch.device_type, None);
        let change = &batch.changes[0];
        assert_eq!(change.operation, Operation::Update);
        assert_eq!(change.client_version, 3);
        assert!(change.previous_payload.is_some());
    }

    #[test]
    fn test_push_batch_rejects_unknown_operation() {
        let mut value = batch_json();
        value["changes"][0]["operation"] = json!("upsert");
        assert!(serde_json::from_value::<PushBatch>(value).is_err());
    }

    #[test]
    fn test_validate_requires_identity_and_bounds_size() {
        let mut batch: PushBatch = serde_json::from_value(batch_json()).unwrap();
        assert!(batch.validate(10).is_ok());
        assert!(batch.validate(0).is_err());

        batch.client_id = "  ".to_string();
        let err = batch.validate(10).unwrap_err();
        assert!(err.to_string().contains("clientId"));
    }

    #[test]
    fn test_intake_starts_processing() {
        let batch: PushBatch = serde_json::from_value(batch_json()).unwrap();
        let entry = QueuedChange::intake(&batch, &batch.changes[0], "user-9", 42);
        assert_eq!(entry.status, ChangeStatus::Processing);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.user_id, "user-9");
        assert_eq!(entry.created_at, 42);
        assert!(entry.conflict_id.is_none());
    }

    #[test]
    fn test_push_result_counts_outcomes() {
        let mut result = PushResult::default();
        result.record(ChangeResult::synced("a"));
        result.record(ChangeResult::conflict("b", ConflictId::new()));
        result.record(ChangeResult::failed("c", "boom"));
        result.record(ChangeResult::synced("d"));

        assert_eq!(result.synced, 2);
        assert_eq!(result.conflicts, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.results.len(), 4);
    }

    #[test]
    fn test_change_result_serializes_without_empty_fields() {
        let json = serde_json::to_value(ChangeResult::synced("p-1")).unwrap();
        assert_eq!(json, json!({"entityId": "p-1", "status": "synced"}));
    }
}
