//! Pull feed and status models

use serde::{Deserialize, Serialize};

use super::{Operation, Payload};

/// Parameters of one pull call; the checkpoint lives on the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub facility_id: String,
    pub client_id: String,
    /// Exclusive lower bound on the modification timestamp (Unix ms)
    pub since: i64,
    /// Restrict to these kinds; all registered kinds when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One server-side mutation in the change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: Operation,
    /// Modification timestamp of the row (Unix ms)
    pub timestamp: i64,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub changes: Vec<FeedEntry>,
    pub server_timestamp: i64,
    pub has_more: bool,
}

/// Queue health for one client device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSummary {
    pub pending_count: u64,
    pub conflict_count: u64,
    pub failed_count: u64,
    /// Latest synced-at of the client's changes (Unix ms)
    pub last_sync_at: Option<i64>,
}
