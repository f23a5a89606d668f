//! Conflict detector
//!
//! Timestamp plus field-diff comparison of a queued change against the
//! current server row. There is no causal history: a server row that is not
//! strictly newer than the client's timestamp is assumed to be what the
//! client last saw.

use crate::models::{
    ConflictId, ConflictType, Operation, Payload, QueuedChange, Resolution, ServerRecord,
    SyncConflict,
};

use super::diff::{comparable_keys, conflicting_fields};
use super::merge::suggest_merge;

/// Server-side half of a conflict, before it is attributed to a change
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDraft {
    pub conflict_type: ConflictType,
    pub server_version: i64,
    pub server_timestamp: i64,
    pub server_payload: Payload,
    pub conflicting_fields: Vec<String>,
    pub suggested_merge: Option<Payload>,
}

impl ConflictDraft {
    /// Attribute the draft to the change that triggered it.
    pub fn into_conflict(self, change: &QueuedChange, now: i64) -> SyncConflict {
        SyncConflict {
            id: ConflictId::new(),
            facility_id: change.facility_id.clone(),
            entity_type: change.entity_type.clone(),
            entity_id: change.entity_id.clone(),
            conflict_type: self.conflict_type,
            client_version: change.client_version,
            server_version: self.server_version,
            client_timestamp: change.client_timestamp,
            server_timestamp: self.server_timestamp,
            client_payload: change.payload.clone(),
            server_payload: self.server_payload,
            base_payload: change.previous_payload.clone(),
            conflicting_fields: self.conflicting_fields,
            suggested_merge: self.suggested_merge,
            resolution: Resolution::Pending,
            resolved_payload: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            client_id: change.client_id.clone(),
            client_user_id: change.user_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Verdict for one change against one observation of the server row
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Safe to apply; `observed_version` is the row version seen, if the row exists
    Clear { observed_version: Option<i64> },
    Conflict(ConflictDraft),
}

/// Decide whether `change` conflicts with `record`.
///
/// Creates are never checked and always come back clear.
pub fn evaluate(change: &QueuedChange, record: Option<&ServerRecord>, now: i64) -> Detection {
    if change.operation == Operation::Create {
        return Detection::Clear {
            observed_version: record.map(|record| record.version),
        };
    }

    let Some(record) = record else {
        return match change.operation {
            Operation::Update => Detection::Conflict(ConflictDraft {
                conflict_type: ConflictType::DeleteEdit,
                server_version: 0,
                server_timestamp: now,
                server_payload: Payload::new(),
                conflicting_fields: comparable_keys(&change.payload),
                suggested_merge: None,
            }),
            _ => Detection::Clear {
                observed_version: None,
            },
        };
    };

    if record.is_deleted() {
        return match change.operation {
            Operation::Update => Detection::Conflict(ConflictDraft {
                conflict_type: ConflictType::DeleteEdit,
                server_version: record.version,
                server_timestamp: record.updated_at,
                server_payload: record.to_payload(),
                conflicting_fields: comparable_keys(&change.payload),
                suggested_merge: None,
            }),
            _ => Detection::Clear {
                observed_version: Some(record.version),
            },
        };
    }

    let clear = Detection::Clear {
        observed_version: Some(record.version),
    };
    if record.updated_at <= change.client_timestamp {
        return clear;
    }

    let server_payload = record.to_payload();
    let fields = conflicting_fields(
        change.previous_payload.as_ref(),
        &change.payload,
        &server_payload,
    );
    if fields.is_empty() {
        return clear;
    }

    let conflict_type = if change.operation == Operation::Delete {
        ConflictType::EditDelete
    } else {
        ConflictType::ConcurrentEdit
    };
    let suggested_merge = suggest_merge(&change.payload, &server_payload, &fields);

    Detection::Conflict(ConflictDraft {
        conflict_type,
        server_version: record.version,
        server_timestamp: record.updated_at,
        server_payload,
        conflicting_fields: fields,
        suggested_merge,
    })
}
