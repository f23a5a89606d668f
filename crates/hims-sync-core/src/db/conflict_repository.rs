//! Conflict log repository implementation

use crate::error::{Error, Result};
use crate::models::{ConflictId, ConflictType, Payload, Resolution, SyncConflict};
use libsql::{params_from_iter, Connection, Row, Value};

use super::values::{
    get_int, get_json, get_opt_int, get_opt_json, get_opt_text, get_text, json, opt_int,
    opt_json, opt_text, text,
};

const SELECT_COLUMNS: &str = "id, facility_id, entity_type, entity_id, conflict_type, \
     client_version, server_version, client_timestamp, server_timestamp, client_payload, \
     server_payload, base_payload, conflicting_fields, suggested_merge, resolution, \
     resolved_payload, resolved_by, resolved_at, resolution_notes, client_id, client_user_id, \
     created_at, updated_at";

/// Terminal decision written onto a conflict
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRecord<'a> {
    pub resolution: Resolution,
    pub resolved_payload: Option<&'a Payload>,
    pub resolved_by: &'a str,
    pub notes: Option<&'a str>,
    pub resolved_at: i64,
}

/// Trait for conflict log storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ConflictRepository {
    /// Persist a new conflict
    async fn insert(&self, conflict: &SyncConflict) -> Result<()>;

    /// Get a conflict by ID
    async fn get(&self, id: &ConflictId) -> Result<Option<SyncConflict>>;

    /// Pending conflicts of a facility, optionally for one client, oldest first
    async fn list_pending(
        &self,
        facility_id: &str,
        client_id: Option<&str>,
    ) -> Result<Vec<SyncConflict>>;

    /// Number of a client's pending conflicts
    async fn count_pending(&self, facility_id: &str, client_id: &str) -> Result<u64>;

    /// Atomically move a pending conflict to a terminal resolution.
    ///
    /// Returns false when the conflict is no longer pending.
    async fn claim(&self, id: &ConflictId, record: ResolutionRecord<'_>) -> Result<bool>;
}

/// libSQL implementation of `ConflictRepository`
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &Row) -> Result<SyncConflict> {
        let id = get_text(row, 0)?;
        let conflicting_fields: Vec<String> = serde_json::from_str(&get_text(row, 12)?)?;

        Ok(SyncConflict {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid conflict ID: {id}")))?,
            facility_id: get_text(row, 1)?,
            entity_type: get_text(row, 2)?,
            entity_id: get_text(row, 3)?,
            conflict_type: get_text(row, 4)?.parse::<ConflictType>()?,
            client_version: get_int(row, 5)?,
            server_version: get_int(row, 6)?,
            client_timestamp: get_int(row, 7)?,
            server_timestamp: get_int(row, 8)?,
            client_payload: get_json(row, 9)?,
            server_payload: get_json(row, 10)?,
            base_payload: get_opt_json(row, 11)?,
            conflicting_fields,
            suggested_merge: get_opt_json(row, 13)?,
            resolution: get_text(row, 14)?.parse::<Resolution>()?,
            resolved_payload: get_opt_json(row, 15)?,
            resolved_by: get_opt_text(row, 16)?,
            resolved_at: get_opt_int(row, 17)?,
            resolution_notes: get_opt_text(row, 18)?,
            client_id: get_text(row, 19)?,
            client_user_id: get_text(row, 20)?,
            created_at: get_int(row, 21)?,
            updated_at: get_int(row, 22)?,
        })
    }

    async fn query_conflicts(&self, sql: &str, params: Vec<Value>) -> Result<Vec<SyncConflict>> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;
        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::parse_conflict(&row)?);
        }
        Ok(conflicts)
    }
}

impl ConflictRepository for LibSqlConflictRepository<'_> {
    async fn insert(&self, conflict: &SyncConflict) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO sync_conflicts ({SELECT_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params_from_iter(vec![
                    text(conflict.id.as_str()),
                    text(conflict.facility_id.as_str()),
                    text(conflict.entity_type.as_str()),
                    text(conflict.entity_id.as_str()),
                    text(conflict.conflict_type.as_str()),
                    Value::Integer(conflict.client_version),
                    Value::Integer(conflict.server_version),
                    Value::Integer(conflict.client_timestamp),
                    Value::Integer(conflict.server_timestamp),
                    json(&conflict.client_payload)?,
                    json(&conflict.server_payload)?,
                    opt_json(conflict.base_payload.as_ref())?,
                    text(serde_json::to_string(&conflict.conflicting_fields)?),
                    opt_json(conflict.suggested_merge.as_ref())?,
                    text(conflict.resolution.as_str()),
                    opt_json(conflict.resolved_payload.as_ref())?,
                    opt_text(conflict.resolved_by.as_deref()),
                    opt_int(conflict.resolved_at),
                    opt_text(conflict.resolution_notes.as_deref()),
                    text(conflict.client_id.as_str()),
                    text(conflict.client_user_id.as_str()),
                    Value::Integer(conflict.created_at),
                    Value::Integer(conflict.updated_at),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &ConflictId) -> Result<Option<SyncConflict>> {
        let mut conflicts = self
            .query_conflicts(
                &format!("SELECT {SELECT_COLUMNS} FROM sync_conflicts WHERE id = ?"),
                vec![text(id.as_str())],
            )
            .await?;
        Ok(conflicts.pop())
    }

    async fn list_pending(
        &self,
        facility_id: &str,
        client_id: Option<&str>,
    ) -> Result<Vec<SyncConflict>> {
        match client_id {
            Some(client_id) => {
                self.query_conflicts(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM sync_conflicts
                         WHERE facility_id = ? AND client_id = ? AND resolution = 'pending'
                         ORDER BY created_at ASC, id ASC"
                    ),
                    vec![text(facility_id), text(client_id)],
                )
                .await
            }
            None => {
                self.query_conflicts(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM sync_conflicts
                         WHERE facility_id = ? AND resolution = 'pending'
                         ORDER BY created_at ASC, id ASC"
                    ),
                    vec![text(facility_id)],
                )
                .await
            }
        }
    }

    async fn count_pending(&self, facility_id: &str, client_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM sync_conflicts
                 WHERE facility_id = ? AND client_id = ? AND resolution = 'pending'",
                [facility_id, client_id],
            )
            .await?;
        let count = if let Some(row) = rows.next().await? {
            get_int(&row, 0)?
        } else {
            0
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn claim(&self, id: &ConflictId, record: ResolutionRecord<'_>) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_conflicts
                 SET resolution = ?, resolved_payload = ?, resolved_by = ?, resolved_at = ?,
                     resolution_notes = ?, updated_at = ?
                 WHERE id = ? AND resolution = 'pending'",
                params_from_iter(vec![
                    text(record.resolution.as_str()),
                    opt_json(record.resolved_payload)?,
                    text(record.resolved_by),
                    Value::Integer(record.resolved_at),
                    opt_text(record.notes),
                    Value::Integer(record.resolved_at),
                    text(id.as_str()),
                ]),
            )
            .await?;
        Ok(rows > 0)
    }
}
