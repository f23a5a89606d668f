//! Sync queue repository implementation

use crate::error::{Error, Result};
use crate::models::{ChangeId, ChangeStatus, ConflictId, Operation, QueuedChange};
use libsql::{params_from_iter, Connection, Row, Value};

use super::values::{
    get_int, get_json, get_opt_int, get_opt_json, get_opt_text, get_text, json, opt_int,
    opt_json, opt_text, text,
};

const SELECT_COLUMNS: &str = "id, facility_id, client_id, device_name, device_type, entity_type, \
     entity_id, operation, client_version, client_timestamp, payload, previous_payload, status, \
     retry_count, error_message, conflict_id, user_id, created_at, synced_at";

/// Trait for change queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Persist a new queue entry
    async fn insert(&self, change: &QueuedChange) -> Result<()>;

    /// Move a `pending` entry to `processing`; false when it was not pending
    async fn claim_pending(&self, id: &ChangeId) -> Result<bool>;

    /// Mark an entry `synced`
    async fn mark_synced(&self, id: &ChangeId, now: i64) -> Result<()>;

    /// Mark an entry `conflict` and link the conflict record
    async fn mark_conflict(&self, id: &ChangeId, conflict_id: &ConflictId) -> Result<()>;

    /// Mark an entry `failed`, bumping its retry count
    async fn mark_failed(&self, id: &ChangeId, message: &str) -> Result<()>;

    /// Mark every entry linked to a conflict `synced`
    async fn mark_synced_for_conflict(&self, conflict_id: &ConflictId, now: i64) -> Result<u64>;

    /// Reset a client's `failed` entries to `pending`
    async fn reset_failed(&self, facility_id: &str, client_id: &str) -> Result<u64>;

    /// A client's `pending` entries, oldest first
    async fn list_pending(&self, facility_id: &str, client_id: &str) -> Result<Vec<QueuedChange>>;

    /// Number of a client's entries in a status
    async fn count_by_status(
        &self,
        facility_id: &str,
        client_id: &str,
        status: ChangeStatus,
    ) -> Result<u64>;

    /// Latest synced-at of a client's entries
    async fn last_synced_at(&self, facility_id: &str, client_id: &str) -> Result<Option<i64>>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_change(row: &Row) -> Result<QueuedChange> {
        let id = get_text(row, 0)?;
        let operation: Operation = get_text(row, 7)?.parse()?;
        let status: ChangeStatus = get_text(row, 12)?.parse()?;
        let conflict_id = get_opt_text(row, 15)?
            .map(|raw| {
                raw.parse::<ConflictId>()
                    .map_err(|_| Error::Database(format!("Invalid conflict ID: {raw}")))
            })
            .transpose()?;

        Ok(QueuedChange {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid change ID: {id}")))?,
            facility_id: get_text(row, 1)?,
            client_id: get_text(row, 2)?,
            device_name: get_opt_text(row, 3)?,
            device_type: get_opt_text(row, 4)?,
            entity_type: get_text(row, 5)?,
            entity_id: get_text(row, 6)?,
            operation,
            client_version: get_int(row, 8)?,
            client_timestamp: get_int(row, 9)?,
            payload: get_json(row, 10)?,
            previous_payload: get_opt_json(row, 11)?,
            status,
            retry_count: get_int(row, 13)?,
            error_message: get_opt_text(row, 14)?,
            conflict_id,
            user_id: get_text(row, 16)?,
            created_at: get_int(row, 17)?,
            synced_at: get_opt_int(row, 18)?,
        })
    }

    async fn query_changes(&self, sql: &str, params: Vec<Value>) -> Result<Vec<QueuedChange>> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;
        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(Self::parse_change(&row)?);
        }
        Ok(changes)
    }

    async fn count(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;
        let count = if let Some(row) = rows.next().await? {
            get_int(&row, 0)?
        } else {
            0
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn update_status(&self, sql: &str, params: Vec<Value>, id: &ChangeId) -> Result<()> {
        let rows = self.conn.execute(sql, params_from_iter(params)).await?;
        if rows == 0 {
            return Err(Error::NotFound(format!("Queued change {id}")));
        }
        Ok(())
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(&self, change: &QueuedChange) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO sync_queue ({SELECT_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params_from_iter(vec![
                    text(change.id.as_str()),
                    text(change.facility_id.as_str()),
                    text(change.client_id.as_str()),
                    opt_text(change.device_name.as_deref()),
                    opt_text(change.device_type.as_deref()),
                    text(change.entity_type.as_str()),
                    text(change.entity_id.as_str()),
                    text(change.operation.as_str()),
                    Value::Integer(change.client_version),
                    Value::Integer(change.client_timestamp),
                    json(&change.payload)?,
                    opt_json(change.previous_payload.as_ref())?,
                    text(change.status.as_str()),
                    Value::Integer(change.retry_count),
                    opt_text(change.error_message.as_deref()),
                    opt_text(change.conflict_id.map(|id| id.as_str()).as_deref()),
                    text(change.user_id.as_str()),
                    Value::Integer(change.created_at),
                    opt_int(change.synced_at),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn claim_pending(&self, id: &ChangeId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = 'processing' WHERE id = ? AND status = 'pending'",
                [id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn mark_synced(&self, id: &ChangeId, now: i64) -> Result<()> {
        self.update_status(
            "UPDATE sync_queue SET status = 'synced', synced_at = ?, error_message = NULL
             WHERE id = ? AND status != 'synced'",
            vec![Value::Integer(now), text(id.as_str())],
            id,
        )
        .await
    }

    async fn mark_conflict(&self, id: &ChangeId, conflict_id: &ConflictId) -> Result<()> {
        self.update_status(
            "UPDATE sync_queue SET status = 'conflict', conflict_id = ?, error_message = NULL
             WHERE id = ? AND status != 'synced'",
            vec![text(conflict_id.as_str()), text(id.as_str())],
            id,
        )
        .await
    }

    async fn mark_failed(&self, id: &ChangeId, message: &str) -> Result<()> {
        self.update_status(
            "UPDATE sync_queue SET status = 'failed', retry_count = retry_count + 1, error_message = ?
             WHERE id = ? AND status != 'synced'",
            vec![text(message), text(id.as_str())],
            id,
        )
        .await
    }

    async fn mark_synced_for_conflict(&self, conflict_id: &ConflictId, now: i64) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = 'synced', synced_at = ?, error_message = NULL
                 WHERE conflict_id = ? AND status != 'synced'",
                params_from_iter(vec![Value::Integer(now), text(conflict_id.as_str())]),
            )
            .await?;
        Ok(rows)
    }

    async fn reset_failed(&self, facility_id: &str, client_id: &str) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = 'pending'
                 WHERE facility_id = ? AND client_id = ? AND status = 'failed'",
                [facility_id, client_id],
            )
            .await?;
        Ok(rows)
    }

    async fn list_pending(&self, facility_id: &str, client_id: &str) -> Result<Vec<QueuedChange>> {
        self.query_changes(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM sync_queue
                 WHERE facility_id = ? AND client_id = ? AND status = 'pending'
                 ORDER BY created_at ASC, id ASC"
            ),
            vec![text(facility_id), text(client_id)],
        )
        .await
    }

    async fn count_by_status(
        &self,
        facility_id: &str,
        client_id: &str,
        status: ChangeStatus,
    ) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM sync_queue WHERE facility_id = ? AND client_id = ? AND status = ?",
            vec![text(facility_id), text(client_id), text(status.as_str())],
        )
        .await
    }

    async fn last_synced_at(&self, facility_id: &str, client_id: &str) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT MAX(synced_at) FROM sync_queue
                 WHERE facility_id = ? AND client_id = ? AND status = 'synced'",
                [facility_id, client_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => get_opt_int(&row, 0),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
impl LibSqlQueueRepository<'_> {
    /// Get a queue entry by ID
    pub async fn get(&self, id: &ChangeId) -> Result<Option<QueuedChange>> {
        let mut changes = self
            .query_changes(
                &format!("SELECT {SELECT_COLUMNS} FROM sync_queue WHERE id = ?"),
                vec![text(id.as_str())],
            )
            .await?;
        Ok(changes.pop())
    }

    /// Entries linked to a conflict
    pub async fn list_for_conflict(&self, conflict_id: &ConflictId) -> Result<Vec<QueuedChange>> {
        self.query_changes(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM sync_queue WHERE conflict_id = ? ORDER BY created_at ASC"
            ),
            vec![text(conflict_id.as_str())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{IncomingChange, PushBatch};
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn entry(entity_id: &str, created_at: i64) -> QueuedChange {
        let batch: PushBatch = serde_json::from_value(json!({
            "facilityId": "fac-1",
            "clientId": "tablet-1",
            "changes": []
        }))
        .unwrap();
        let change: IncomingChange = serde_json::from_value(json!({
            "entityType": "patient",
            "entityId": entity_id,
            "operation": "update",
            "clientVersion": 2,
            "clientTimestamp": 1_000,
            "payload": {"phone": "0700000000"}
        }))
        .unwrap();
        QueuedChange::intake(&batch, &change, "user-1", created_at)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_get() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let change = entry("p-1", 10);
        repo.insert(&change).await.unwrap();

        let fetched = repo.get(&change.id).await.unwrap().unwrap();
        assert_eq!(fetched, change);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_transitions() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let change = entry("p-1", 10);
        repo.insert(&change).await.unwrap();
        repo.mark_failed(&change.id, "disk full").await.unwrap();

        let failed = repo.get(&change.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ChangeStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_message.as_deref(), Some("disk full"));

        repo.mark_synced(&change.id, 99).await.unwrap();
        let synced = repo.get(&change.id).await.unwrap().unwrap();
        assert_eq!(synced.status, ChangeStatus::Synced);
        assert_eq!(synced.synced_at, Some(99));
        assert_eq!(synced.error_message, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_synced_entries_are_immutable() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let change = entry("p-1", 10);
        repo.insert(&change).await.unwrap();
        repo.mark_synced(&change.id, 50).await.unwrap();

        assert!(repo.mark_failed(&change.id, "late failure").await.is_err());
        assert!(repo
            .mark_conflict(&change.id, &ConflictId::new())
            .await
            .is_err());

        let stored = repo.get(&change.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Synced);
        assert_eq!(stored.synced_at, Some(50));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_link_and_bulk_sync() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let conflict_id = ConflictId::new();

        let first = entry("p-1", 10);
        let second = entry("p-1", 11);
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();
        repo.mark_conflict(&first.id, &conflict_id).await.unwrap();
        repo.mark_conflict(&second.id, &conflict_id).await.unwrap();

        assert_eq!(repo.list_for_conflict(&conflict_id).await.unwrap().len(), 2);
        assert_eq!(
            repo.mark_synced_for_conflict(&conflict_id, 77).await.unwrap(),
            2
        );
        let stored = repo.get(&second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Synced);
        assert_eq!(stored.conflict_id, Some(conflict_id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_failed_and_claim() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let first = entry("p-1", 20);
        let second = entry("p-2", 10);
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();
        repo.mark_failed(&first.id, "boom").await.unwrap();
        repo.mark_failed(&second.id, "boom").await.unwrap();

        assert_eq!(repo.reset_failed("fac-1", "tablet-1").await.unwrap(), 2);
        assert_eq!(repo.reset_failed("fac-1", "tablet-1").await.unwrap(), 0);

        let pending = repo.list_pending("fac-1", "tablet-1").await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].entity_id, "p-2");
        assert_eq!(pending[0].retry_count, 1);

        assert!(repo.claim_pending(&pending[0].id).await.unwrap());
        assert!(!repo.claim_pending(&pending[0].id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_counts_and_last_sync() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        assert_eq!(repo.last_synced_at("fac-1", "tablet-1").await.unwrap(), None);

        let first = entry("p-1", 10);
        let second = entry("p-2", 11);
        let third = entry("p-3", 12);
        for change in [&first, &second, &third] {
            repo.insert(change).await.unwrap();
        }
        repo.mark_synced(&first.id, 100).await.unwrap();
        repo.mark_synced(&second.id, 300).await.unwrap();
        repo.mark_failed(&third.id, "boom").await.unwrap();

        assert_eq!(
            repo.count_by_status("fac-1", "tablet-1", ChangeStatus::Failed)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            repo.count_by_status("fac-1", "other", ChangeStatus::Failed)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            repo.last_synced_at("fac-1", "tablet-1").await.unwrap(),
            Some(300)
        );
    }
}
