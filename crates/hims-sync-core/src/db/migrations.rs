//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists = if let Some(row) = rows.next().await? {
        row.get::<i64>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version = if let Some(row) = rows.next().await? {
        row.get::<i64>(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run statements in one transaction, rolling back on the first failure
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: change queue and conflict log
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS sync_queue (
                id TEXT PRIMARY KEY,
                facility_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                device_name TEXT,
                device_type TEXT,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                client_version INTEGER NOT NULL DEFAULT 0,
                client_timestamp INTEGER NOT NULL,
                payload TEXT NOT NULL,
                previous_payload TEXT,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                conflict_id TEXT,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                synced_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_facility_status ON sync_queue(facility_id, status)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_entity ON sync_queue(entity_type, entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_conflict ON sync_queue(conflict_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_client ON sync_queue(facility_id, client_id)",
            "CREATE TABLE IF NOT EXISTS sync_conflicts (
                id TEXT PRIMARY KEY,
                facility_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                conflict_type TEXT NOT NULL,
                client_version INTEGER NOT NULL,
                server_version INTEGER NOT NULL,
                client_timestamp INTEGER NOT NULL,
                server_timestamp INTEGER NOT NULL,
                client_payload TEXT NOT NULL,
                server_payload TEXT NOT NULL,
                base_payload TEXT,
                conflicting_fields TEXT NOT NULL,
                suggested_merge TEXT,
                resolution TEXT NOT NULL DEFAULT 'pending',
                resolved_payload TEXT,
                resolved_by TEXT,
                resolved_at INTEGER,
                resolution_notes TEXT,
                client_id TEXT NOT NULL,
                client_user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_facility_resolution ON sync_conflicts(facility_id, resolution)",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_entity ON sync_conflicts(entity_type, entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_client ON sync_conflicts(facility_id, client_id)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_is_idempotent() {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();

        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(get_version(&conn).await.unwrap(), 1);
    }
}
