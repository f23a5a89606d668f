//! Database connection management

use crate::error::Result;
use crate::registry::Registry;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Database wrapper for libSQL connections
pub struct Database {
    // Keeps the underlying database alive for the connection.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        tracing::debug!(path = %path_str, "Opened sync database");
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        // WAL is unavailable for in-memory databases
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        self.conn
            .execute("PRAGMA cache_size = 10000;", ())
            .await
            .ok();
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Create the backing table of every registered entity kind if missing
    pub async fn ensure_entity_tables(&self, registry: &Registry) -> Result<()> {
        for schema in registry.schemas() {
            self.conn.execute(&schema.create_table_sql(), ()).await?;
            self.conn.execute(&schema.index_sql(), ()).await?;
        }
        tracing::debug!(kinds = registry.len(), "Entity tables ready");
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn table_exists(db: &Database, name: &str) -> bool {
        let mut rows = db
            .connection()
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                [name],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        row.get::<i64>(0).unwrap() == 1
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory_creates_sync_tables() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(table_exists(&db, "sync_queue").await);
        assert!(table_exists(&db, "sync_conflicts").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ensure_entity_tables_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let registry = Registry::standard();

        db.ensure_entity_tables(&registry).await.unwrap();
        db.ensure_entity_tables(&registry).await.unwrap();

        assert!(table_exists(&db, "patients").await);
        assert!(table_exists(&db, "immunization_schedules").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reopen_file_database() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("sync.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.ensure_entity_tables(&Registry::standard()).await.unwrap();
        }

        let db = Database::open(&path).await.unwrap();
        assert!(table_exists(&db, "vitals").await);
    }
}
