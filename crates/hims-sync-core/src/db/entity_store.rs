//! Entity table storage
//!
//! The two operations the sync core needs from the record modules: read the
//! current state of a row and write new state to it. Table and column names
//! come only from registered [`EntitySchema`]s, never from payload keys.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{Payload, ServerRecord};
use crate::registry::{EntitySchema, BOOKKEEPING_COLUMNS};
use libsql::{params_from_iter, Connection, Row, Value};

use super::values::{get_int, get_opt_int, get_text, text};

/// Optimistic concurrency condition for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGuard {
    /// Write whatever the current version is
    Any,
    /// Write only if the row still has this version
    Exactly(i64),
}

/// A new row for [`EntityStore::insert`]
#[derive(Debug, Clone)]
pub struct NewRow<'a> {
    pub id: &'a str,
    pub facility_id: &'a str,
    pub columns: Vec<(String, Value)>,
    pub now: i64,
}

/// Trait for entity table storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityStore {
    /// Current row, including soft-deleted rows
    async fn fetch(&self, schema: &EntitySchema, id: &str) -> Result<Option<ServerRecord>>;

    /// Insert a row at version 1
    async fn insert(&self, schema: &EntitySchema, row: NewRow<'_>) -> Result<()>;

    /// Write columns and bump the version, returning rows affected.
    ///
    /// Without `revive` only live rows are written; with it `deleted_at` is cleared.
    async fn update(
        &self,
        schema: &EntitySchema,
        id: &str,
        columns: &[(String, Value)],
        guard: VersionGuard,
        revive: bool,
        now: i64,
    ) -> Result<u64>;

    /// Stamp `deleted_at` on a live row and bump the version, returning rows affected
    async fn soft_delete(
        &self,
        schema: &EntitySchema,
        id: &str,
        guard: VersionGuard,
        now: i64,
    ) -> Result<u64>;

    /// Rows of a facility modified after `since`, oldest modification first
    async fn changed_since(
        &self,
        schema: &EntitySchema,
        facility_id: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<ServerRecord>>;
}

/// libSQL implementation of `EntityStore`
pub struct LibSqlEntityStore<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(schema: &EntitySchema, row: &Row) -> Result<ServerRecord> {
        let mut fields = Payload::new();
        for (offset, spec) in schema.fields.iter().enumerate() {
            let idx = i32::try_from(BOOKKEEPING_COLUMNS.len() + offset)
                .map_err(|_| Error::Database(format!("Too many columns in {}", schema.table)))?;
            fields.insert(spec.name.clone(), spec.field_type.from_sql(row.get_value(idx)?));
        }

        Ok(ServerRecord {
            id: get_text(row, 0)?,
            facility_id: get_text(row, 1)?,
            version: get_int(row, 2)?,
            created_at: get_int(row, 3)?,
            updated_at: get_int(row, 4)?,
            deleted_at: get_opt_int(row, 5)?,
            fields,
        })
    }

    fn push_guard(sql: &mut String, params: &mut Vec<Value>, guard: VersionGuard) {
        if let VersionGuard::Exactly(version) = guard {
            sql.push_str(" AND version = ?");
            params.push(Value::Integer(version));
        }
    }
}

impl EntityStore for LibSqlEntityStore<'_> {
    async fn fetch(&self, schema: &EntitySchema, id: &str) -> Result<Option<ServerRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM {} WHERE id = ?",
                    schema.select_list(),
                    schema.table
                ),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(schema, &row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, schema: &EntitySchema, row: NewRow<'_>) -> Result<()> {
        let mut names = vec!["id", "facility_id", "version", "created_at", "updated_at"];
        let mut params = vec![
            text(row.id),
            text(row.facility_id),
            Value::Integer(1),
            Value::Integer(row.now),
            Value::Integer(row.now),
        ];
        for (name, value) in &row.columns {
            names.push(name.as_str());
            params.push(value.clone());
        }
        let placeholders = vec!["?"; names.len()].join(", ");

        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders})",
                    schema.table,
                    names.join(", ")
                ),
                params_from_iter(params),
            )
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        schema: &EntitySchema,
        id: &str,
        columns: &[(String, Value)],
        guard: VersionGuard,
        revive: bool,
        now: i64,
    ) -> Result<u64> {
        let mut assignments: Vec<String> = columns
            .iter()
            .map(|(name, _)| format!("{name} = ?"))
            .collect();
        let mut params: Vec<Value> = columns.iter().map(|(_, value)| value.clone()).collect();

        assignments.push("version = version + 1".into());
        assignments.push("updated_at = ?".into());
        params.push(Value::Integer(now));
        if revive {
            assignments.push("deleted_at = NULL".into());
        }

        let mut sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            schema.table,
            assignments.join(", ")
        );
        params.push(text(id));
        if !revive {
            sql.push_str(" AND deleted_at IS NULL");
        }
        Self::push_guard(&mut sql, &mut params, guard);

        Ok(self.conn.execute(&sql, params_from_iter(params)).await?)
    }

    async fn soft_delete(
        &self,
        schema: &EntitySchema,
        id: &str,
        guard: VersionGuard,
        now: i64,
    ) -> Result<u64> {
        let mut sql = format!(
            "UPDATE {} SET deleted_at = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND deleted_at IS NULL",
            schema.table
        );
        let mut params = vec![Value::Integer(now), Value::Integer(now), text(id)];
        Self::push_guard(&mut sql, &mut params, guard);

        Ok(self.conn.execute(&sql, params_from_iter(params)).await?)
    }

    async fn changed_since(
        &self,
        schema: &EntitySchema,
        facility_id: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<ServerRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM {}
                     WHERE facility_id = ? AND updated_at > ?
                     ORDER BY updated_at ASC, id ASC
                     LIMIT ?",
                    schema.select_list(),
                    schema.table
                ),
                params_from_iter(vec![
                    text(facility_id),
                    Value::Integer(since),
                    Value::Integer(limit as i64),
                ]),
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(schema, &row)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::registry::Registry;
    use serde_json::json;

    async fn setup() -> (Database, EntitySchema) {
        let db = Database::open_in_memory().await.unwrap();
        let registry = Registry::standard();
        db.ensure_entity_tables(&registry).await.unwrap();
        let schema = registry.resolve("vital_sign").unwrap().schema().clone();
        (db, schema)
    }

    fn row<'a>(id: &'a str, now: i64, pulse: i64) -> NewRow<'a> {
        NewRow {
            id,
            facility_id: "fac-1",
            columns: vec![
                ("pulse".into(), Value::Integer(pulse)),
                ("temperature".into(), Value::Real(36.6)),
            ],
            now,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_fetch() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());

        store.insert(&schema, row("v-1", 100, 72)).await.unwrap();

        let record = store.fetch(&schema, "v-1").await.unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.created_at, 100);
        assert_eq!(record.updated_at, 100);
        assert_eq!(record.fields["pulse"], json!(72));
        assert_eq!(record.fields["temperature"], json!(36.6));
        assert_eq!(record.fields["notes"], serde_json::Value::Null);
        assert!(store.fetch(&schema, "v-2").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_insert_fails() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());

        store.insert(&schema, row("v-1", 100, 72)).await.unwrap();
        assert!(store.insert(&schema, row("v-1", 200, 80)).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_respects_version_guard() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());
        store.insert(&schema, row("v-1", 100, 72)).await.unwrap();

        let columns = vec![("pulse".to_string(), Value::Integer(90))];
        let stale = store
            .update(&schema, "v-1", &columns, VersionGuard::Exactly(7), false, 200)
            .await
            .unwrap();
        assert_eq!(stale, 0);

        let written = store
            .update(&schema, "v-1", &columns, VersionGuard::Exactly(1), false, 200)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let record = store.fetch(&schema, "v-1").await.unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.updated_at, 200);
        assert_eq!(record.created_at, 100);
        assert_eq!(record.fields["pulse"], json!(90));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_soft_delete_and_revive() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());
        store.insert(&schema, row("v-1", 100, 72)).await.unwrap();

        assert_eq!(
            store
                .soft_delete(&schema, "v-1", VersionGuard::Any, 300)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .soft_delete(&schema, "v-1", VersionGuard::Any, 400)
                .await
                .unwrap(),
            0
        );

        let deleted = store.fetch(&schema, "v-1").await.unwrap().unwrap();
        assert_eq!(deleted.deleted_at, Some(300));
        assert_eq!(deleted.updated_at, 300);
        assert_eq!(deleted.version, 2);

        let columns = vec![("pulse".to_string(), Value::Integer(64))];
        let plain = store
            .update(&schema, "v-1", &columns, VersionGuard::Any, false, 500)
            .await
            .unwrap();
        assert_eq!(plain, 0);

        let revived = store
            .update(&schema, "v-1", &columns, VersionGuard::Any, true, 500)
            .await
            .unwrap();
        assert_eq!(revived, 1);
        let record = store.fetch(&schema, "v-1").await.unwrap().unwrap();
        assert!(!record.is_deleted());
        assert_eq!(record.fields["pulse"], json!(64));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_changed_since_is_ordered_and_scoped() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());

        store.insert(&schema, row("v-3", 300, 70)).await.unwrap();
        store.insert(&schema, row("v-1", 100, 70)).await.unwrap();
        store.insert(&schema, row("v-2", 200, 70)).await.unwrap();
        store
            .insert(
                &schema,
                NewRow {
                    facility_id: "fac-2",
                    ..row("v-9", 250, 70)
                },
            )
            .await
            .unwrap();

        let records = store.changed_since(&schema, "fac-1", 100, 10).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["v-2", "v-3"]);

        let limited = store.changed_since(&schema, "fac-1", 0, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, "v-1");
    }
}
