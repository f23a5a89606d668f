//! Change applier

use crate::db::{EntityStore, NewRow, VersionGuard};
use crate::error::{Error, Result};
use crate::models::{Operation, Payload};
use crate::registry::EntitySchema;

/// One write against an entity table
#[derive(Debug, Clone, Copy)]
pub struct ApplyRequest<'a> {
    pub facility_id: &'a str,
    pub entity_id: &'a str,
    pub operation: Operation,
    pub payload: &'a Payload,
    pub guard: VersionGuard,
    /// Clear `deleted_at` on update, inserting the row if it is gone
    pub restore: bool,
    pub now: i64,
}

/// What happened to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// No row with this id
    Missing,
    /// The row was already soft-deleted
    AlreadyDeleted,
    /// The version guard did not match
    VersionChanged,
}

/// Validate the payload against the schema and write it.
///
/// Nothing is written when a payload key is outside the allow-list or a
/// value does not fit its column.
pub async fn apply<S: EntityStore>(
    store: &S,
    schema: &EntitySchema,
    request: ApplyRequest<'_>,
) -> Result<ApplyOutcome> {
    if request.entity_id.trim().is_empty() {
        return Err(Error::InvalidInput("entityId is required".into()));
    }

    match request.operation {
        Operation::Create => create(store, schema, request).await,
        Operation::Update => update(store, schema, request).await,
        Operation::Delete => {
            let rows = store
                .soft_delete(schema, request.entity_id, request.guard, request.now)
                .await?;
            if rows > 0 {
                return Ok(ApplyOutcome::Applied);
            }
            explain_miss(store, schema, request.entity_id).await
        }
    }
}

async fn create<S: EntityStore>(
    store: &S,
    schema: &EntitySchema,
    request: ApplyRequest<'_>,
) -> Result<ApplyOutcome> {
    if let Some(id) = request.payload.get("id") {
        if id.as_str() != Some(request.entity_id) {
            return Err(Error::InvalidInput(format!(
                "Payload id {id} does not match entityId {}",
                request.entity_id
            )));
        }
    }

    let columns = schema.columns_for(request.payload)?;
    if store.fetch(schema, request.entity_id).await?.is_some() {
        return Err(Error::InvalidInput(format!(
            "{} {} already exists",
            schema.kind, request.entity_id
        )));
    }

    store
        .insert(
            schema,
            NewRow {
                id: request.entity_id,
                facility_id: request.facility_id,
                columns,
                now: request.now,
            },
        )
        .await?;
    Ok(ApplyOutcome::Applied)
}

async fn update<S: EntityStore>(
    store: &S,
    schema: &EntitySchema,
    request: ApplyRequest<'_>,
) -> Result<ApplyOutcome> {
    let columns = schema.columns_for(request.payload)?;
    let rows = store
        .update(
            schema,
            request.entity_id,
            &columns,
            request.guard,
            request.restore,
            request.now,
        )
        .await?;
    if rows > 0 {
        return Ok(ApplyOutcome::Applied);
    }

    let outcome = explain_miss(store, schema, request.entity_id).await?;
    if request.restore && outcome == ApplyOutcome::Missing {
        store
            .insert(
                schema,
                NewRow {
                    id: request.entity_id,
                    facility_id: request.facility_id,
                    columns,
                    now: request.now,
                },
            )
            .await?;
        return Ok(ApplyOutcome::Applied);
    }
    Ok(outcome)
}

/// Why a guarded write touched no rows
async fn explain_miss<S: EntityStore>(
    store: &S,
    schema: &EntitySchema,
    entity_id: &str,
) -> Result<ApplyOutcome> {
    Ok(match store.fetch(schema, entity_id).await? {
        None => ApplyOutcome::Missing,
        Some(record) if record.is_deleted() => ApplyOutcome::AlreadyDeleted,
        Some(_) => ApplyOutcome::VersionChanged,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::db::{Database, LibSqlEntityStore};
    use crate::registry::Registry;

    async fn setup() -> (Database, EntitySchema) {
        let db = Database::open_in_memory().await.unwrap();
        let registry = Registry::standard();
        db.ensure_entity_tables(&registry).await.unwrap();
        let schema = registry.resolve("patient").unwrap().schema().clone();
        (db, schema)
    }

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn request<'a>(operation: Operation, payload: &'a Payload, now: i64) -> ApplyRequest<'a> {
        ApplyRequest {
            facility_id: "fac-1",
            entity_id: "p-1",
            operation,
            payload,
            guard: VersionGuard::Any,
            restore: false,
            now,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_update_delete() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());

        let body = payload(json!({"id": "p-1", "first_name": "Amina", "allergies": ["latex"]}));
        assert_eq!(
            apply(&store, &schema, request(Operation::Create, &body, 100))
                .await
                .unwrap(),
            ApplyOutcome::Applied
        );

        let edit = payload(json!({"first_name": "Amina W.", "version": 99}));
        apply(&store, &schema, request(Operation::Update, &edit, 200))
            .await
            .unwrap();
        let record = store.fetch(&schema, "p-1").await.unwrap().unwrap();
        assert_eq!(record.fields["first_name"], json!("Amina W."));
        assert_eq!(record.fields["allergies"], json!(["latex"]));
        assert_eq!(record.version, 2);

        let empty = Payload::new();
        apply(&store, &schema, request(Operation::Delete, &empty, 300))
            .await
            .unwrap();
        let record = store.fetch(&schema, "p-1").await.unwrap().unwrap();
        assert_eq!(record.deleted_at, Some(300));

        assert_eq!(
            apply(&store, &schema, request(Operation::Delete, &empty, 400))
                .await
                .unwrap(),
            ApplyOutcome::AlreadyDeleted
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_field_writes_nothing() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());

        let body = payload(json!({"first_name": "Amina", "is_admin": true}));
        let err = apply(&store, &schema, request(Operation::Create, &body, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
        assert!(store.fetch(&schema, "p-1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_rejects_mismatched_id_and_duplicates() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());

        let wrong = payload(json!({"id": "p-2", "first_name": "Amina"}));
        assert!(apply(&store, &schema, request(Operation::Create, &wrong, 100))
            .await
            .is_err());

        let body = payload(json!({"first_name": "Amina"}));
        apply(&store, &schema, request(Operation::Create, &body, 100))
            .await
            .unwrap();
        assert!(apply(&store, &schema, request(Operation::Create, &body, 200))
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_guarded_update_reports_version_change() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());
        let body = payload(json!({"first_name": "Amina"}));
        apply(&store, &schema, request(Operation::Create, &body, 100))
            .await
            .unwrap();

        let edit = payload(json!({"phone": "0711"}));
        let guarded = ApplyRequest {
            guard: VersionGuard::Exactly(5),
            ..request(Operation::Update, &edit, 200)
        };
        assert_eq!(
            apply(&store, &schema, guarded).await.unwrap(),
            ApplyOutcome::VersionChanged
        );
        let missing = ApplyRequest {
            entity_id: "p-404",
            ..request(Operation::Update, &edit, 200)
        };
        assert_eq!(
            apply(&store, &schema, missing).await.unwrap(),
            ApplyOutcome::Missing
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restore_revives_or_reinserts() {
        let (db, schema) = setup().await;
        let store = LibSqlEntityStore::new(db.connection());
        let body = payload(json!({"first_name": "Amina"}));

        let restore = ApplyRequest {
            restore: true,
            ..request(Operation::Update, &body, 100)
        };
        assert_eq!(
            apply(&store, &schema, restore).await.unwrap(),
            ApplyOutcome::Applied
        );
        assert!(store.fetch(&schema, "p-1").await.unwrap().is_some());

        store
            .soft_delete(&schema, "p-1", VersionGuard::Any, 200)
            .await
            .unwrap();
        let restore = ApplyRequest {
            restore: true,
            ..request(Operation::Update, &body, 300)
        };
        apply(&store, &schema, restore).await.unwrap();
        let record = store.fetch(&schema, "p-1").await.unwrap().unwrap();
        assert!(!record.is_deleted());
        assert_eq!(record.updated_at, 300);
    }
}
