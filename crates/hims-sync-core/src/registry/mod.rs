//! Entity table registry
//!
//! Maps each syncable entity kind to its backing table and allow-listed
//! columns. Adding a kind is a call to [`Registry::register`].

mod catalog;
mod schema;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use schema::{EntitySchema, FieldSpec, FieldType, BOOKKEEPING_COLUMNS};

use crate::error::{Error, Result};
use crate::models::{Operation, ServerRecord};

/// Per-kind behavior the sync pipeline dispatches on
pub trait EntityHandler: Send + Sync {
    fn schema(&self) -> &EntitySchema;

    fn kind(&self) -> &str {
        &self.schema().kind
    }

    /// How a row changed relative to a pull checkpoint.
    fn classify_operation(&self, record: &ServerRecord, since: i64) -> Operation {
        if record.is_deleted() {
            Operation::Delete
        } else if record.created_at > since {
            Operation::Create
        } else {
            Operation::Update
        }
    }
}

/// Handler for a kind with no behavior beyond its table
#[derive(Debug, Clone)]
pub struct TableHandler {
    schema: EntitySchema,
}

impl TableHandler {
    pub const fn new(schema: EntitySchema) -> Self {
        Self { schema }
    }
}

impl EntityHandler for TableHandler {
    fn schema(&self) -> &EntitySchema {
        &self.schema
    }
}

/// Registered entity kinds, keyed by kind tag
#[derive(Clone, Default)]
pub struct Registry {
    handlers: BTreeMap<String, Arc<dyn EntityHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the hospital record kinds.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for schema in catalog::standard_schemas() {
            if let Err(error) = registry.register_schema(schema) {
                tracing::error!("Skipping invalid built-in entity schema: {error}");
            }
        }
        registry
    }

    /// Register a handler. Kind tags and table names must be unique.
    pub fn register(&mut self, handler: Arc<dyn EntityHandler>) -> Result<()> {
        let schema = handler.schema();
        schema.validate()?;

        if self.handlers.contains_key(&schema.kind) {
            return Err(Error::InvalidInput(format!(
                "Entity type already registered: {}",
                schema.kind
            )));
        }
        if self.schemas().any(|existing| existing.table == schema.table) {
            return Err(Error::InvalidInput(format!(
                "Table already registered: {}",
                schema.table
            )));
        }

        self.handlers.insert(schema.kind.clone(), handler);
        Ok(())
    }

    pub fn register_schema(&mut self, schema: EntitySchema) -> Result<()> {
        self.register(Arc::new(TableHandler::new(schema)))
    }

    /// Look up the handler for a kind tag.
    pub fn resolve(&self, kind: &str) -> Result<&Arc<dyn EntityHandler>> {
        self.handlers
            .get(kind)
            .ok_or_else(|| Error::UnknownEntityKind(kind.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &EntitySchema> {
        self.handlers.values().map(|handler| handler.schema())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payload;

    #[test]
    fn test_standard_registry_maps_kinds_to_tables() {
        let registry = Registry::standard();
        assert_eq!(registry.len(), 14);

        let expected = [
            ("patient", "patients"),
            ("encounter", "encounters"),
            ("vital_sign", "vitals"),
            ("clinical_note", "clinical_notes"),
            ("prescription", "prescriptions"),
            ("lab_order", "lab_orders"),
            ("lab_result", "lab_results"),
            ("imaging_order", "imaging_orders"),
            ("admission", "admissions"),
            ("invoice", "invoices"),
            ("payment", "payments"),
            ("antenatal_visit", "antenatal_visits"),
            ("postnatal_visit", "postnatal_visits"),
            ("immunization", "immunization_schedules"),
        ];
        for (kind, table) in expected {
            assert_eq!(registry.resolve(kind).unwrap().schema().table, table);
        }
    }

    #[test]
    fn test_resolve_unknown_kind() {
        let registry = Registry::standard();
        assert!(matches!(
            registry.resolve("pharmacy_sale"),
            Err(Error::UnknownEntityKind(kind)) if kind == "pharmacy_sale"
        ));
    }

    #[test]
    fn test_register_new_kind() {
        let mut registry = Registry::standard();
        registry
            .register_schema(
                EntitySchema::new("referral", "referrals").field("reason", FieldType::Text),
            )
            .unwrap();
        assert!(registry.resolve("referral").is_ok());
        assert!(registry.kinds().any(|kind| kind == "referral"));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = Registry::standard();
        assert!(registry
            .register_schema(EntitySchema::new("patient", "patients_v2"))
            .is_err());
        assert!(registry
            .register_schema(EntitySchema::new("person", "patients"))
            .is_err());
    }

    #[test]
    fn test_default_classification() {
        let registry = Registry::standard();
        let handler = registry.resolve("patient").unwrap();
        let mut record = ServerRecord {
            id: "p-1".into(),
            facility_id: "fac-1".into(),
            version: 2,
            created_at: 100,
            updated_at: 300,
            deleted_at: None,
            fields: Payload::new(),
        };

        assert_eq!(handler.classify_operation(&record, 50), Operation::Create);
        assert_eq!(handler.classify_operation(&record, 200), Operation::Update);
        record.deleted_at = Some(300);
        assert_eq!(handler.classify_operation(&record, 50), Operation::Delete);
    }
}
