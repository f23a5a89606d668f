//! Per-kind schema descriptors and column typing

use libsql::Value as SqlValue;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Columns every entity table carries, managed by the sync core
pub const BOOKKEEPING_COLUMNS: [&str; 6] = [
    "id",
    "facility_id",
    "version",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// Storage type of a domain column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Boolean,
    /// Arbitrary JSON, stored as text
    Json,
}

impl FieldType {
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Text | Self::Json => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
        }
    }

    const fn expected(self) -> &'static str {
        match self {
            Self::Text => "a string",
            Self::Integer => "an integer",
            Self::Real => "a number",
            Self::Boolean => "a boolean",
            Self::Json => "a JSON value",
        }
    }

    /// Convert a payload value into a column value. `null` is accepted everywhere.
    pub fn to_sql(self, field: &str, value: &Value) -> Result<SqlValue> {
        let mismatch = || Error::FieldType {
            field: field.to_string(),
            expected: self.expected(),
        };

        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match self {
            Self::Text => value
                .as_str()
                .map(|text| SqlValue::Text(text.to_string()))
                .ok_or_else(mismatch),
            Self::Integer => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
            Self::Real => value.as_f64().map(SqlValue::Real).ok_or_else(mismatch),
            Self::Boolean => value
                .as_bool()
                .map(|flag| SqlValue::Integer(i64::from(flag)))
                .ok_or_else(mismatch),
            Self::Json => Ok(SqlValue::Text(serde_json::to_string(value)?)),
        }
    }

    /// Convert a stored column value back into its payload form.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_sql(self, value: SqlValue) -> Value {
        match (self, value) {
            (_, SqlValue::Null) => Value::Null,
            (Self::Boolean, SqlValue::Integer(flag)) => Value::Bool(flag != 0),
            (Self::Json, SqlValue::Text(text)) => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            (Self::Real, SqlValue::Integer(number)) => Value::from(number as f64),
            (_, SqlValue::Integer(number)) => Value::from(number),
            (_, SqlValue::Real(number)) => Value::from(number),
            (_, SqlValue::Text(text)) => Value::String(text),
            (_, SqlValue::Blob(bytes)) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }
}

/// One allow-listed domain column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Backing table and allowed columns of one entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySchema {
    pub kind: String,
    pub table: String,
    pub fields: Vec<FieldSpec>,
}

impl EntitySchema {
    pub fn new(kind: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    /// Add a domain column.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
        });
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn is_bookkeeping(name: &str) -> bool {
        BOOKKEEPING_COLUMNS.contains(&name)
    }

    /// Check that every name is a plain SQL identifier and no column is declared twice.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.kind) {
            return Err(Error::InvalidInput(format!(
                "Invalid entity type name: {}",
                self.kind
            )));
        }
        if !is_identifier(&self.table) {
            return Err(Error::InvalidInput(format!(
                "Invalid table name for {}: {}",
                self.kind, self.table
            )));
        }
        for (index, spec) in self.fields.iter().enumerate() {
            if !is_identifier(&spec.name) || Self::is_bookkeeping(&spec.name) {
                return Err(Error::InvalidInput(format!(
                    "Invalid field name for {}: {}",
                    self.kind, spec.name
                )));
            }
            if self.fields[..index].iter().any(|other| other.name == spec.name) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate field for {}: {}",
                    self.kind, spec.name
                )));
            }
        }
        Ok(())
    }

    /// Bookkeeping columns followed by domain columns, in storage order.
    pub fn select_list(&self) -> String {
        BOOKKEEPING_COLUMNS
            .iter()
            .copied()
            .chain(self.fields.iter().map(|spec| spec.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_table_sql(&self) -> String {
        let mut columns = vec![
            "id TEXT PRIMARY KEY".to_string(),
            "facility_id TEXT NOT NULL".to_string(),
            "version INTEGER NOT NULL DEFAULT 1".to_string(),
            "created_at INTEGER NOT NULL".to_string(),
            "updated_at INTEGER NOT NULL".to_string(),
            "deleted_at INTEGER".to_string(),
        ];
        columns.extend(
            self.fields
                .iter()
                .map(|spec| format!("{} {}", spec.name, spec.field_type.sql_type())),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            columns.join(",\n    ")
        )
    }

    pub fn index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_facility_updated ON {table}(facility_id, updated_at)",
            table = self.table
        )
    }

    /// Map payload keys to typed columns, dropping bookkeeping keys.
    ///
    /// Fails on the first key outside the allow-list or value of the wrong type.
    pub fn columns_for(&self, payload: &crate::models::Payload) -> Result<Vec<(String, SqlValue)>> {
        let mut columns = Vec::with_capacity(payload.len());
        for (key, value) in payload {
            if Self::is_bookkeeping(key) {
                continue;
            }
            let spec = self.field_spec(key).ok_or_else(|| Error::UnknownField {
                kind: self.kind.clone(),
                field: key.clone(),
            })?;
            columns.push((spec.name.clone(), spec.field_type.to_sql(key, value)?));
        }
        Ok(columns)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::Payload;

    fn vitals() -> EntitySchema {
        EntitySchema::new("vital_sign", "vitals")
            .field("temperature", FieldType::Real)
            .field("pulse", FieldType::Integer)
            .field("notes", FieldType::Text)
            .field("is_critical", FieldType::Boolean)
            .field("extra", FieldType::Json)
    }

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_columns_skip_bookkeeping_and_type_values() {
        let schema = vitals();
        let columns = schema
            .columns_for(&payload(json!({
                "id": "v-1",
                "version": 9,
                "temperature": 37,
                "is_critical": true,
                "notes": null
            })))
            .unwrap();

        let names: Vec<_> = columns.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(!names.contains(&"id"));
        assert!(columns.contains(&("temperature".to_string(), SqlValue::Real(37.0))));
        assert!(columns.contains(&("is_critical".to_string(), SqlValue::Integer(1))));
        assert!(columns.contains(&("notes".to_string(), SqlValue::Null)));
    }

    #[test]
    fn test_columns_reject_unknown_field() {
        let err = vitals()
            .columns_for(&payload(json!({"temperature": 37.2, "name; DROP TABLE vitals": 1})))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }

    #[test]
    fn test_columns_reject_wrong_type() {
        let err = vitals()
            .columns_for(&payload(json!({"pulse": "fast"})))
            .unwrap_err();
        assert!(matches!(err, Error::FieldType { expected: "an integer", .. }));
    }

    #[test]
    fn test_from_sql_restores_payload_shapes() {
        assert_eq!(FieldType::Boolean.from_sql(SqlValue::Integer(0)), json!(false));
        assert_eq!(
            FieldType::Json.from_sql(SqlValue::Text(r#"{"a":[1]}"#.into())),
            json!({"a": [1]})
        );
        assert_eq!(FieldType::Real.from_sql(SqlValue::Integer(70)), json!(70.0));
        assert_eq!(FieldType::Text.from_sql(SqlValue::Null), Value::Null);
    }

    #[test]
    fn test_validate_rejects_unsafe_names() {
        assert!(vitals().validate().is_ok());
        assert!(EntitySchema::new("Vital", "vitals").validate().is_err());
        assert!(EntitySchema::new("vital", "vitals x").validate().is_err());
        assert!(EntitySchema::new("vital", "vitals")
            .field("version", FieldType::Integer)
            .validate()
            .is_err());
        assert!(EntitySchema::new("vital", "vitals")
            .field("pulse", FieldType::Integer)
            .field("pulse", FieldType::Real)
            .validate()
            .is_err());
    }

    #[test]
    fn test_create_table_sql_lists_columns() {
        let sql = vitals().create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS vitals"));
        assert!(sql.contains("deleted_at INTEGER"));
        assert!(sql.contains("temperature REAL"));
        assert!(sql.contains("extra TEXT"));
    }
}
