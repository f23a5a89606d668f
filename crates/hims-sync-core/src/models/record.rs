//! Server-side entity row model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Payload;

/// Current server state of one entity row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub facility_id: String,
    /// Bumped on every write
    pub version: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last modification timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete timestamp (Unix ms)
    pub deleted_at: Option<i64>,
    /// Domain columns, keyed by field name
    pub fields: Payload,
}

impl ServerRecord {
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Flatten bookkeeping and domain columns into one payload, as a client sees the row.
    pub fn to_payload(&self) -> Payload {
        let mut payload = self.fields.clone();
        payload.insert("id".into(), Value::from(self.id.clone()));
        payload.insert("facility_id".into(), Value::from(self.facility_id.clone()));
        payload.insert("version".into(), Value::from(self.version));
        payload.insert("created_at".into(), Value::from(self.created_at));
        payload.insert("updated_at".into(), Value::from(self.updated_at));
        payload.insert(
            "deleted_at".into(),
            self.deleted_at.map_or(Value::Null, Value::from),
        );
        payload
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_to_payload_includes_bookkeeping() {
        let mut fields = Payload::new();
        fields.insert("first_name".into(), json!("Amina"));
        let record = ServerRecord {
            id: "p-1".into(),
            facility_id: "fac-1".into(),
            version: 4,
            created_at: 10,
            updated_at: 20,
            deleted_at: None,
            fields,
        };

        let payload = record.to_payload();
        assert_eq!(payload["first_name"], json!("Amina"));
        assert_eq!(payload["version"], json!(4));
        assert_eq!(payload["deleted_at"], Value::Null);
        assert!(!record.is_deleted());
    }
}
