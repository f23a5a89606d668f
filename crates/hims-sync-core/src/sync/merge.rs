//! Auto-merge advisor

use crate::models::Payload;
use crate::util::json_opt_eq;

/// Server fields overlaid by client fields, offered only when nothing conflicts.
pub fn suggest_merge(
    client: &Payload,
    server: &Payload,
    conflicting_fields: &[String],
) -> Option<Payload> {
    if !conflicting_fields.is_empty() {
        return None;
    }

    let mut merged = server.clone();
    for (key, value) in client {
        merged.insert(key.clone(), value.clone());
    }
    Some(merged)
}

/// Fields the client changed relative to its base.
///
/// Without a base every client field counts as changed.
pub fn client_delta(client: &Payload, base: Option<&Payload>) -> Payload {
    let Some(base) = base else {
        return client.clone();
    };

    client
        .iter()
        .filter(|(key, value)| !json_opt_eq(Some(*value), base.get(*key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_suggest_merge_client_wins_overlaps() {
        let server = payload(json!({"ward": "B", "bed": "4", "status": "admitted"}));
        let client = payload(json!({"bed": "7"}));

        let merged = suggest_merge(&client, &server, &[]).unwrap();
        assert_eq!(merged["bed"], json!("7"));
        assert_eq!(merged["ward"], json!("B"));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_suggest_merge_declines_real_conflicts() {
        let server = payload(json!({"bed": "4"}));
        let client = payload(json!({"bed": "7"}));
        assert!(suggest_merge(&client, &server, &["bed".into()]).is_none());
    }

    #[test]
    fn test_client_delta_keeps_changed_fields() {
        let base = payload(json!({"phone": "0700", "address": "Kisumu"}));
        let client = payload(json!({"phone": "0711", "address": "Kisumu"}));

        let delta = client_delta(&client, Some(&base));
        assert_eq!(delta, payload(json!({"phone": "0711"})));
        assert_eq!(client_delta(&client, None), client);
    }
}
