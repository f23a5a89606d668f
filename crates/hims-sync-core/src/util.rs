//! Shared utility functions used across multiple modules.

use serde_json::Value;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Structural equality for JSON values that compares numbers numerically.
///
/// Values read back from a `REAL` column come out as floats even when the
/// client sent an integer, so `70` and `70.0` must compare equal.
pub fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return a == b;
            }
            if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                return a == b;
            }
            match (a.as_f64(), b.as_f64()) {
                #[allow(clippy::float_cmp)]
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => left == right,
    }
}

/// [`json_eq`] lifted over optional values, where `None` is an absent key.
pub fn json_opt_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (Some(a), Some(b)) => json_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" facility-1 ".to_string())),
            Some("facility-1".to_string())
        );
    }

    #[test]
    fn json_eq_compares_numbers_numerically() {
        assert!(json_eq(&json!(70), &json!(70.0)));
        assert!(!json_eq(&json!(70), &json!(70.5)));
        assert!(json_eq(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
    }

    #[test]
    fn json_eq_is_structural() {
        assert!(json_eq(&json!({"x": {"y": "z"}}), &json!({"x": {"y": "z"}})));
        assert!(!json_eq(&json!({"x": 1}), &json!({"x": 1, "y": 2})));
        assert!(!json_eq(&json!("1"), &json!(1)));
    }

    #[test]
    fn json_opt_eq_treats_absent_as_distinct_from_null() {
        assert!(json_opt_eq(None, None));
        assert!(!json_opt_eq(None, Some(&Value::Null)));
    }
}
