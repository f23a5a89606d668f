//! Column value conversions shared by the repositories

use libsql::{Row, Value};

use crate::error::{Error, Result};
use crate::models::Payload;

pub fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

pub fn opt_int(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

pub fn json(payload: &Payload) -> Result<Value> {
    Ok(Value::Text(serde_json::to_string(payload)?))
}

pub fn opt_json(payload: Option<&Payload>) -> Result<Value> {
    payload.map_or(Ok(Value::Null), json)
}

pub fn get_text(row: &Row, idx: i32) -> Result<String> {
    match row.get_value(idx)? {
        Value::Text(text) => Ok(text),
        other => Err(unexpected(idx, "text", &other)),
    }
}

pub fn get_opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(unexpected(idx, "text", &other)),
    }
}

pub fn get_int(row: &Row, idx: i32) -> Result<i64> {
    match row.get_value(idx)? {
        Value::Integer(number) => Ok(number),
        other => Err(unexpected(idx, "integer", &other)),
    }
}

pub fn get_opt_int(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(number) => Ok(Some(number)),
        other => Err(unexpected(idx, "integer", &other)),
    }
}

pub fn get_json(row: &Row, idx: i32) -> Result<Payload> {
    let raw = get_text(row, idx)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn get_opt_json(row: &Row, idx: i32) -> Result<Option<Payload>> {
    get_opt_text(row, idx)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(Into::into)
}

fn unexpected(idx: i32, expected: &str, value: &Value) -> Error {
    Error::Database(format!(
        "Column {idx}: expected {expected}, found {value:?}"
    ))
}
