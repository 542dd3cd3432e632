//! Model output parsing
//!
//! Models are told to answer with bare JSON but often wrap it in a fenced
//! block or add a sentence around it. The first JSON value is taken from the
//! fenced block when there is one, otherwise from the first opening bracket.
//! A single trailing-comma repair is attempted before giving up.

use chrono::{SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::model::SoapSections;

pub const SCHEMA_VERSION: &str = "1.0.0";

lazy_static! {
    static ref TRAILING_COMMA: Option<Regex> = Regex::new(r",(\s*[}\]])").ok();
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON value in model output")]
    Missing,

    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("expected a JSON {expected}")]
    WrongShape { expected: &'static str },
}

/// Body of the first fenced block, preferring a `json`-tagged one.
fn fenced_body(text: &str) -> Option<&str> {
    if let Some((_, rest)) = text.split_once("```json") {
        return Some(rest.split("```").next().unwrap_or(rest));
    }
    let mut parts = text.splitn(3, "```");
    parts.next()?;
    parts.next()
}

fn first_value(text: &str, opener: char) -> Result<Value, ExtractError> {
    let start = text.find(opener).ok_or(ExtractError::Missing)?;
    let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match values.next() {
        Some(value) => Ok(value?),
        None => Err(ExtractError::Missing),
    }
}

fn extract(text: &str, opener: char) -> Result<Value, ExtractError> {
    let candidate = fenced_body(text).unwrap_or(text);
    match first_value(candidate, opener) {
        Err(ExtractError::Invalid(err)) => {
            let Some(pattern) = TRAILING_COMMA.as_ref() else {
                return Err(ExtractError::Invalid(err));
            };
            let repaired = pattern.replace_all(candidate, "$1");
            first_value(&repaired, opener).map_err(|_| ExtractError::Invalid(err))
        }
        other => other,
    }
}

/// First JSON object in model output.
///
/// # Errors
///
/// Fails when no object can be parsed, even after repair.
pub fn extract_object(text: &str) -> Result<Map<String, Value>, ExtractError> {
    match extract(text, '{')? {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractError::WrongShape { expected: "object" }),
    }
}

/// First JSON array in model output.
///
/// # Errors
///
/// Fails when no array can be parsed, even after repair.
pub fn extract_array(text: &str) -> Result<Vec<Value>, ExtractError> {
    match extract(text, '[')? {
        Value::Array(items) => Ok(items),
        _ => Err(ExtractError::WrongShape { expected: "array" }),
    }
}

fn is_missing(document: &Map<String, Value>, key: &str) -> bool {
    document.get(key).map_or(true, Value::is_null)
}

/// Fills the schema fields every stored document must carry.
pub fn complete_document(mut document: Map<String, Value>) -> Value {
    if is_missing(&document, "schema_version") {
        tracing::warn!("Generated note missing schema_version, adding default");
        document.insert("schema_version".to_string(), json!(SCHEMA_VERSION));
    }
    if is_missing(&document, "generated_at") {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        document.insert("generated_at".to_string(), Value::String(now));
    }
    Value::Object(document)
}

/// Note sections, with empty placeholders for anything the model left out.
pub fn soap_sections(document: &Value) -> SoapSections {
    let section = |key: &str| match document.get(key) {
        Some(value) if !value.is_null() => value.clone(),
        _ => json!({}),
    };
    let chief_complaint = match document.get("chief_complaint") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    SoapSections {
        chief_complaint,
        subjective: section("subjective"),
        objective: section("objective"),
        assessment: section("assessment"),
        plan: section("plan"),
    }
}
