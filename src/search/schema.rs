//! Typed field mapping between enrichment output and the search index schema.
//!
//! The schema subset this service populates is described by a comma-separated string of
//! `key:type:extra` entries (for example `summary:Edm.String:x,satisfied:Edm.Boolean:x`). Every
//! declared key must be present in the enrichment output and coerce cleanly to its declared
//! type, otherwise no document is produced.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const RESERVED_KEYS: [&str; 2] = ["metadata_storage_path", "@search.action"];

/// Errors raised while parsing field specs or coercing enrichment output.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    /// A spec entry had no key.
    #[error("Malformed field spec entry '{0}'")]
    MalformedSpec(String),
    /// A spec entry reused a key the merge document already carries.
    #[error("Field key '{0}' is reserved by the index update document")]
    ReservedKey(String),
    /// A spec entry declared a type this mapper does not support.
    #[error("Invalid search type {type_tag} for key {key}")]
    UnknownType {
        /// Key declared by the offending entry.
        key: String,
        /// Unrecognized type tag.
        type_tag: String,
    },
    /// A declared key was absent from the enrichment output.
    #[error("Field '{0}' is missing from the enrichment output")]
    MissingField(String),
    /// A declared key held a value that cannot be represented as the declared type.
    #[error("Field '{key}' cannot be converted to {field_type}: {value}")]
    Uncoercible {
        /// Key whose value failed conversion.
        key: String,
        /// Declared target type.
        field_type: FieldType,
        /// Offending source value rendered as JSON.
        value: String,
    },
    /// Enrichment output was not a JSON object.
    #[error("Enrichment output is not a JSON object")]
    NotAnObject,
}

/// Search index field types supported by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `Edm.String`
    String,
    /// `Edm.Int32`
    Int32,
    /// `Edm.Int64`
    Int64,
    /// `Edm.Double`
    Double,
    /// `Edm.Boolean`
    Boolean,
}

impl FieldType {
    /// Type tag as written in the index schema.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::String => "Edm.String",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::Double => "Edm.Double",
            Self::Boolean => "Edm.Boolean",
        }
    }

    /// Convert a source value into this type.
    pub fn coerce(self, key: &str, value: &Value) -> Result<TypedValue, SchemaError> {
        let uncoercible = || SchemaError::Uncoercible {
            key: key.to_string(),
            field_type: self,
            value: value.to_string(),
        };

        match self {
            Self::String => as_text(value).map(TypedValue::String).ok_or_else(uncoercible),
            Self::Int64 => as_integer(value).map(TypedValue::Int64).ok_or_else(uncoercible),
            Self::Int32 => as_integer(value)
                .and_then(|number| i32::try_from(number).ok())
                .map(TypedValue::Int32)
                .ok_or_else(uncoercible),
            Self::Double => as_double(value).map(TypedValue::Double).ok_or_else(uncoercible),
            Self::Boolean => Ok(TypedValue::Boolean(is_truthy(value))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for FieldType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Edm.String" => Ok(Self::String),
            "Edm.Int32" => Ok(Self::Int32),
            "Edm.Int64" => Ok(Self::Int64),
            "Edm.Double" => Ok(Self::Double),
            "Edm.Boolean" => Ok(Self::Boolean),
            _ => Err(()),
        }
    }
}

/// One `key:type:extra` entry of the field-spec configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name shared by the enrichment output and the index.
    pub key: String,
    /// Declared index type.
    pub field_type: FieldType,
}

/// Value converted to its declared index type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    /// `Edm.String` value.
    String(String),
    /// `Edm.Int32` value.
    Int32(i32),
    /// `Edm.Int64` value.
    Int64(i64),
    /// `Edm.Double` value.
    Double(f64),
    /// `Edm.Boolean` value.
    Boolean(bool),
}

/// Parse the comma-separated field-spec string, preserving declaration order.
///
/// Whitespace is ignored and the third segment is accepted but unused. An entry holding only a
/// key is treated as `Edm.String`.
pub fn parse_field_specs(spec: &str) -> Result<Vec<FieldSpec>, SchemaError> {
    let compact: String = spec.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split(',')
        .filter(|entry| !entry.is_empty())
        .map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> Result<FieldSpec, SchemaError> {
    let mut parts = entry.splitn(3, ':');
    let key = parts.next().unwrap_or_default();
    if key.is_empty() {
        return Err(SchemaError::MalformedSpec(entry.to_string()));
    }
    if RESERVED_KEYS.contains(&key) {
        return Err(SchemaError::ReservedKey(key.to_string()));
    }

    let field_type = match parts.next() {
        None => FieldType::String,
        Some(tag) => tag.parse().map_err(|()| SchemaError::UnknownType {
            key: key.to_string(),
            type_tag: tag.to_string(),
        })?,
    };

    Ok(FieldSpec {
        key: key.to_string(),
        field_type,
    })
}

/// Parse `spec` and coerce every declared field from `source`.
pub fn build_typed_fields(
    spec: &str,
    source: &Map<String, Value>,
) -> Result<BTreeMap<String, TypedValue>, SchemaError> {
    let specs = parse_field_specs(spec)?;
    map_fields(&specs, source)
}

/// Coerce every declared field from `source`, failing on the first problem.
pub fn map_fields(
    specs: &[FieldSpec],
    source: &Map<String, Value>,
) -> Result<BTreeMap<String, TypedValue>, SchemaError> {
    specs
        .iter()
        .map(|spec| {
            let value = source
                .get(&spec.key)
                .ok_or_else(|| SchemaError::MissingField(spec.key.clone()))?;
            let typed = spec.field_type.coerce(&spec.key, value)?;
            Ok((spec.key.clone(), typed))
        })
        .collect()
}

/// `null` has no string form in the index, so it is uncoercible rather than rendered as text.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(f64::trunc)
                .filter(|float| *float >= i64::MIN as f64 && *float <= i64::MAX as f64)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

fn as_double(value: &Value) -> Option<f64> {
    let float = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    float.is_finite().then_some(float)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|float| float != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn coerces_string_number_to_integer() {
        let fields = build_typed_fields("count:Edm.Int32:x", &object(json!({ "count": "5" })))
            .expect("typed fields");

        assert_eq!(fields.get("count"), Some(&TypedValue::Int32(5)));
        assert_eq!(serde_json::to_value(&fields).expect("json"), json!({ "count": 5 }));
    }

    #[test]
    fn parses_specs_in_declaration_order_ignoring_whitespace() {
        let specs = parse_field_specs(" summary : Edm.String : x ,satisfied:Edm.Boolean:x, ")
            .expect("specs");

        assert_eq!(
            specs,
            vec![
                FieldSpec {
                    key: "summary".into(),
                    field_type: FieldType::String,
                },
                FieldSpec {
                    key: "satisfied".into(),
                    field_type: FieldType::Boolean,
                },
            ]
        );
    }

    #[test]
    fn bare_key_defaults_to_string() {
        let specs = parse_field_specs("summary").expect("specs");
        assert_eq!(specs[0].field_type, FieldType::String);
    }

    #[test]
    fn unknown_type_tag_is_a_hard_error() {
        let error = build_typed_fields(
            "summary:Edm.String:x,score:Edm.Decimal:x",
            &object(json!({ "summary": "ok", "score": 1 })),
        )
        .expect_err("unknown tag");

        assert_eq!(
            error,
            SchemaError::UnknownType {
                key: "score".into(),
                type_tag: "Edm.Decimal".into(),
            }
        );
    }

    #[test]
    fn missing_source_field_fails() {
        let error = build_typed_fields(
            "summary:Edm.String:x,satisfied:Edm.Boolean:x",
            &object(json!({ "summary": "ok" })),
        )
        .expect_err("missing field");

        assert_eq!(error, SchemaError::MissingField("satisfied".into()));
    }

    #[test]
    fn non_numeric_integer_fails() {
        let error = build_typed_fields("count:Edm.Int64:x", &object(json!({ "count": "many" })))
            .expect_err("not numeric");

        assert!(matches!(
            error,
            SchemaError::Uncoercible { key, field_type: FieldType::Int64, .. } if key == "count"
        ));
    }

    #[test]
    fn int32_rejects_out_of_range_values() {
        let source = object(json!({ "count": 3_000_000_000_i64 }));
        assert!(build_typed_fields("count:Edm.Int32:x", &source).is_err());
        assert_eq!(
            build_typed_fields("count:Edm.Int64:x", &source).expect("int64")["count"],
            TypedValue::Int64(3_000_000_000)
        );
    }

    #[test]
    fn converts_each_supported_type() {
        let source = object(json!({
            "summary": "Customer asked about billing",
            "turns": 12.9,
            "score": "0.75",
            "satisfied": "No",
            "escalated": "Yes",
            "rating": 4
        }));
        let fields = build_typed_fields(
            "summary:Edm.String:x,turns:Edm.Int64:x,score:Edm.Double:x,satisfied:Edm.Boolean:x,escalated:Edm.Boolean:x,rating:Edm.String:x",
            &source,
        )
        .expect("typed fields");

        assert_eq!(
            fields["summary"],
            TypedValue::String("Customer asked about billing".into())
        );
        assert_eq!(fields["turns"], TypedValue::Int64(12));
        assert_eq!(fields["score"], TypedValue::Double(0.75));
        assert_eq!(fields["satisfied"], TypedValue::Boolean(true));
        assert_eq!(fields["escalated"], TypedValue::Boolean(true));
        assert_eq!(fields["rating"], TypedValue::String("4".into()));
    }

    #[test]
    fn boolean_is_a_truthy_cast() {
        for text in ["No", "false", "0", "n", " "] {
            assert_eq!(
                FieldType::Boolean.coerce("satisfied", &json!(text)),
                Ok(TypedValue::Boolean(true)),
                "{text:?}"
            );
        }
        assert_eq!(
            FieldType::Boolean.coerce("satisfied", &json!("")),
            Ok(TypedValue::Boolean(false))
        );
        assert_eq!(
            FieldType::Boolean.coerce("satisfied", &json!(0)),
            Ok(TypedValue::Boolean(false))
        );
        assert_eq!(
            FieldType::Boolean.coerce("satisfied", &json!(null)),
            Ok(TypedValue::Boolean(false))
        );
    }

    #[test]
    fn rejects_keys_reserved_by_the_update_document() {
        assert_eq!(
            parse_field_specs("summary:Edm.String:x,metadata_storage_path:Edm.String:x"),
            Err(SchemaError::ReservedKey("metadata_storage_path".into()))
        );
        assert_eq!(
            parse_field_specs("@search.action"),
            Err(SchemaError::ReservedKey("@search.action".into()))
        );
    }

    #[test]
    fn null_is_not_a_string() {
        let error = build_typed_fields("summary:Edm.String:x", &object(json!({ "summary": null })))
            .expect_err("null string");
        assert!(matches!(error, SchemaError::Uncoercible { .. }));
    }
}
