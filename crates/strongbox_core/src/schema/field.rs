//! Field descriptors and value type checks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// JSON number (integer or float).
    Number,
    /// `true` / `false`.
    Boolean,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date, stored as a string.
    Date,
    /// Nested JSON object.
    Object,
    /// JSON array.
    Array,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Descriptor of one field of a model.
///
/// Deserializes from the schema file shape:
///
/// ```json
/// { "type": "string", "isUnique": true, "isRequired": true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldSpec {
    /// The value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether this field is the model's primary key.
    #[serde(default)]
    pub is_id: bool,
    /// Whether the field must be present (and non-null) on every record.
    #[serde(default)]
    pub is_required: bool,
    /// Whether no two records may share a non-null value.
    #[serde(default)]
    pub is_unique: bool,
    /// Value applied when a create omits the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Target model whose id this field holds.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Element descriptor for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSpec>>,
    /// Member descriptors for objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, FieldSpec>>,
}

/// How a field's default is produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault<'a> {
    /// A literal value copied into the record.
    Literal(&'a Value),
    /// `"now()"` on a date field: the current UTC time.
    Now,
    /// `"uuid()"` on a string field: a random UUID v4.
    Uuid,
    /// `"autoincrement()"` on a number field: one more than the largest
    /// existing value.
    AutoIncrement,
}

impl FieldSpec {
    /// Creates a plain optional field of the given type.
    #[must_use]
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            is_id: false,
            is_required: false,
            is_unique: false,
            default: None,
            reference: None,
            items: None,
            properties: None,
        }
    }

    /// Whether the field's values must be unique. The id field always is.
    #[must_use]
    pub fn enforces_uniqueness(&self) -> bool {
        self.is_id || self.is_unique
    }

    /// Whether the field must hold a non-null value. The id field always does.
    #[must_use]
    pub fn enforces_presence(&self) -> bool {
        self.is_id || self.is_required
    }

    /// Classifies the field's default, if any.
    #[must_use]
    pub fn default_kind(&self) -> Option<FieldDefault<'_>> {
        let value = self.default.as_ref()?;
        let kind = match (self.field_type, value.as_str()) {
            (FieldType::Date, Some("now()")) => FieldDefault::Now,
            (FieldType::String, Some("uuid()")) => FieldDefault::Uuid,
            (FieldType::Number, Some("autoincrement()")) => FieldDefault::AutoIncrement,
            _ => FieldDefault::Literal(value),
        };
        Some(kind)
    }

    /// Checks a value against this descriptor.
    ///
    /// `null` is accepted here; whether a field may be null is a presence
    /// rule checked by the caller. Nested `properties` are checked
    /// recursively, including their own `isRequired` flags.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first mismatch.
    pub fn check_value(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }

        match self.field_type {
            FieldType::String if value.is_string() => Ok(()),
            FieldType::Number if value.is_number() => Ok(()),
            FieldType::Boolean if value.is_boolean() => Ok(()),
            FieldType::Date => match value.as_str() {
                Some(text) if is_date(text) => Ok(()),
                Some(text) => Err(format!("{text:?} is not an RFC 3339 date")),
                None => Err(type_mismatch(self.field_type, value)),
            },
            FieldType::Array => {
                let Some(elements) = value.as_array() else {
                    return Err(type_mismatch(self.field_type, value));
                };
                if let Some(items) = &self.items {
                    for (index, element) in elements.iter().enumerate() {
                        items
                            .check_value(element)
                            .map_err(|e| format!("[{index}]: {e}"))?;
                    }
                }
                Ok(())
            }
            FieldType::Object => {
                let Some(members) = value.as_object() else {
                    return Err(type_mismatch(self.field_type, value));
                };
                let Some(properties) = &self.properties else {
                    return Ok(());
                };
                for key in members.keys() {
                    if !properties.contains_key(key) {
                        return Err(format!("unknown property {key:?}"));
                    }
                }
                for (name, spec) in properties {
                    match members.get(name) {
                        Some(Value::Null) | None if spec.is_required => {
                            return Err(format!("missing required property {name:?}"));
                        }
                        Some(member) => spec
                            .check_value(member)
                            .map_err(|e| format!(".{name}: {e}"))?,
                        None => {}
                    }
                }
                Ok(())
            }
            _ => Err(type_mismatch(self.field_type, value)),
        }
    }
}

fn type_mismatch(expected: FieldType, value: &Value) -> String {
    format!("expected {expected}, got {}", json_type_name(value))
}

/// Name of a JSON value's type, for messages.
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_date(text: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(text).is_ok()
        || chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}
