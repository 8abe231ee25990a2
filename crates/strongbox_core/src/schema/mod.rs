//! Schema definitions.
//!
//! A schema maps model names to ordered field descriptors. It is loaded
//! once when a client is built and never changes afterwards. Loading is
//! fail-fast: every structural problem is reported as
//! [`CoreError::Schema`] before any data file is touched.
//!
//! ```json
//! {
//!   "User": {
//!     "id":    { "type": "string", "isId": true },
//!     "email": { "type": "string", "isUnique": true, "isRequired": true },
//!     "age":   { "type": "number" }
//!   }
//! }
//! ```

mod field;

pub use field::{json_type_name, FieldDefault, FieldSpec, FieldType};

use crate::error::{CoreError, CoreResult};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Field names reserved for filter combinators.
const RESERVED_FIELD_NAMES: [&str; 3] = ["AND", "OR", "NOT"];

/// One model: its name and its fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    name: String,
    fields: Vec<(String, FieldSpec)>,
    id_index: usize,
}

impl ModelSchema {
    /// Builds a model from ordered fields, checking the model-local rules.
    ///
    /// References to other models are checked by [`SchemaDefinition`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] if the name is not an identifier, the
    /// model has no fields, it does not have exactly one id field, or a
    /// field descriptor is inconsistent.
    pub fn new(name: impl Into<String>, fields: Vec<(String, FieldSpec)>) -> CoreResult<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(CoreError::schema(format!(
                "model name {name:?} must match [A-Za-z_][A-Za-z0-9_]*"
            )));
        }
        if fields.is_empty() {
            return Err(CoreError::schema(format!("model {name} declares no fields")));
        }

        for (index, (field_name, spec)) in fields.iter().enumerate() {
            if field_name.is_empty() || RESERVED_FIELD_NAMES.contains(&field_name.as_str()) {
                return Err(CoreError::schema(format!(
                    "{name}: {field_name:?} is not a valid field name"
                )));
            }
            if fields[..index].iter().any(|(seen, _)| seen == field_name) {
                return Err(CoreError::schema(format!(
                    "{name}.{field_name} is declared twice"
                )));
            }
            check_spec(spec, true)
                .map_err(|e| CoreError::schema(format!("{name}.{field_name}: {e}")))?;
        }

        let ids: Vec<usize> = (0..fields.len()).filter(|&i| fields[i].1.is_id).collect();
        let id_index = match ids.as_slice() {
            [index] => {
                let (id, spec) = &fields[*index];
                if !matches!(spec.field_type, FieldType::String | FieldType::Number) {
                    return Err(CoreError::schema(format!(
                        "{name}.{id}: id field must be a string or a number, not {}",
                        spec.field_type
                    )));
                }
                *index
            }
            [] => {
                return Err(CoreError::schema(format!("model {name} has no isId field")));
            }
            _ => {
                let names: Vec<&str> = ids.iter().map(|&i| fields[i].0.as_str()).collect();
                return Err(CoreError::schema(format!(
                    "model {name} has several isId fields: {}",
                    names.join(", ")
                )));
            }
        };

        Ok(Self {
            name,
            fields,
            id_index,
        })
    }

    /// Returns the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Looks up a field descriptor.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spec)| spec)
    }

    /// Returns whether the model declares `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Returns the name of the id field.
    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.fields[self.id_index].0
    }

    /// Returns the id field's descriptor.
    #[must_use]
    pub fn id_spec(&self) -> &FieldSpec {
        &self.fields[self.id_index].1
    }

    /// Returns the fields whose values must be unique, the id first.
    pub fn unique_fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id_field()).chain(
            self.fields
                .iter()
                .filter(|(_, spec)| spec.is_unique && !spec.is_id)
                .map(|(name, _)| name.as_str()),
        )
    }

    /// Returns `(field, target model)` for every `ref` field.
    pub fn references(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|(name, spec)| {
            spec.reference
                .as_deref()
                .map(|target| (name.as_str(), target))
        })
    }
}

/// The full schema: every model, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDefinition {
    models: Vec<Arc<ModelSchema>>,
}

impl SchemaDefinition {
    /// Builds a schema from models, checking cross-model references.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] on duplicate model names, an empty
    /// model list, or a `ref` that names a missing model or whose type
    /// differs from the target's id type.
    pub fn new(models: Vec<ModelSchema>) -> CoreResult<Self> {
        if models.is_empty() {
            return Err(CoreError::schema("schema defines no models"));
        }

        for (index, model) in models.iter().enumerate() {
            if models[..index].iter().any(|m| m.name == model.name) {
                return Err(CoreError::schema(format!(
                    "model {} is declared twice",
                    model.name
                )));
            }
        }

        for model in &models {
            for (field, target) in model.references() {
                let Some(target_model) = models.iter().find(|m| m.name == target) else {
                    return Err(CoreError::schema(format!(
                        "{}.{field} references unknown model {target}",
                        model.name
                    )));
                };
                let expected = target_model.id_spec().field_type;
                let actual = model.field(field).map(|spec| spec.field_type);
                if actual != Some(expected) {
                    return Err(CoreError::schema(format!(
                        "{}.{field} references {target} whose id is a {expected}",
                        model.name
                    )));
                }
            }
        }

        Ok(Self {
            models: models.into_iter().map(Arc::new).collect(),
        })
    }

    /// Parses a schema from its JSON document form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] if the document is not an object of
    /// objects, a field descriptor does not deserialize, or any rule of
    /// [`ModelSchema::new`] or [`SchemaDefinition::new`] fails.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let Some(document) = value.as_object() else {
            return Err(CoreError::schema("schema document must be a JSON object"));
        };

        let mut models = Vec::with_capacity(document.len());
        for (model_name, body) in document {
            let Some(body) = body.as_object() else {
                return Err(CoreError::schema(format!(
                    "model {model_name} must be an object of field descriptors"
                )));
            };

            let mut fields = Vec::with_capacity(body.len());
            for (field_name, raw) in body {
                let spec: FieldSpec = serde_json::from_value(raw.clone()).map_err(|e| {
                    CoreError::schema(format!("{model_name}.{field_name}: {e}"))
                })?;
                fields.push((field_name.clone(), spec));
            }
            models.push(ModelSchema::new(model_name.clone(), fields)?);
        }

        Self::new(models)
    }

    /// Parses a schema from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] on malformed JSON or an invalid schema.
    pub fn from_json_str(text: &str) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::schema(format!("schema is not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Reads and parses a schema file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::schema(format!("cannot read schema file {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loaded schema file");
        Self::from_json_str(&text)
    }

    /// Looks up a model by name.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Arc<ModelSchema>> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Looks up a model by name, failing with [`CoreError::UnknownModel`].
    ///
    /// # Errors
    ///
    /// Returns an error if the schema does not define `name`.
    pub fn require(&self, name: &str) -> CoreResult<Arc<ModelSchema>> {
        self.model(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_model(name))
    }

    /// Returns every model in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelSchema>> {
        self.models.iter()
    }
}

impl FromStr for SchemaDefinition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json_str(s)
    }
}

/// Returns whether `name` is usable as a model name (and file stem).
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_spec(spec: &FieldSpec, top_level: bool) -> Result<(), String> {
    if !top_level && (spec.is_id || spec.is_unique || spec.reference.is_some()) {
        return Err("isId, isUnique and ref are only allowed on top-level fields".into());
    }
    if spec.items.is_some() && spec.field_type != FieldType::Array {
        return Err(format!("items is only allowed on arrays, not {}", spec.field_type));
    }
    if spec.properties.is_some() && spec.field_type != FieldType::Object {
        return Err(format!(
            "properties is only allowed on objects, not {}",
            spec.field_type
        ));
    }
    if let Some(FieldDefault::Literal(value)) = spec.default_kind() {
        spec.check_value(value)
            .map_err(|e| format!("default does not match type: {e}"))?;
    }
    if let Some(items) = &spec.items {
        check_spec(items, false).map_err(|e| format!("items: {e}"))?;
    }
    if let Some(properties) = &spec.properties {
        for (name, property) in properties {
            check_spec(property, false).map_err(|e| format!("{name}: {e}"))?;
        }
    }
    Ok(())
}
