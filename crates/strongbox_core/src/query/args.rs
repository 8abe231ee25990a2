//! Argument structs, one per client operation.
//!
//! Every struct deserializes from the documented JSON shape (`where`,
//! `data`, `orderBy`, `skip`, `take`, `select`, ...), so a host can forward
//! an IPC payload straight into [`OperationArgs::from_json`].

use super::filter::Filter;
use super::order::OrderBy;
use crate::error::{CoreError, CoreResult};
use crate::schema::ModelSchema;
use crate::types::Record;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Parsing of operation arguments from their JSON form.
pub trait OperationArgs: DeserializeOwned {
    /// Deserializes the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] if the payload does not have the
    /// expected shape.
    fn from_json(value: Value) -> CoreResult<Self> {
        serde_json::from_value(value).map_err(|e| CoreError::invalid_query(e.to_string()))
    }
}

/// Field projection: `{"email": true, "age": true}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    fields: Vec<String>,
}

impl Select {
    /// Selects the given fields.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks that the selection is non-empty and names declared fields.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] for an empty selection and a
    /// validation error for an undeclared field.
    pub fn validate(&self, model: &ModelSchema) -> CoreResult<()> {
        if self.fields.is_empty() {
            return Err(CoreError::invalid_query("select must choose at least one field"));
        }
        match self.fields.iter().find(|f| !model.has_field(f)) {
            Some(field) => Err(CoreError::validation(
                model.name(),
                field,
                "cannot select a field the model does not declare",
            )),
            None => Ok(()),
        }
    }

    /// Projects a record onto the selected fields, keeping record order.
    #[must_use]
    pub fn apply(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(key, _)| self.fields.iter().any(|f| f == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<'de> Deserialize<'de> for Select {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let flags = Map::<String, Value>::deserialize(deserializer)?;
        let mut fields = Vec::with_capacity(flags.len());
        for (field, flag) in flags {
            match flag {
                Value::Bool(true) => fields.push(field),
                Value::Bool(false) => {}
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "select.{field} must be a boolean, got {other}"
                    )))
                }
            }
        }
        Ok(Self { fields })
    }
}

/// Arguments of `findMany` and `findFirst`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindManyArgs {
    /// Records must match this filter.
    #[serde(default, rename = "where")]
    pub filter: Filter,
    /// Result ordering.
    #[serde(default)]
    pub order_by: OrderBy,
    /// Number of leading results to drop.
    #[serde(default)]
    pub skip: Option<i64>,
    /// Maximum number of results.
    #[serde(default)]
    pub take: Option<i64>,
    /// Projection applied to each result.
    #[serde(default)]
    pub select: Option<Select>,
}

impl FindManyArgs {
    /// Creates arguments matching every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    /// Sets `skip`.
    #[must_use]
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets `take`.
    #[must_use]
    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn select(mut self, select: Select) -> Self {
        self.select = Some(select);
        self
    }
}

/// Arguments of `findFirst`.
pub type FindFirstArgs = FindManyArgs;

/// Arguments of `findUnique`. The filter must pin the id or a unique field.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindUniqueArgs {
    /// Equality on the id or a unique field.
    #[serde(rename = "where")]
    pub filter: Filter,
    /// Projection applied to the result.
    #[serde(default)]
    pub select: Option<Select>,
}

impl FindUniqueArgs {
    /// Creates arguments for the given filter.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            select: None,
        }
    }
}

/// Arguments of `count`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CountArgs {
    /// Records must match this filter.
    #[serde(default, rename = "where")]
    pub filter: Filter,
}

/// Arguments of `create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateArgs {
    /// The new record's fields.
    pub data: Record,
}

impl CreateArgs {
    /// Creates arguments for the given data.
    #[must_use]
    pub fn new(data: Record) -> Self {
        Self { data }
    }
}

/// Arguments of `createMany`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateManyArgs {
    /// The new records.
    pub data: Vec<Record>,
    /// Drop records that would violate uniqueness instead of failing.
    #[serde(default)]
    pub skip_duplicates: bool,
}

impl CreateManyArgs {
    /// Creates arguments for the given records.
    #[must_use]
    pub fn new(data: Vec<Record>) -> Self {
        Self {
            data,
            skip_duplicates: false,
        }
    }

    /// Sets `skipDuplicates`.
    #[must_use]
    pub fn skip_duplicates(mut self, value: bool) -> Self {
        self.skip_duplicates = value;
        self
    }
}

/// Arguments of `update`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateArgs {
    /// Equality on the id or a unique field.
    #[serde(rename = "where")]
    pub filter: Filter,
    /// Fields to overwrite, or number operators.
    pub data: Record,
}

impl UpdateArgs {
    /// Creates arguments for the given filter and patch.
    #[must_use]
    pub fn new(filter: Filter, data: Record) -> Self {
        Self { filter, data }
    }
}

/// Arguments of `updateMany`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateManyArgs {
    /// Records to update. Missing means every record.
    #[serde(default, rename = "where")]
    pub filter: Filter,
    /// Fields to overwrite, or number operators.
    pub data: Record,
}

impl UpdateManyArgs {
    /// Creates arguments for the given filter and patch.
    #[must_use]
    pub fn new(filter: Filter, data: Record) -> Self {
        Self { filter, data }
    }
}

/// Arguments of `upsert`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpsertArgs {
    /// Equality on the id or a unique field.
    #[serde(rename = "where")]
    pub filter: Filter,
    /// Record to create when nothing matches.
    pub create: Record,
    /// Patch applied when a record matches.
    pub update: Record,
}

impl UpsertArgs {
    /// Creates arguments for the given filter, create data and patch.
    #[must_use]
    pub fn new(filter: Filter, create: Record, update: Record) -> Self {
        Self {
            filter,
            create,
            update,
        }
    }
}

/// Arguments of `delete`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeleteArgs {
    /// Equality on the id or a unique field.
    #[serde(rename = "where")]
    pub filter: Filter,
}

impl DeleteArgs {
    /// Creates arguments for the given filter.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self { filter }
    }
}

/// Arguments of `deleteMany`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeleteManyArgs {
    /// Records to delete. Missing means every record.
    #[serde(default, rename = "where")]
    pub filter: Filter,
}

impl DeleteManyArgs {
    /// Creates arguments for the given filter.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self { filter }
    }
}

impl OperationArgs for FindManyArgs {}
impl OperationArgs for FindUniqueArgs {}
impl OperationArgs for CountArgs {}
impl OperationArgs for CreateArgs {}
impl OperationArgs for CreateManyArgs {}
impl OperationArgs for UpdateArgs {}
impl OperationArgs for UpdateManyArgs {}
impl OperationArgs for UpsertArgs {}
impl OperationArgs for DeleteArgs {}
impl OperationArgs for DeleteManyArgs {}
