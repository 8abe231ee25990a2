//! Schema-enforcing create, update and delete.
//!
//! A [`MutationPipeline`] applies one operation to a model's working
//! collection: it validates, applies, and reports whether anything changed.
//! It never touches storage. The cache runs it under the model's lock and
//! persists the working copy afterwards, so an error here means no change
//! and no write.
//!
//! Rules enforced on every record the pipeline writes:
//!
//! - only declared fields, each matching its [`FieldSpec`]
//! - required fields (and the id) present and non-null
//! - no two records share a non-null value on the id or a unique field
//! - a `ref` value it sets points at an existing id
//!
//! Self references are resolved against the working collection. Ids of
//! other models are attached with
//! [`with_foreign_ids`](MutationPipeline::with_foreign_ids) by the caller,
//! which can read those collections.

use crate::cache::Snapshot;
use crate::error::{CoreError, CoreResult};
use crate::query::{values_equal, Filter};
use crate::schema::{FieldDefault, FieldSpec, FieldType, ModelSchema};
use crate::types::{Mutation, Record};
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Arithmetic update applied to a number field: `{"increment": 1}`.
#[derive(Debug, Clone, PartialEq)]
enum NumberOp {
    Increment(Number),
    Decrement(Number),
    Multiply(Number),
    Divide(Number),
    Set(Value),
}

#[derive(Debug, Clone, Copy)]
enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
}

/// Records of another model that `ref` values may point at.
#[derive(Debug, Clone)]
struct ForeignIds {
    id_field: String,
    records: Snapshot,
}

impl ForeignIds {
    fn contains(&self, value: &Value) -> bool {
        self.records
            .iter()
            .any(|r| r.get(&self.id_field).is_some_and(|id| values_equal(id, value)))
    }
}

/// Create/update/delete logic for one model.
#[derive(Debug, Clone)]
pub struct MutationPipeline {
    model: Arc<ModelSchema>,
    foreign: HashMap<String, ForeignIds>,
}

impl MutationPipeline {
    /// Creates a pipeline for a model.
    #[must_use]
    pub fn new(model: Arc<ModelSchema>) -> Self {
        Self {
            model,
            foreign: HashMap::new(),
        }
    }

    /// Attaches the records of `target`, whose id field is `id_field`, so
    /// `ref` values pointing at that model can be checked.
    #[must_use]
    pub fn with_foreign_ids(
        mut self,
        target: impl Into<String>,
        id_field: impl Into<String>,
        records: Snapshot,
    ) -> Self {
        self.foreign.insert(
            target.into(),
            ForeignIds {
                id_field: id_field.into(),
                records,
            },
        );
        self
    }

    /// Returns the model this pipeline enforces.
    #[must_use]
    pub fn model(&self) -> &ModelSchema {
        &self.model
    }

    fn name(&self) -> &str {
        self.model.name()
    }

    /// Inserts one record, filling defaults and generating the id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown, mistyped or missing required
    /// fields, and a unique constraint error for a duplicate value.
    pub fn create(&self, records: &mut Vec<Record>, data: Record) -> CoreResult<Mutation<Record>> {
        let record = self.prepare_new(records, data)?;
        self.check_unique(records, &record, None)?;
        self.check_references(records, &record, None)?;
        records.push(record.clone());
        Ok(Mutation::changed(record))
    }

    /// Inserts several records as one batch.
    ///
    /// Validation is all-or-nothing: any invalid record fails the whole
    /// batch. Duplicates, including duplicates within the batch, fail it
    /// too unless `skip_duplicates` is set, in which case they are dropped.
    /// Returns the number inserted.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create), for any record in the batch.
    pub fn create_many(
        &self,
        records: &mut Vec<Record>,
        data: Vec<Record>,
        skip_duplicates: bool,
    ) -> CoreResult<Mutation<usize>> {
        let mut inserted = 0;
        for item in data {
            let record = self.prepare_new(records, item)?;
            match self.check_unique(records, &record, None) {
                Ok(()) => {}
                Err(err @ CoreError::UniqueConstraint { .. }) if skip_duplicates => {
                    tracing::debug!(model = self.name(), error = %err, "skipping duplicate");
                    continue;
                }
                Err(err) => return Err(err),
            }
            self.check_references(records, &record, None)?;
            records.push(record);
            inserted += 1;
        }
        Ok(Mutation {
            value: inserted,
            changed: inserted > 0,
        })
    }

    /// Updates the single record selected by a unique filter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] if the filter does not pin the id
    /// or a unique field, [`CoreError::NotFound`] if nothing matches, and a
    /// validation or unique constraint error if the merged record breaks a
    /// rule.
    pub fn update(
        &self,
        records: &mut [Record],
        filter: &Filter,
        patch: &Record,
    ) -> CoreResult<Mutation<Record>> {
        self.require_unique_where(filter)?;
        self.check_patch(patch)?;

        let Some(index) = records.iter().position(|r| filter.matches(r)) else {
            return Err(CoreError::not_found(
                self.name(),
                "no record matches the update filter",
            ));
        };

        match self.revise(records, index, patch)? {
            Some(merged) => {
                records[index] = merged.clone();
                Ok(Mutation::changed(merged))
            }
            None => Ok(Mutation::unchanged(records[index].clone())),
        }
    }

    /// Applies a patch to every matching record. Returns how many records
    /// actually changed.
    ///
    /// A malformed patch fails the call. A record whose merge would break
    /// a required, unique, reference or arithmetic rule is skipped and not
    /// counted;
    /// so is a record the patch leaves unchanged.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the patch names unknown fields or
    /// holds mistyped values.
    pub fn update_many(
        &self,
        records: &mut [Record],
        filter: &Filter,
        patch: &Record,
    ) -> CoreResult<Mutation<usize>> {
        self.check_patch(patch)?;

        let matching: Vec<usize> = (0..records.len())
            .filter(|&i| filter.matches(&records[i]))
            .collect();

        let mut updated = 0;
        for index in matching {
            match self.revise(records, index, patch) {
                Ok(Some(merged)) => {
                    records[index] = merged;
                    updated += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(model = self.name(), index, error = %err, "skipping record");
                }
            }
        }

        Ok(Mutation {
            value: updated,
            changed: updated > 0,
        })
    }

    /// Updates the unique match, or creates a record when there is none.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update) or [`create`](Self::create),
    /// depending on the branch taken.
    pub fn upsert(
        &self,
        records: &mut Vec<Record>,
        filter: &Filter,
        create: Record,
        update: &Record,
    ) -> CoreResult<Mutation<Record>> {
        self.require_unique_where(filter)?;
        if records.iter().any(|r| filter.matches(r)) {
            self.update(records, filter, update)
        } else {
            self.create(records, create)
        }
    }

    /// Removes the single record selected by a unique filter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] if the filter does not pin the id
    /// or a unique field, and [`CoreError::NotFound`] if nothing matches.
    pub fn delete(
        &self,
        records: &mut Vec<Record>,
        filter: &Filter,
    ) -> CoreResult<Mutation<Record>> {
        self.require_unique_where(filter)?;
        let Some(index) = records.iter().position(|r| filter.matches(r)) else {
            return Err(CoreError::not_found(
                self.name(),
                "no record matches the delete filter",
            ));
        };
        Ok(Mutation::changed(records.remove(index)))
    }

    /// Removes every matching record. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Infallible today; returns a result for symmetry with the other verbs.
    pub fn delete_many(
        &self,
        records: &mut Vec<Record>,
        filter: &Filter,
    ) -> CoreResult<Mutation<usize>> {
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        let removed = before - records.len();
        Ok(Mutation {
            value: removed,
            changed: removed > 0,
        })
    }

    /// Merges a patch into `records[index]` and checks the result against
    /// the rest of the collection. `None` means the patch changes nothing.
    fn revise(
        &self,
        records: &[Record],
        index: usize,
        patch: &Record,
    ) -> CoreResult<Option<Record>> {
        let merged = self.merge(&records[index], patch)?;
        if merged == records[index] {
            return Ok(None);
        }
        self.check_presence(&merged)?;
        self.check_unique(records, &merged, Some(index))?;
        self.check_references(records, &merged, Some(&records[index]))?;
        Ok(Some(merged))
    }

    /// Checks that a filter pins the id or a unique field to a value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] otherwise.
    pub fn require_unique_where(&self, filter: &Filter) -> CoreResult<()> {
        let pinned = filter.required_equalities().into_iter().any(|(field, value)| {
            !value.is_null()
                && self
                    .model
                    .field(field)
                    .is_some_and(FieldSpec::enforces_uniqueness)
        });
        if pinned {
            Ok(())
        } else {
            Err(CoreError::invalid_query(format!(
                "{}: where must match the id or a unique field by equality",
                self.name()
            )))
        }
    }

    /// Builds a new record in declaration order from create data.
    fn prepare_new(&self, records: &[Record], data: Record) -> CoreResult<Record> {
        if let Some(unknown) = data.keys().find(|k| !self.model.has_field(k)) {
            return Err(CoreError::validation(self.name(), unknown, "unknown field"));
        }

        let mut record = Record::with_capacity(self.model.fields().count());
        for (name, spec) in self.model.fields() {
            let value = match data.get(name) {
                Some(value) => {
                    self.check_field_value(name, spec, value)?;
                    value.clone()
                }
                None => match spec.default_kind() {
                    Some(FieldDefault::Literal(value)) => value.clone(),
                    Some(FieldDefault::Now) => Value::String(now()),
                    Some(FieldDefault::Uuid) => Value::String(uuid::Uuid::new_v4().to_string()),
                    Some(FieldDefault::AutoIncrement) => self.next_number(records, name)?,
                    None if spec.is_id => self.generate_id(records, spec)?,
                    None if spec.is_required => {
                        return Err(CoreError::validation(
                            self.name(),
                            name,
                            "missing required field",
                        ));
                    }
                    None => continue,
                },
            };
            record.insert(name.to_string(), value);
        }

        self.check_presence(&record)?;
        Ok(record)
    }

    fn generate_id(&self, records: &[Record], spec: &FieldSpec) -> CoreResult<Value> {
        match spec.field_type {
            FieldType::Number => self.next_number(records, self.model.id_field()),
            _ => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
        }
    }

    /// One more than the largest integer held by `field`, or 1.
    fn next_number(&self, records: &[Record], field: &str) -> CoreResult<Value> {
        let max = records
            .iter()
            .filter_map(|r| r.get(field))
            .filter_map(|v| v.as_f64())
            .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))));

        let next = match max {
            None => 1,
            Some(m) if m < 1.0 => 1,
            // Largest integer at or below the maximum, plus one
            Some(m) => Self::f64_to_i64(m.floor())
                .and_then(|m| m.checked_add(1))
                .ok_or_else(|| {
                    CoreError::validation(self.name(), field, "autoincrement overflow")
                })?,
        };
        Ok(Value::from(next))
    }

    fn f64_to_i64(value: f64) -> Option<i64> {
        let truncated = value as i64;
        if value.is_finite() && (truncated as f64 - value).abs() < 1.0 {
            Some(truncated)
        } else {
            None
        }
    }

    fn check_field_value(&self, name: &str, spec: &FieldSpec, value: &Value) -> CoreResult<()> {
        if value.is_null() && spec.enforces_presence() {
            return Err(CoreError::validation(
                self.name(),
                name,
                "required field cannot be null",
            ));
        }
        spec.check_value(value)
            .map_err(|message| CoreError::validation(self.name(), name, message))
    }

    fn check_presence(&self, record: &Record) -> CoreResult<()> {
        for (name, spec) in self.model.fields() {
            if spec.enforces_presence() && record.get(name).map_or(true, Value::is_null) {
                return Err(CoreError::validation(
                    self.name(),
                    name,
                    "missing required field",
                ));
            }
        }
        Ok(())
    }

    fn check_unique(
        &self,
        records: &[Record],
        candidate: &Record,
        skip: Option<usize>,
    ) -> CoreResult<()> {
        for field in self.model.unique_fields() {
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = records.iter().enumerate().any(|(index, other)| {
                Some(index) != skip && other.get(field).is_some_and(|o| values_equal(o, value))
            });
            if taken {
                return Err(CoreError::unique_constraint(self.name(), field, value));
            }
        }
        Ok(())
    }

    /// Checks every non-null `ref` value the candidate sets. Values equal
    /// to those of `previous` are left alone.
    fn check_references(
        &self,
        records: &[Record],
        candidate: &Record,
        previous: Option<&Record>,
    ) -> CoreResult<()> {
        let id_field = self.model.id_field();
        for (field, target) in self.model.references() {
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            if previous.and_then(|p| p.get(field)) == Some(value) {
                continue;
            }
            let exists = if target == self.name() {
                candidate.get(id_field).is_some_and(|id| values_equal(id, value))
                    || records
                        .iter()
                        .any(|r| r.get(id_field).is_some_and(|id| values_equal(id, value)))
            } else {
                let Some(foreign) = self.foreign.get(target) else {
                    return Err(CoreError::internal(format!(
                        "{}.{field}: ids of {target} were not attached",
                        self.name()
                    )));
                };
                foreign.contains(value)
            };
            if !exists {
                return Err(CoreError::validation(
                    self.name(),
                    field,
                    format!("no {target} record with id {value}"),
                ));
            }
        }
        Ok(())
    }

    /// Validates the shape of an update patch independently of any record.
    fn check_patch(&self, patch: &Record) -> CoreResult<()> {
        for (name, value) in patch {
            let Some(spec) = self.model.field(name) else {
                return Err(CoreError::validation(self.name(), name, "unknown field"));
            };
            match value {
                Value::Object(op) if spec.field_type == FieldType::Number => {
                    if let NumberOp::Set(inner) = self.parse_number_op(name, op)? {
                        self.check_field_value(name, spec, &inner)?;
                    }
                }
                _ => self.check_field_value(name, spec, value)?,
            }
        }
        Ok(())
    }

    fn parse_number_op(&self, field: &str, op: &Map<String, Value>) -> CoreResult<NumberOp> {
        let invalid = |message: String| CoreError::validation(self.name(), field, message);

        let mut entries = op.iter();
        let (Some((name, operand)), None) = (entries.next(), entries.next()) else {
            return Err(invalid(
                "number update must have exactly one of increment, decrement, multiply, divide, set"
                    .to_string(),
            ));
        };

        if name == "set" {
            return Ok(NumberOp::Set(operand.clone()));
        }
        let Value::Number(n) = operand else {
            return Err(invalid(format!("{name} expects a number, got {operand}")));
        };
        match name.as_str() {
            "increment" => Ok(NumberOp::Increment(n.clone())),
            "decrement" => Ok(NumberOp::Decrement(n.clone())),
            "multiply" => Ok(NumberOp::Multiply(n.clone())),
            "divide" => Ok(NumberOp::Divide(n.clone())),
            other => Err(invalid(format!("unknown number operator {other:?}"))),
        }
    }

    /// Applies a (checked) patch to a record, keeping declaration order.
    fn merge(&self, current: &Record, patch: &Record) -> CoreResult<Record> {
        let mut merged = current.clone();
        for (name, value) in patch {
            let is_number = self
                .model
                .field(name)
                .is_some_and(|spec| spec.field_type == FieldType::Number);
            let next = match value {
                Value::Object(op) if is_number => {
                    let op = self.parse_number_op(name, op)?;
                    apply_number_op(current.get(name), &op)
                        .map_err(|message| CoreError::validation(self.name(), name, message))?
                }
                other => other.clone(),
            };
            merged.insert(name.clone(), next);
        }
        Ok(self.in_declaration_order(merged))
    }

    fn in_declaration_order(&self, mut record: Record) -> Record {
        let mut ordered = Record::with_capacity(record.len());
        for (name, _) in self.model.fields() {
            if let Some(value) = record.remove(name) {
                ordered.insert(name.to_string(), value);
            }
        }
        // Fields written outside the pipeline are kept after declared ones
        ordered.extend(record);
        ordered
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn apply_number_op(current: Option<&Value>, op: &NumberOp) -> Result<Value, String> {
    let (kind, operand) = match op {
        NumberOp::Set(value) => return Ok(value.clone()),
        NumberOp::Increment(n) => (Arithmetic::Add, n),
        NumberOp::Decrement(n) => (Arithmetic::Sub, n),
        NumberOp::Multiply(n) => (Arithmetic::Mul, n),
        NumberOp::Divide(n) => (Arithmetic::Div, n),
    };
    let Some(Value::Number(current)) = current else {
        return Err("arithmetic update on a field without a number value".to_string());
    };
    arithmetic(current, operand, kind)
}

fn arithmetic(lhs: &Number, rhs: &Number, kind: Arithmetic) -> Result<Value, String> {
    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        let exact = match kind {
            Arithmetic::Add => a.checked_add(b),
            Arithmetic::Sub => a.checked_sub(b),
            Arithmetic::Mul => a.checked_mul(b),
            Arithmetic::Div if b == 0 => return Err("division by zero".to_string()),
            Arithmetic::Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
            Arithmetic::Div => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err("operands are not representable as numbers".to_string());
    };
    let result = match kind {
        Arithmetic::Add => a + b,
        Arithmetic::Sub => a - b,
        Arithmetic::Mul => a * b,
        Arithmetic::Div if b == 0.0 => return Err("division by zero".to_string()),
        Arithmetic::Div => a / b,
    };
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| "result is not a finite number".to_string())
}
