//! Ordering and pagination of query results.

use super::value::numbers_cmp;
use crate::error::{CoreError, CoreResult};
use crate::schema::{json_type_name, ModelSchema};
use crate::types::Record;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::cell::Cell;
use std::cmp::Ordering;

/// Sort direction for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first. Absent and null values lead.
    #[default]
    Asc,
    /// Largest first. Absent and null values trail.
    Desc,
}

/// One `orderBy` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The field to sort on.
    pub field: String,
    /// The direction.
    pub direction: SortDirection,
}

/// A multi-key ordering, applied key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    keys: Vec<SortKey>,
}

impl OrderBy {
    /// Creates an empty ordering (collection order).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an ascending key.
    #[must_use]
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.then(field, SortDirection::Asc)
    }

    /// Appends a descending key.
    #[must_use]
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.then(field, SortDirection::Desc)
    }

    /// Appends a key.
    #[must_use]
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    /// Returns the keys in application order.
    #[must_use]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Returns whether no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Parses `{field: "asc"|"desc", ...}` or an array of such objects.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] for any other shape.
    pub fn parse(value: &Value) -> CoreResult<Self> {
        let mut order = Self::new();
        match value {
            Value::Null => {}
            Value::Object(_) => order.push_object(value)?,
            Value::Array(items) => {
                for item in items {
                    order.push_object(item)?;
                }
            }
            other => {
                return Err(CoreError::invalid_query(format!(
                    "orderBy must be an object or an array, got {other}"
                )))
            }
        }
        Ok(order)
    }

    fn push_object(&mut self, value: &Value) -> CoreResult<()> {
        let Some(map) = value.as_object() else {
            return Err(CoreError::invalid_query(format!(
                "orderBy entries must be objects, got {value}"
            )));
        };
        for (field, direction) in map {
            let direction = match direction.as_str() {
                Some("asc") => SortDirection::Asc,
                Some("desc") => SortDirection::Desc,
                _ => {
                    return Err(CoreError::invalid_query(format!(
                        "orderBy.{field} must be \"asc\" or \"desc\", got {direction}"
                    )))
                }
            };
            self.keys.push(SortKey {
                field: field.clone(),
                direction,
            });
        }
        Ok(())
    }

    /// Checks that every key names a field the model declares.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first undeclared field.
    pub fn validate(&self, model: &ModelSchema) -> CoreResult<()> {
        match self.keys.iter().find(|key| !model.has_field(&key.field)) {
            Some(key) => Err(CoreError::validation(
                model.name(),
                &key.field,
                "cannot sort on a field the model does not declare",
            )),
            None => Ok(()),
        }
    }

    /// Stably sorts records. Records equal on every key keep their order.
    pub fn sort(&self, records: &mut [&Record]) {
        if self.keys.is_empty() {
            return;
        }

        let warned = Cell::new(false);
        records.sort_by(|a, b| {
            for key in &self.keys {
                let ordering = sort_cmp(a.get(&key.field), b.get(&key.field), &key.field, &warned);
                let ordering = match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}

impl<'de> Deserialize<'de> for OrderBy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Rank of a value's type for ordering values of different types.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn sort_cmp(a: Option<&Value>, b: Option<&Value>, field: &str, warned: &Cell<bool>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            numbers_cmp(x, y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => {
            let (ra, rb) = (type_rank(a), type_rank(b));
            if ra != rb && ra != 0 && rb != 0 && !warned.replace(true) {
                tracing::warn!(
                    field,
                    left = a.map_or("absent", json_type_name),
                    right = b.map_or("absent", json_type_name),
                    "sorting values of different types, falling back to type rank"
                );
            }
            ra.cmp(&rb)
        }
    }
}

/// Applies `skip` then `take`.
///
/// Negative or missing values mean no skip and no limit; both clamp to
/// the available length.
#[must_use]
pub fn paginate<T>(items: Vec<T>, skip: Option<i64>, take: Option<i64>) -> Vec<T> {
    let skip = skip
        .filter(|n| *n > 0)
        .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let take = take
        .filter(|n| *n >= 0)
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    items.into_iter().skip(skip).take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDefinition;
    use crate::types::record;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().map(record).collect()
    }

    fn sorted_ids(order: &OrderBy, records: &[Record]) -> Vec<i64> {
        let mut refs: Vec<&Record> = records.iter().collect();
        order.sort(&mut refs);
        refs.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn single_key_both_directions() {
        let records = rows(vec![
            json!({"id": 1, "age": 20}),
            json!({"id": 2, "age": 40}),
            json!({"id": 3, "age": 17}),
        ]);
        assert_eq!(sorted_ids(&OrderBy::new().asc("age"), &records), vec![3, 1, 2]);
        assert_eq!(sorted_ids(&OrderBy::new().desc("age"), &records), vec![2, 1, 3]);
    }

    #[test]
    fn stable_for_ties() {
        let records = rows(vec![
            json!({"id": 1, "team": "b"}),
            json!({"id": 2, "team": "a"}),
            json!({"id": 3, "team": "b"}),
            json!({"id": 4, "team": "a"}),
        ]);
        assert_eq!(sorted_ids(&OrderBy::new().asc("team"), &records), vec![2, 4, 1, 3]);
        assert_eq!(sorted_ids(&OrderBy::new().desc("team"), &records), vec![1, 3, 2, 4]);
    }

    #[test]
    fn multiple_keys_apply_in_order() {
        let records = rows(vec![
            json!({"id": 1, "team": "a", "score": 5}),
            json!({"id": 2, "team": "b", "score": 9}),
            json!({"id": 3, "team": "a", "score": 7}),
        ]);
        let order = OrderBy::new().asc("team").desc("score");
        assert_eq!(sorted_ids(&order, &records), vec![3, 1, 2]);
    }

    #[test]
    fn absent_and_null_lead_ascending() {
        let records = rows(vec![
            json!({"id": 1, "age": 5}),
            json!({"id": 2}),
            json!({"id": 3, "age": null}),
        ]);
        assert_eq!(sorted_ids(&OrderBy::new().asc("age"), &records), vec![2, 3, 1]);
        assert_eq!(sorted_ids(&OrderBy::new().desc("age"), &records), vec![1, 2, 3]);
    }

    #[test]
    fn integers_and_floats_near_f64_precision_sort_exactly() {
        let records = rows(vec![
            json!({"id": 1, "n": 9_007_199_254_740_993_i64}),
            json!({"id": 2, "n": 9_007_199_254_740_992.0_f64}),
            json!({"id": 3, "n": 9_007_199_254_740_992_i64}),
            json!({"id": 4, "n": 9_007_199_254_740_990.0_f64}),
        ]);
        assert_eq!(sorted_ids(&OrderBy::new().asc("n"), &records), vec![4, 2, 3, 1]);
    }

    #[test]
    fn mixed_types_use_type_rank() {
        let records = rows(vec![
            json!({"id": 1, "v": "text"}),
            json!({"id": 2, "v": 3}),
            json!({"id": 3, "v": true}),
        ]);
        assert_eq!(sorted_ids(&OrderBy::new().asc("v"), &records), vec![3, 2, 1]);
    }

    #[test]
    fn parses_object_and_array_forms() {
        let from_object = OrderBy::parse(&json!({"team": "asc", "score": "desc"})).unwrap();
        let from_array = OrderBy::parse(&json!([{"team": "asc"}, {"score": "desc"}])).unwrap();
        assert_eq!(from_object, from_array);
        assert_eq!(from_object, OrderBy::new().asc("team").desc("score"));
        assert!(OrderBy::parse(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_shapes() {
        for bad in [json!("age"), json!({"age": "up"}), json!([["age", "asc"]]), json!({"age": 1})] {
            assert!(matches!(
                OrderBy::parse(&bad),
                Err(CoreError::InvalidQuery { .. })
            ));
        }
    }

    #[test]
    fn validate_rejects_undeclared_fields() {
        let schema = SchemaDefinition::from_value(&json!({
            "User": {"id": {"type": "string", "isId": true}, "age": {"type": "number"}}
        }))
        .unwrap();
        let user = schema.model("User").unwrap();

        assert!(OrderBy::new().asc("age").validate(user).is_ok());
        let err = OrderBy::new().asc("height").validate(user).unwrap_err();
        assert_eq!(err.field(), Some("height"));
    }

    #[test]
    fn paginate_clamps() {
        let items: Vec<i32> = (0..5).collect();
        assert_eq!(paginate(items.clone(), None, None), vec![0, 1, 2, 3, 4]);
        assert_eq!(paginate(items.clone(), Some(2), Some(2)), vec![2, 3]);
        assert_eq!(paginate(items.clone(), Some(10), None), Vec::<i32>::new());
        assert_eq!(paginate(items.clone(), Some(3), Some(10)), vec![3, 4]);
        assert_eq!(paginate(items.clone(), Some(-1), Some(-1)), vec![0, 1, 2, 3, 4]);
        assert_eq!(paginate(items, None, Some(0)), Vec::<i32>::new());
    }

    proptest::proptest! {
        #[test]
        fn ascending_sort_is_ordered_permutation(
            ages in proptest::collection::vec(proptest::option::of(-50i64..50), 0..20),
        ) {
            let records: Vec<Record> = ages
                .iter()
                .enumerate()
                .map(|(id, age)| match age {
                    Some(age) => record(json!({"id": id, "age": age})),
                    None => record(json!({"id": id})),
                })
                .collect();

            let ids = sorted_ids(&OrderBy::new().asc("age"), &records);
            let mut seen = ids.clone();
            seen.sort_unstable();
            proptest::prop_assert_eq!(seen, (0..records.len() as i64).collect::<Vec<_>>());

            let sorted_ages: Vec<Option<i64>> =
                ids.iter().map(|id| ages[*id as usize]).collect();
            proptest::prop_assert!(sorted_ages.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
