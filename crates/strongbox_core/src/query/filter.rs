//! Declarative `where` conditions.
//!
//! A filter is parsed once from its JSON shape into a [`Filter`] tree and
//! then evaluated against records with [`Filter::matches`]. Parsing rejects
//! structural mistakes (unknown operator names, a logical key holding a
//! scalar); evaluation never fails. An operand of the wrong type, or a
//! record value of the wrong type, is simply a non-match.
//!
//! ```rust
//! use serde_json::json;
//! use strongbox_core::query::Filter;
//! use strongbox_core::record;
//!
//! let filter = Filter::parse(&json!({
//!     "age": {"gte": 18},
//!     "OR": [{"name": {"startsWith": "A"}}, {"email": {"endsWith": "@x.com"}}]
//! }))
//! .unwrap();
//!
//! assert!(filter.matches(&record(json!({"age": 20, "name": "Ann"}))));
//! assert!(!filter.matches(&record(json!({"age": 17, "name": "Ann"}))));
//! ```

use super::value::{compare_values, values_equal};
use crate::error::{CoreError, CoreResult};
use crate::types::Record;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;

const AND: &str = "AND";
const OR: &str = "OR";
const NOT: &str = "NOT";
const MODE: &str = "mode";

/// A condition tree over records.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// True iff every child is true. `And(vec![])` matches everything.
    And(Vec<Filter>),
    /// True iff any child is true. `Or(vec![])` matches nothing.
    Or(Vec<Filter>),
    /// True iff the child is false.
    Not(Box<Filter>),
    /// A condition on one top-level field.
    Field {
        /// The field name.
        field: String,
        /// What the field's value must satisfy.
        condition: FieldCondition,
    },
}

/// Operators applied to one field, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCondition {
    /// The operators, ANDed.
    pub ops: Vec<Operator>,
    /// Case-insensitive string comparison (`mode: "insensitive"`).
    pub insensitive: bool,
}

/// One field operator and its operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Value equals the operand.
    Equals(Value),
    /// Value is absent or differs from the operand.
    Not(Value),
    /// The nested condition does not hold (`not: {contains: ..}`).
    NotCondition(Box<FieldCondition>),
    /// Value equals an element of the operand array.
    In(Value),
    /// Value is absent or equals no element of the operand array.
    NotIn(Value),
    /// Value orders before the operand.
    Lt(Value),
    /// Value orders before or equal to the operand.
    Lte(Value),
    /// Value orders after the operand.
    Gt(Value),
    /// Value orders after or equal to the operand.
    Gte(Value),
    /// String value contains the operand.
    Contains(Value),
    /// String value starts with the operand.
    StartsWith(Value),
    /// String value ends with the operand.
    EndsWith(Value),
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl Filter {
    /// A filter matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Conjunction.
    #[must_use]
    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    /// Disjunction.
    #[must_use]
    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    /// Negation.
    #[must_use]
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// A condition on one field.
    #[must_use]
    pub fn field(field: impl Into<String>, condition: FieldCondition) -> Self {
        Self::Field {
            field: field.into(),
            condition,
        }
    }

    /// Shorthand for `{field: {equals: value}}`.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, FieldCondition::from(Operator::Equals(value.into())))
    }

    /// Returns whether this filter trivially matches everything.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::And(children) if children.is_empty())
    }

    /// Parses the JSON form of a `where` argument. `null` matches everything.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] when the shape is not a filter:
    /// a non-object where clause, an unknown operator, a logical key with a
    /// scalar operand, or an unknown `mode`.
    pub fn parse(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(node) => parse_node(node),
            other => Err(CoreError::invalid_query(format!(
                "where must be an object, got {other}"
            ))),
        }
    }

    /// Evaluates the filter against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::And(children) => children.iter().all(|f| f.matches(record)),
            Self::Or(children) => children.iter().any(|f| f.matches(record)),
            Self::Not(child) => !child.matches(record),
            Self::Field { field, condition } => condition.matches(record.get(field)),
        }
    }

    /// Collects `field == value` constraints that every match must satisfy.
    ///
    /// Only conjunctive positions count: top-level field conditions and the
    /// children of top-level `AND`s. Case-insensitive conditions are left
    /// out since they do not pin an exact value.
    #[must_use]
    pub fn required_equalities(&self) -> Vec<(&str, &Value)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Self::And(children) => {
                for child in children {
                    child.collect_equalities(out);
                }
            }
            Self::Field { field, condition } if !condition.insensitive => {
                for op in &condition.ops {
                    if let Operator::Equals(value) = op {
                        out.push((field.as_str(), value));
                    }
                }
            }
            _ => {}
        }
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

impl FieldCondition {
    /// A condition with the given operators.
    #[must_use]
    pub fn new(ops: Vec<Operator>) -> Self {
        Self {
            ops,
            insensitive: false,
        }
    }

    /// Adds an operator.
    #[must_use]
    pub fn with(mut self, op: Operator) -> Self {
        self.ops.push(op);
        self
    }

    /// Switches string comparison to case-insensitive.
    #[must_use]
    pub fn insensitive(mut self) -> Self {
        self.insensitive = true;
        self
    }

    /// Evaluates against a field value; `None` means the field is absent.
    #[must_use]
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        self.matches_with(actual, self.insensitive)
    }

    fn matches_with(&self, actual: Option<&Value>, inherited: bool) -> bool {
        let insensitive = inherited || self.insensitive;
        self.ops.iter().all(|op| op.matches(actual, insensitive))
    }
}

impl From<Operator> for FieldCondition {
    fn from(op: Operator) -> Self {
        Self::new(vec![op])
    }
}

impl Operator {
    fn matches(&self, actual: Option<&Value>, insensitive: bool) -> bool {
        match self {
            Self::Not(operand) => actual.map_or(true, |a| !loose_equal(a, operand, insensitive)),
            Self::NotCondition(inner) => !inner.matches_with(actual, insensitive),
            Self::NotIn(operand) => {
                let Some(candidates) = operand.as_array() else {
                    return false;
                };
                actual.map_or(true, |a| {
                    !candidates.iter().any(|c| loose_equal(a, c, insensitive))
                })
            }
            positive => {
                let Some(actual) = actual else {
                    return false;
                };
                positive.matches_present(actual, insensitive)
            }
        }
    }

    fn matches_present(&self, actual: &Value, insensitive: bool) -> bool {
        match self {
            Self::Equals(operand) => loose_equal(actual, operand, insensitive),
            Self::In(operand) => operand
                .as_array()
                .is_some_and(|cs| cs.iter().any(|c| loose_equal(actual, c, insensitive))),
            Self::Lt(operand) => compare_values(actual, operand) == Some(Ordering::Less),
            Self::Lte(operand) => matches!(
                compare_values(actual, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(operand) => compare_values(actual, operand) == Some(Ordering::Greater),
            Self::Gte(operand) => matches!(
                compare_values(actual, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Contains(operand) => {
                string_test(actual, operand, insensitive, |s, p| s.contains(p))
            }
            Self::StartsWith(operand) => {
                string_test(actual, operand, insensitive, |s, p| s.starts_with(p))
            }
            Self::EndsWith(operand) => {
                string_test(actual, operand, insensitive, |s, p| s.ends_with(p))
            }
            Self::Not(_) | Self::NotCondition(_) | Self::NotIn(_) => {
                self.matches(Some(actual), insensitive)
            }
        }
    }
}

fn loose_equal(actual: &Value, operand: &Value, insensitive: bool) -> bool {
    match (actual, operand) {
        (Value::String(a), Value::String(b)) if insensitive => a.to_lowercase() == b.to_lowercase(),
        _ => values_equal(actual, operand),
    }
}

fn string_test(
    actual: &Value,
    operand: &Value,
    insensitive: bool,
    test: impl Fn(&str, &str) -> bool,
) -> bool {
    let (Some(s), Some(p)) = (actual.as_str(), operand.as_str()) else {
        return false;
    };
    if insensitive {
        test(&s.to_lowercase(), &p.to_lowercase())
    } else {
        test(s, p)
    }
}

fn parse_node(node: &Map<String, Value>) -> CoreResult<Filter> {
    let mut children = Vec::with_capacity(node.len());
    for (key, value) in node {
        let child = match key.as_str() {
            AND => Filter::And(parse_list(AND, value)?),
            OR => Filter::Or(parse_list(OR, value)?),
            NOT => match value {
                Value::Object(inner) => Filter::not(parse_node(inner)?),
                Value::Array(_) => Filter::not(Filter::And(parse_list(NOT, value)?)),
                other => {
                    return Err(CoreError::invalid_query(format!(
                        "NOT expects an object or an array, got {other}"
                    )))
                }
            },
            field => Filter::field(field, parse_condition(field, value)?),
        };
        children.push(child);
    }

    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Filter::And(children))
    }
}

fn parse_list(key: &str, value: &Value) -> CoreResult<Vec<Filter>> {
    match value {
        Value::Object(inner) => Ok(vec![parse_node(inner)?]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(inner) => parse_node(inner),
                other => Err(CoreError::invalid_query(format!(
                    "{key} entries must be objects, got {other}"
                ))),
            })
            .collect(),
        other => Err(CoreError::invalid_query(format!(
            "{key} expects an object or an array, got {other}"
        ))),
    }
}

fn parse_condition(field: &str, value: &Value) -> CoreResult<FieldCondition> {
    match value {
        // Object operands compare only through an explicit `equals`
        Value::Object(map) => parse_operator_map(field, map),
        other => Ok(Operator::Equals(other.clone()).into()),
    }
}

fn parse_operator_map(field: &str, map: &Map<String, Value>) -> CoreResult<FieldCondition> {
    let mut condition = FieldCondition::default();
    for (name, operand) in map {
        let op = match name.as_str() {
            "equals" => Operator::Equals(operand.clone()),
            "not" => match operand {
                Value::Object(inner) if !inner.is_empty() => {
                    Operator::NotCondition(Box::new(parse_operator_map(field, inner)?))
                }
                other => Operator::Not(other.clone()),
            },
            "in" => Operator::In(operand.clone()),
            "notIn" => Operator::NotIn(operand.clone()),
            "lt" => Operator::Lt(operand.clone()),
            "lte" => Operator::Lte(operand.clone()),
            "gt" => Operator::Gt(operand.clone()),
            "gte" => Operator::Gte(operand.clone()),
            "contains" => Operator::Contains(operand.clone()),
            "startsWith" => Operator::StartsWith(operand.clone()),
            "endsWith" => Operator::EndsWith(operand.clone()),
            MODE => {
                condition.insensitive = match operand.as_str() {
                    Some("insensitive") => true,
                    Some("default") => false,
                    _ => {
                        return Err(CoreError::invalid_query(format!(
                            "{field}: mode must be \"default\" or \"insensitive\", got {operand}"
                        )))
                    }
                };
                continue;
            }
            unknown => {
                return Err(CoreError::invalid_query(format!(
                    "{field}: unknown operator {unknown:?}"
                )))
            }
        };
        condition.ops.push(op);
    }
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record;
    use serde_json::json;

    fn parse(value: Value) -> Filter {
        Filter::parse(&value).unwrap()
    }

    fn hit(filter: Value, rec: Value) -> bool {
        parse(filter).matches(&record(rec))
    }

    #[test]
    fn shorthand_equality() {
        assert!(hit(json!({"email": "a@x.com"}), json!({"email": "a@x.com"})));
        assert!(!hit(json!({"email": "a@x.com"}), json!({"email": "b@x.com"})));
        assert!(hit(json!({"age": 20}), json!({"age": 20.0})));
    }

    #[test]
    fn equality_is_strict_about_types() {
        assert!(!hit(json!({"age": "20"}), json!({"age": 20})));
        assert!(!hit(json!({"active": 1}), json!({"active": true})));
    }

    #[test]
    fn absent_is_not_null() {
        assert!(!hit(json!({"name": null}), json!({})));
        assert!(hit(json!({"name": null}), json!({"name": null})));
        assert!(!hit(json!({"name": {"equals": null}}), json!({})));
    }

    #[test]
    fn absent_matches_only_negative_operators() {
        let empty = json!({});
        assert!(hit(json!({"age": {"not": 5}}), empty.clone()));
        assert!(hit(json!({"age": {"notIn": [1, 2]}}), empty.clone()));
        assert!(!hit(json!({"age": {"equals": 5}}), empty.clone()));
        assert!(!hit(json!({"age": {"in": [5]}}), empty.clone()));
        assert!(!hit(json!({"age": {"gt": 0}}), empty.clone()));
        assert!(!hit(json!({"age": {"lte": 0}}), empty.clone()));
        assert!(!hit(json!({"name": {"contains": ""}}), empty));
    }

    #[test]
    fn membership() {
        let rec = json!({"role": "admin"});
        assert!(hit(json!({"role": {"in": ["admin", "owner"]}}), rec.clone()));
        assert!(!hit(json!({"role": {"in": []}}), rec.clone()));
        assert!(!hit(json!({"role": {"notIn": ["admin"]}}), rec.clone()));
        assert!(hit(json!({"role": {"notIn": []}}), rec.clone()));
        // Non-array operands never match
        assert!(!hit(json!({"role": {"in": "admin"}}), rec.clone()));
        assert!(!hit(json!({"role": {"notIn": "guest"}}), rec));
    }

    #[test]
    fn ordering_operators() {
        let rec = json!({"age": 20, "name": "bob"});
        assert!(hit(json!({"age": {"gt": 18}}), rec.clone()));
        assert!(hit(json!({"age": {"gte": 20}}), rec.clone()));
        assert!(!hit(json!({"age": {"lt": 20}}), rec.clone()));
        assert!(hit(json!({"age": {"lte": 20}}), rec.clone()));
        assert!(hit(json!({"name": {"gt": "alice"}}), rec.clone()));
        // Type mismatch is a non-match in both directions
        assert!(!hit(json!({"age": {"gt": "18"}}), rec.clone()));
        assert!(!hit(json!({"age": {"lte": "18"}}), rec));
    }

    #[test]
    fn several_operators_are_anded() {
        let filter = json!({"age": {"gte": 18, "lt": 65}});
        assert!(hit(filter.clone(), json!({"age": 30})));
        assert!(!hit(filter.clone(), json!({"age": 17})));
        assert!(!hit(filter, json!({"age": 65})));
    }

    #[test]
    fn string_operators() {
        let rec = json!({"email": "Ann@Example.com"});
        assert!(hit(json!({"email": {"contains": "@Ex"}}), rec.clone()));
        assert!(hit(json!({"email": {"startsWith": "Ann"}}), rec.clone()));
        assert!(hit(json!({"email": {"endsWith": ".com"}}), rec.clone()));
        assert!(!hit(json!({"email": {"contains": "@ex"}}), rec.clone()));
        // Non-string record values and operands never match
        assert!(!hit(json!({"age": {"contains": "2"}}), json!({"age": 20})));
        assert!(!hit(json!({"email": {"contains": 1}}), rec));
    }

    #[test]
    fn insensitive_mode() {
        let rec = json!({"email": "Ann@Example.com"});
        assert!(hit(
            json!({"email": {"contains": "@example", "mode": "insensitive"}}),
            rec.clone()
        ));
        assert!(hit(
            json!({"email": {"equals": "ann@example.com", "mode": "insensitive"}}),
            rec.clone()
        ));
        assert!(hit(
            json!({"email": {"in": ["ANN@EXAMPLE.COM"], "mode": "insensitive"}}),
            rec.clone()
        ));
        assert!(!hit(
            json!({"email": {"not": {"startsWith": "ann"}, "mode": "insensitive"}}),
            rec
        ));
    }

    #[test]
    fn not_with_nested_condition() {
        let filter = json!({"name": {"not": {"contains": "x"}}});
        assert!(hit(filter.clone(), json!({"name": "abc"})));
        assert!(!hit(filter.clone(), json!({"name": "xyz"})));
        assert!(hit(filter, json!({})));
    }

    #[test]
    fn not_with_object_equality() {
        let filter = json!({"meta": {"not": {"equals": {"color": "red"}}}});
        assert!(!hit(filter.clone(), json!({"meta": {"color": "red"}})));
        assert!(hit(filter, json!({"meta": {"color": "blue"}})));
    }

    #[test]
    fn object_literals_need_explicit_equals() {
        let filter = json!({"address": {"equals": {"city": "Oslo"}}});
        assert!(hit(filter.clone(), json!({"address": {"city": "Oslo"}})));
        assert!(!hit(filter, json!({"address": {"city": "Oslo", "zip": 1}})));

        for case in [
            json!({"address": {"city": "Oslo"}}),
            json!({"age": {"greaterThan": 60}}),
            json!({"NOT": {"age": {"over": 3}}}),
            json!({"meta": {"not": {"color": "red"}}}),
        ] {
            assert!(
                matches!(Filter::parse(&case), Err(CoreError::InvalidQuery { .. })),
                "{case} should be rejected"
            );
        }
    }

    #[test]
    fn empty_operator_map_is_no_constraint() {
        assert!(hit(json!({"age": {}}), json!({})));
        assert!(hit(json!({"age": {}}), json!({"age": 3})));
    }

    #[test]
    fn logical_identities() {
        let rec = record(json!({"a": 1}));
        assert!(Filter::and(vec![]).matches(&rec));
        assert!(!Filter::or(vec![]).matches(&rec));
        assert!(parse(json!({})).matches(&rec));
        assert!(parse(Value::Null).is_match_all());
    }

    #[test]
    fn logical_combinators() {
        let filter = json!({
            "OR": [{"age": {"lt": 18}}, {"age": {"gt": 65}}],
            "NOT": {"name": "Eve"}
        });
        assert!(hit(filter.clone(), json!({"age": 10, "name": "Bob"})));
        assert!(!hit(filter.clone(), json!({"age": 10, "name": "Eve"})));
        assert!(!hit(filter, json!({"age": 30, "name": "Bob"})));
    }

    #[test]
    fn logical_keys_accept_single_objects_and_arrays() {
        assert!(hit(json!({"AND": {"a": 1}}), json!({"a": 1})));
        assert!(hit(json!({"OR": {"a": 1}}), json!({"a": 1})));
        // NOT over an array negates the conjunction
        let filter = json!({"NOT": [{"a": 1}, {"b": 2}]});
        assert!(!hit(filter.clone(), json!({"a": 1, "b": 2})));
        assert!(hit(filter, json!({"a": 1, "b": 3})));
    }

    #[test]
    fn structural_errors() {
        let cases = [
            json!(42),
            json!({"AND": 3}),
            json!({"OR": [1]}),
            json!({"NOT": "x"}),
            json!({"age": {"gte": 1, "greaterThan": 2}}),
            json!({"name": {"contains": "a", "mode": "loose"}}),
        ];
        for case in cases {
            assert!(
                matches!(Filter::parse(&case), Err(CoreError::InvalidQuery { .. })),
                "{case} should be rejected"
            );
        }
    }

    #[test]
    fn deserializes_through_serde() {
        let filter: Filter = serde_json::from_value(json!({"age": {"gte": 18}})).unwrap();
        assert!(filter.matches(&record(json!({"age": 18}))));

        let err = serde_json::from_value::<Filter>(json!({"age": {"over": 18}}));
        assert!(err.is_err());
    }

    #[test]
    fn required_equalities_ignore_disjunctions() {
        let filter = parse(json!({
            "id": "u1",
            "AND": [{"email": {"equals": "a@x.com"}}],
            "OR": [{"name": "Ann"}]
        }));
        let found = filter.required_equalities();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&("id", &json!("u1"))));
        assert!(found.contains(&("email", &json!("a@x.com"))));
    }

    #[test]
    fn builders_match_parsed_form() {
        let built = Filter::field(
            "age",
            FieldCondition::new(vec![Operator::Gte(json!(18))]).with(Operator::Lt(json!(65))),
        );
        assert_eq!(built, parse(json!({"age": {"gte": 18, "lt": 65}})));
        assert_eq!(Filter::equals("id", "u1"), parse(json!({"id": {"equals": "u1"}})));
    }
}
