//! Property-based test generators using proptest.
//!
//! Provides strategies for records, filter trees and sequences of client
//! operations. Field names and values are drawn from small pools so that
//! generated filters actually hit generated records.

use proptest::prelude::*;
use serde_json::{json, Value};
use strongbox_core::query::{FieldCondition, Filter, Operator};
use strongbox_core::Record;

/// Field names used by generated records and filters.
pub const FIELDS: &[&str] = &["age", "name", "email", "role", "tags"];

/// Strategy for scalar JSON values, including `null`.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        1 => any::<bool>().prop_map(Value::Bool),
        3 => (-5i64..50).prop_map(Value::from),
        1 => (-5i64..50).prop_map(|n| Value::from(n as f64 + 0.5)),
        3 => "[a-cA-C]{0,3}".prop_map(Value::String),
    ]
}

/// Strategy for field values: scalars or short arrays of scalars.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => scalar_strategy(),
        1 => prop::collection::vec(scalar_strategy(), 0..3).prop_map(Value::Array),
    ]
}

/// Strategy for records over [`FIELDS`]; any field may be absent.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    prop::collection::btree_map(prop::sample::select(FIELDS), field_value_strategy(), 0..5)
        .prop_map(|fields| {
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect()
        })
}

/// Strategy for a single field operator.
pub fn operator_strategy() -> impl Strategy<Value = Operator> {
    let list = || prop::collection::vec(scalar_strategy(), 0..3).prop_map(Value::Array);
    prop_oneof![
        scalar_strategy().prop_map(Operator::Equals),
        scalar_strategy().prop_map(Operator::Not),
        list().prop_map(Operator::In),
        list().prop_map(Operator::NotIn),
        scalar_strategy().prop_map(Operator::Lt),
        scalar_strategy().prop_map(Operator::Lte),
        scalar_strategy().prop_map(Operator::Gt),
        scalar_strategy().prop_map(Operator::Gte),
        scalar_strategy().prop_map(Operator::Contains),
        scalar_strategy().prop_map(Operator::StartsWith),
        scalar_strategy().prop_map(Operator::EndsWith),
    ]
}

/// Strategy for a field condition, possibly case-insensitive or negated.
pub fn condition_strategy() -> impl Strategy<Value = FieldCondition> {
    let base = (prop::collection::vec(operator_strategy(), 0..3), any::<bool>())
        .prop_map(|(ops, insensitive)| FieldCondition { ops, insensitive })
        .boxed();
    prop_oneof![
        4 => base.clone(),
        1 => base.prop_map(|inner| {
            FieldCondition::new(vec![Operator::NotCondition(Box::new(inner))])
        }),
    ]
}

/// Strategy for filter trees up to a few levels deep.
pub fn filter_strategy() -> impl Strategy<Value = Filter> {
    let leaf = (prop::sample::select(FIELDS), condition_strategy())
        .prop_map(|(field, condition)| Filter::field(field, condition));
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Filter::And),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Filter::Or),
            inner.prop_map(Filter::not),
        ]
    })
}

/// Strategy for emails drawn from a small pool, so collisions are common.
pub fn email_strategy() -> impl Strategy<Value = String> {
    "[a-d]".prop_map(|local| format!("{local}@x.com"))
}

/// A client operation on the sample `User` model.
#[derive(Debug, Clone)]
pub enum UserOperation {
    /// Create a user.
    Create {
        /// Email of the new user.
        email: String,
        /// Age of the new user.
        age: i64,
    },
    /// Change the email of the user selected by email.
    Update {
        /// Email selecting the user.
        target: String,
        /// New email.
        email: String,
    },
    /// Set the email of every user at least `min_age` old.
    UpdateMany {
        /// Lower age bound.
        min_age: i64,
        /// New email.
        email: String,
    },
    /// Delete the user selected by email.
    Delete {
        /// Email selecting the user.
        target: String,
    },
}

impl UserOperation {
    /// Returns the `where` clause this operation selects with.
    #[must_use]
    pub fn filter(&self) -> Filter {
        match self {
            Self::Create { .. } => Filter::all(),
            Self::Update { target, .. } | Self::Delete { target } => {
                Filter::equals("email", target.as_str())
            }
            Self::UpdateMany { min_age, .. } => {
                Filter::field("age", FieldCondition::new(vec![Operator::Gte(json!(min_age))]))
            }
        }
    }
}

/// Strategy for generating user operations.
pub fn user_operation_strategy() -> impl Strategy<Value = UserOperation> {
    prop_oneof![
        4 => (email_strategy(), 0i64..60)
            .prop_map(|(email, age)| UserOperation::Create { email, age }),
        2 => (email_strategy(), email_strategy())
            .prop_map(|(target, email)| UserOperation::Update { target, email }),
        1 => (0i64..60, email_strategy())
            .prop_map(|(min_age, email)| UserOperation::UpdateMany { min_age, email }),
        1 => email_strategy().prop_map(|target| UserOperation::Delete { target }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<UserOperation>> {
    prop::collection::vec(user_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
