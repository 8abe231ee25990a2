//! Core type definitions for Strongbox.

use serde_json::{Map, Value};

/// One stored document: an ordered mapping from field name to value.
///
/// Field order follows the model's declaration order for records written by
/// the mutation pipeline and is preserved through persistence.
pub type Record = Map<String, Value>;

/// Outcome of a mutation closure run against a model's working collection.
///
/// `changed` tells the cache whether the working copy differs from the
/// cached collection and therefore has to be persisted. Validation failures
/// and no-op mutations leave it `false`, so nothing is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    /// The value handed back to the caller.
    pub value: T,
    /// Whether the collection must be persisted.
    pub changed: bool,
}

impl<T> Mutation<T> {
    /// A mutation that modified the collection.
    #[must_use]
    pub fn changed(value: T) -> Self {
        Self {
            value,
            changed: true,
        }
    }

    /// A mutation that left the collection as it was.
    #[must_use]
    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            changed: false,
        }
    }
}

/// Builds a [`Record`] from a JSON object literal.
///
/// Non-object values produce an empty record.
///
/// ```rust
/// use serde_json::json;
/// use strongbox_core::record;
///
/// let r = record(json!({"email": "a@x.com", "age": 20}));
/// assert_eq!(r.len(), 2);
/// ```
#[must_use]
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_keeps_insertion_order() {
        let r = record(json!({"z": 1, "a": 2, "m": 3}));
        let keys: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn record_from_non_object_is_empty() {
        assert!(record(json!([1, 2])).is_empty());
        assert!(record(Value::Null).is_empty());
    }

    #[test]
    fn mutation_constructors() {
        assert!(Mutation::changed(1).changed);
        assert!(!Mutation::unchanged(1).changed);
    }
}
