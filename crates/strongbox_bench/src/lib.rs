//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use serde_json::json;
use strongbox_core::{record, Record, SchemaDefinition};

const ROLES: &[&str] = &["member", "admin", "guest"];

/// Schema shared by the client benchmarks.
///
/// # Panics
///
/// Never in practice; the schema is a constant.
#[must_use]
pub fn bench_schema() -> SchemaDefinition {
    SchemaDefinition::from_value(&json!({
        "User": {
            "id": {"type": "string", "isId": true, "default": "uuid()"},
            "email": {"type": "string", "isUnique": true, "isRequired": true},
            "name": {"type": "string"},
            "age": {"type": "number"},
            "role": {"type": "string", "default": "member"}
        }
    }))
    .expect("bench schema is valid")
}

/// Generates a `User` payload with a unique email.
#[must_use]
pub fn random_user(index: usize) -> Record {
    let mut rng = rand::thread_rng();
    let name: String = (0..8)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect();
    record(json!({
        "id": format!("u{index}"),
        "email": format!("{name}{index}@example.com"),
        "name": name,
        "age": rng.gen_range(0..90),
        "role": ROLES[rng.gen_range(0..ROLES.len())],
    }))
}

/// Generates `count` users with unique ids and emails.
#[must_use]
pub fn generate_users(count: usize) -> Vec<Record> {
    (0..count).map(random_user).collect()
}
