//! Comparison primitives over JSON values.

use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Strict equality with numeric comparison for numbers.
///
/// `1` and `1.0` are equal; `1` and `"1"` are not. Arrays and objects
/// compare element-wise with the same rule.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_cmp(x, y) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Orders two values of the same scalar kind.
///
/// Numbers compare numerically and strings lexicographically. Any other
/// pairing, including a number against a string, has no order.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_cmp(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Compares two JSON numbers exactly.
///
/// Integers are never rounded through `f64`, so the order stays transitive
/// when integers and floats are mixed.
#[must_use]
pub fn numbers_cmp(a: &Number, b: &Number) -> Option<Ordering> {
    match (as_integer(a), as_integer(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        (Some(x), None) => integer_float_cmp(x, b.as_f64()?),
        (None, Some(y)) => integer_float_cmp(y, a.as_f64()?).map(Ordering::reverse),
        (None, None) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Orders an integer in the i64/u64 range against a float.
fn integer_float_cmp(int: i128, float: f64) -> Option<Ordering> {
    const U64_END: f64 = 18_446_744_073_709_551_616.0;
    const I64_START: f64 = -9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return None;
    }
    if float >= U64_END {
        return Some(Ordering::Less);
    }
    if float < I64_START {
        return Some(Ordering::Greater);
    }
    // In range, the integral part converts to i128 exactly.
    let whole = float.trunc();
    match int.cmp(&(whole as i128)) {
        Ordering::Equal => whole.partial_cmp(&float),
        other => Some(other),
    }
}
