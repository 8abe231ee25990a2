//! Query evaluation: filters, ordering, pagination and operation arguments.
//!
//! Everything here is pure and operates on in-memory records. Reads run
//! as a full linear scan: filter, then sort, then paginate, then project.

mod args;
mod filter;
mod order;
mod value;

pub use args::{
    CountArgs, CreateArgs, CreateManyArgs, DeleteArgs, DeleteManyArgs, FindFirstArgs,
    FindManyArgs, FindUniqueArgs, OperationArgs, Select, UpdateArgs, UpdateManyArgs, UpsertArgs,
};
pub use filter::{FieldCondition, Filter, Operator};
pub use order::{paginate, OrderBy, SortDirection, SortKey};
pub use value::{compare_values, values_equal};

use crate::types::Record;

/// Runs a `findMany` over a collection: filter, sort, paginate, project.
#[must_use]
pub fn run_find_many(records: &[Record], args: &FindManyArgs) -> Vec<Record> {
    let mut matched: Vec<&Record> = records.iter().filter(|r| args.filter.matches(r)).collect();
    args.order_by.sort(&mut matched);
    let page = paginate(matched, args.skip, args.take);
    project(page, args.select.as_ref())
}

/// Clones records, applying an optional projection.
#[must_use]
pub fn project(records: Vec<&Record>, select: Option<&Select>) -> Vec<Record> {
    match select {
        Some(select) => records.into_iter().map(|r| select.apply(r)).collect(),
        None => records.into_iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record;
    use serde_json::json;

    #[test]
    fn filter_sort_take() {
        let records: Vec<Record> = [17, 20, 40]
            .into_iter()
            .map(|age| record(json!({"id": format!("u{age}"), "age": age})))
            .collect();

        let args = FindManyArgs::from_json(json!({
            "where": {"age": {"gte": 18}},
            "orderBy": {"age": "desc"},
            "take": 1
        }))
        .unwrap();

        let found = run_find_many(&records, &args);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["age"], json!(40));
    }

    #[test]
    fn projection() {
        let records = vec![record(json!({"id": "1", "email": "a@x.com", "age": 3}))];
        let args = FindManyArgs::new().select(Select::fields(["email"]));
        assert_eq!(run_find_many(&records, &args), vec![record(json!({"email": "a@x.com"}))]);
    }
}
