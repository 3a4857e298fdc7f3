//! Normalisation of document-store driver responses.
//!
//! The drivers return different shapes depending on the call: `select`
//! yields a bare array, `create`/`upsert` a bare object, and `query` either
//! a bare array or an array of per-statement wrappers like
//! `[{"result": [...], "status": "OK"}]`. Every repository flattens through
//! this module so the variation never leaks past the storage boundary.

use serde_json::{Map, Value};

/// A stored record as the drivers hand it back.
pub type Record = Map<String, Value>;

/// Flatten any driver response into a plain record list.
///
/// Total over all of `Value`: unrecognized or empty shapes come back as an
/// empty vec, never a panic or an error. Order is preserved.
pub fn normalize_records(value: Value) -> Vec<Record> {
    match value {
        Value::Null => Vec::new(),

        // Unwrapped single record (create / upsert)
        Value::Object(record) => vec![record],

        Value::Array(items) => {
            let mut items = items.into_iter();
            let first = match items.next() {
                Some(first) => first,
                None => return Vec::new(),
            };

            match first {
                // Statement wrapper: [{"result": ..., "status": "OK"}, ...].
                // Only the first wrapper counts; repositories issue
                // single-statement queries.
                Value::Object(mut wrapper) if wrapper.contains_key("result") => {
                    match wrapper.remove("result") {
                        Some(Value::Array(inner)) => inner
                            .into_iter()
                            .filter_map(|item| match item {
                                Value::Object(record) => Some(record),
                                _ => None,
                            })
                            .collect(),
                        Some(Value::Object(record)) => vec![record],
                        _ => Vec::new(),
                    }
                }

                // Already a plain record list (select / insert)
                Value::Object(record) => {
                    let mut records = vec![record];
                    records.extend(items.filter_map(|item| match item {
                        Value::Object(record) => Some(record),
                        _ => None,
                    }));
                    records
                }

                _ => Vec::new(),
            }
        }

        _ => Vec::new(),
    }
}

/// First record of a response, or `None`.
///
/// Used by every single-row lookup (select by id, `LIMIT 1` queries).
pub fn first_record(value: Value) -> Option<Record> {
    normalize_records(value).into_iter().next()
}

/// Normalize an `INFO FOR DB` / `INFO FOR TABLE` response into a bare map.
///
/// Drivers return either the info object directly or a wrapped
/// `[{"result": {...}}]`. Anything else comes back as an empty map.
pub fn parse_info(value: Value) -> Record {
    match value {
        Value::Array(items) => {
            let first = items.into_iter().next();
            match first {
                Some(Value::Object(mut entry)) => match entry.remove("result") {
                    Some(Value::Object(info)) => info,
                    Some(_) => Map::new(),
                    None => entry,
                },
                _ => Map::new(),
            }
        }
        Value::Object(info) => info,
        _ => Map::new(),
    }
}
