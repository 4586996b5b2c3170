//! Array unwinding
//!
//! Expands every non-empty array of a document into sibling rows, duplicating
//! the fields around it, then flattens each row with the path codec. Each
//! iteration unwinds one array field, always the most deeply nested one, so
//! arrays bubble up towards the root until the row set itself splits.

use crate::error::{Error, Result};
use crate::flatten::path::{self, PathKey};
use crate::flatten::types::FlatRecord;
use serde_json::{Map, Value};

/// Field name under which each working document is held
pub const ROOT_FIELD: &str = "$root";

/// One working document, wrapped under [`ROOT_FIELD`] so that the document
/// itself can be addressed like any nested field.
#[derive(Debug, Clone)]
struct Row(Value);

impl Row {
    fn wrap(document: Value) -> Self {
        let mut wrapper = Map::new();
        wrapper.insert(ROOT_FIELD.to_string(), document);
        Row(Value::Object(wrapper))
    }

    fn into_document(self) -> Value {
        match self.0 {
            Value::Object(mut wrapper) => wrapper.shift_remove(ROOT_FIELD).unwrap_or(Value::Null),
            other => other,
        }
    }
}

/// Flatten a document into one flat record per unwound row.
///
/// Fails with [`Error::InvalidInput`] unless `document` is an object.
pub fn flatten(document: &Value) -> Result<Vec<FlatRecord>> {
    let rows = unwind(document.clone())?;
    Ok(rows.iter().map(path::parse).collect())
}

/// Unwind a document into plain (still nested) rows, one per combination of
/// array elements.
pub fn unwind(document: Value) -> Result<Vec<Value>> {
    if !document.is_object() {
        return Err(Error::InvalidInput(format!(
            "expected a JSON object, got {}",
            kind_of(&document)
        )));
    }

    let mut rows = vec![Row::wrap(document)];

    loop {
        let row = match rows.as_mut_slice() {
            [row] => row,
            _ => break,
        };

        let Some(target) = deepest_array_path(row) else {
            break;
        };

        if target.segments().len() == 1 {
            // The document itself became an array: split the row set
            let row = rows.remove(0);
            rows = split_row(row)?;
        } else {
            expand_in_place(row, &target)?;
        }
    }

    Ok(rows.into_iter().map(Row::into_document).collect())
}

/// Pick the leaf path with the most indexed segments, truncated after its
/// last indexed segment. Ties go to the last path in enumeration order.
fn deepest_array_path(row: &Row) -> Option<PathKey> {
    let mut target = path::leaf_paths(&row.0)
        .into_iter()
        .filter(|p| p.depth() > 0)
        .max_by_key(PathKey::depth)?;
    target.truncate_after_last_indexed();
    Some(target)
}

/// Replace one row whose root holds an array with one row per element
fn split_row(row: Row) -> Result<Vec<Row>> {
    let Value::Object(mut wrapper) = row.0 else {
        return Err(Error::TraversalContract {
            path: ROOT_FIELD.to_string(),
        });
    };

    Ok(cross_merge(&mut wrapper, ROOT_FIELD)
        .into_iter()
        .map(Row)
        .collect())
}

/// Unwind the array named by the last segment of `target` inside its holder.
///
/// The holder is the field named by the second to last segment. When it
/// holds an array, each element is expanded against its own child array;
/// when it holds a single object, that object is expanded once. Either way
/// the holder field is replaced by the resulting array of merged copies.
fn expand_in_place(row: &mut Row, target: &PathKey) -> Result<()> {
    let segments = target.segments();
    let (parent_path, tail) = segments.split_at(segments.len() - 2);
    let holder_key = &tail[0].key;
    let child_key = &tail[1].key;

    let contract = || Error::TraversalContract {
        path: target.to_string(),
    };

    let parent = path::traverse_by_level_mut(&mut row.0, parent_path).ok_or_else(contract)?;
    let holder = path::child_mut(parent, holder_key).ok_or_else(contract)?;

    let expanded = match holder {
        Value::Array(elements) => unwind_elements(std::mem::take(elements), child_key),
        Value::Object(map) => cross_merge(map, child_key),
        _ => return Err(contract()),
    };

    *holder = Value::Array(expanded);
    Ok(())
}

/// Expand every element against its `child_key` array.
///
/// Elements that are arrays themselves are spliced in place, one entry per
/// position, so nested arrays unwind as alternatives rather than as sibling
/// fields. Elements without the child field (or with a null child) are
/// dropped.
fn unwind_elements(elements: Vec<Value>, child_key: &str) -> Vec<Value> {
    let mut expanded = Vec::with_capacity(elements.len());

    for element in elements {
        let mut element = match element {
            Value::Array(positions) => {
                expanded.extend(positions);
                continue;
            }
            other => other,
        };

        let Some(child) = take_child(&mut element, child_key) else {
            continue;
        };

        for entry in into_entries(child) {
            let mut merged = element.clone();
            put_child(&mut merged, child_key, entry);
            expanded.push(merged);
        }
    }

    expanded
}

/// Remove `child_key` from `map` and return one copy of the remainder per
/// entry of the removed array, each carrying that entry under `child_key`.
fn cross_merge(map: &mut Map<String, Value>, child_key: &str) -> Vec<Value> {
    let entries = map
        .shift_remove(child_key)
        .map(into_entries)
        .unwrap_or_default();

    entries
        .into_iter()
        .map(|entry| {
            let mut merged = map.clone();
            merged.insert(child_key.to_string(), entry);
            Value::Object(merged)
        })
        .collect()
}

fn into_entries(value: Value) -> Vec<Value> {
    match value {
        Value::Array(entries) => entries,
        single => vec![single],
    }
}

/// Detach a non-null child field from an object element
fn take_child(element: &mut Value, key: &str) -> Option<Value> {
    let child = element.as_object_mut()?.shift_remove(key)?;
    if child.is_null() {
        None
    } else {
        Some(child)
    }
}

fn put_child(element: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = element {
        map.insert(key.to_string(), value);
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
