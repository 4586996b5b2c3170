//! Dot/bracket path keys
//!
//! Converts nested JSON into flat `path -> scalar` records and walks those
//! paths back into a nested value. A path is a dot-joined list of segments;
//! a segment may carry a trailing `[n]` when its field held an array and
//! element `n` was selected (`a.b[2].c`).

use crate::error::Error;
use crate::flatten::types::FlatRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

static INDEXED_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<key>.*)\[(?P<index>\d+)\]$").unwrap()
});

/// One step of a path: a field name, optionally indexed into an array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub key: String,
    pub index: Option<usize>,
}

impl Segment {
    pub fn field(key: impl Into<String>) -> Self {
        Segment {
            key: key.into(),
            index: None,
        }
    }

    pub fn indexed(key: impl Into<String>, index: usize) -> Self {
        Segment {
            key: key.into(),
            index: Some(index),
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.key, index),
            None => f.write_str(&self.key),
        }
    }
}

impl FromStr for Segment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::InvalidPath(s.to_string()));
        }

        match INDEXED_SEGMENT.captures(s) {
            Some(caps) => {
                let index = caps["index"]
                    .parse::<usize>()
                    .map_err(|_| Error::InvalidPath(s.to_string()))?;
                Ok(Segment::indexed(&caps["key"], index))
            }
            None => Ok(Segment::field(s)),
        }
    }
}

/// A full path through a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathKey(Vec<Segment>);

impl PathKey {
    pub fn new(segments: Vec<Segment>) -> Self {
        PathKey(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Number of bracket-indexed segments (array nesting along the path)
    pub fn depth(&self) -> usize {
        self.0.iter().filter(|s| s.is_indexed()).count()
    }

    /// Drop trailing segments after the last indexed one.
    ///
    /// `a.b[1].c.d` becomes `a.b[1]`; a path without indexed segments
    /// becomes empty.
    pub fn truncate_after_last_indexed(&mut self) {
        let keep = self
            .0
            .iter()
            .rposition(Segment::is_indexed)
            .map_or(0, |pos| pos + 1);
        self.0.truncate(keep);
    }

    fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    fn pop(&mut self) {
        self.0.pop();
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for PathKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .map(Segment::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(PathKey)
    }
}

/// Flatten a document into a single record of dot-notation keys.
///
/// Arrays contribute one indexed segment per element; empty arrays and
/// empty objects contribute nothing. The input is not modified.
pub fn parse(document: &Value) -> FlatRecord {
    let mut record = FlatRecord::new();
    walk(document, &mut PathKey::default(), &mut |path: &PathKey, leaf: &Value| {
        record.insert(path.to_string(), leaf.clone());
    });
    record
}

/// All leaf paths of a document, in enumeration order
pub fn leaf_paths(document: &Value) -> Vec<PathKey> {
    let mut paths = Vec::new();
    walk(document, &mut PathKey::default(), &mut |path: &PathKey, _: &Value| {
        paths.push(path.clone());
    });
    paths
}

fn walk(value: &Value, path: &mut PathKey, visit: &mut dyn FnMut(&PathKey, &Value)) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk_field(key, child, path, visit);
            }
        }
        Value::Array(items) => {
            // Arrays held directly by arrays: positions become plain segments
            for (position, child) in items.iter().enumerate() {
                walk_field(&position.to_string(), child, path, visit);
            }
        }
        _ => {}
    }
}

fn walk_field(key: &str, value: &Value, path: &mut PathKey, visit: &mut dyn FnMut(&PathKey, &Value)) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                path.push(Segment::indexed(key, index));
                match item {
                    Value::Object(_) | Value::Array(_) => walk(item, path, visit),
                    _ => visit(path, item),
                }
                path.pop();
            }
        }
        Value::Object(_) => {
            path.push(Segment::field(key));
            walk(value, path, visit);
            path.pop();
        }
        _ => {
            path.push(Segment::field(key));
            visit(path, value);
            path.pop();
        }
    }
}

/// Walk `root` along `segments`, returning the value reached.
///
/// Returns `None` when an intermediate value is not an object/array of the
/// shape the segment expects.
pub fn traverse_by_level<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = child(current, &segment.key)?;
        if let Some(index) = segment.index {
            current = current.as_array()?.get(index)?;
        }
    }
    Some(current)
}

/// Mutable counterpart of [`traverse_by_level`]
pub fn traverse_by_level_mut<'a>(root: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        current = child_mut(current, &segment.key)?;
        if let Some(index) = segment.index {
            current = current.as_array_mut()?.get_mut(index)?;
        }
    }
    Some(current)
}

/// Look up a field of an object, or a numeric position of an array
pub(crate) fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        _ => None,
    }
}

pub(crate) fn child_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) => items.get_mut(key.parse::<usize>().ok()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_objects() {
        let input = json!({
            "id": 1,
            "user": {"name": "Alice", "address": {"city": "Paris"}}
        });

        let record = parse(&input);

        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "user.name", "user.address.city"]);
        assert_eq!(record["user.address.city"], "Paris");
    }

    #[test]
    fn test_parse_arrays_get_indexed_segments() {
        let input = json!({
            "tags": ["rust", "json"],
            "posts": [{"id": 10}, {"id": 11, "meta": {"draft": true}}]
        });

        let record = parse(&input);

        assert_eq!(record["tags[0]"], "rust");
        assert_eq!(record["tags[1]"], "json");
        assert_eq!(record["posts[0].id"], 10);
        assert_eq!(record["posts[1].meta.draft"], true);
        assert_eq!(record.len(), 5);
    }

    #[test]
    fn test_parse_empty_containers_and_nulls() {
        let input = json!({"a": [], "b": {}, "c": null});

        let record = parse(&input);

        assert_eq!(record.len(), 1);
        assert_eq!(record["c"], Value::Null);
    }

    #[test]
    fn test_parse_nested_array_positions() {
        let input = json!({"grid": [[1, 2], [3]]});

        let record = parse(&input);

        assert_eq!(record["grid[0].0"], 1);
        assert_eq!(record["grid[0].1"], 2);
        assert_eq!(record["grid[1].0"], 3);
    }

    #[test]
    fn test_path_key_reverses_to_segments() {
        let path: PathKey = "a.b[2].c".parse().unwrap();

        assert_eq!(
            path.segments(),
            &[Segment::field("a"), Segment::indexed("b", 2), Segment::field("c")]
        );
        assert_eq!(path.depth(), 1);
        assert_eq!(path.to_string(), "a.b[2].c");
    }

    #[test]
    fn test_every_parsed_key_reverses() {
        let input = json!({
            "a": {"b": [{"c": [1, 2]}, {"c": [3]}]},
            "d": [[{"e": 1}]]
        });

        for (key, _) in parse(&input) {
            let path: PathKey = key.parse().unwrap();
            assert_eq!(path.to_string(), key);
        }
    }

    #[test]
    fn test_empty_segment_is_rejected() {
        assert!("a..b".parse::<PathKey>().is_err());
    }

    #[test]
    fn test_truncate_after_last_indexed() {
        let mut path: PathKey = "root.a[0].b[1].c.d".parse().unwrap();
        path.truncate_after_last_indexed();
        assert_eq!(path.to_string(), "root.a[0].b[1]");

        let mut plain: PathKey = "a.b".parse().unwrap();
        plain.truncate_after_last_indexed();
        assert!(plain.segments().is_empty());
    }

    #[test]
    fn test_traverse_by_level() {
        let input = json!({"a": {"b": [{"c": 1}, {"c": 2}]}, "grid": [[5, 6]]});

        let path: PathKey = "a.b[1].c".parse().unwrap();
        assert_eq!(traverse_by_level(&input, path.segments()), Some(&json!(2)));

        let nested: PathKey = "grid[0].1".parse().unwrap();
        assert_eq!(traverse_by_level(&input, nested.segments()), Some(&json!(6)));

        let missing: PathKey = "a.b[5].c".parse().unwrap();
        assert_eq!(traverse_by_level(&input, missing.segments()), None);

        let wrong_shape: PathKey = "a[0]".parse().unwrap();
        assert_eq!(traverse_by_level(&input, wrong_shape.segments()), None);
    }

    #[test]
    fn test_traverse_by_level_mut_rewrites_in_place() {
        let mut input = json!({"a": [{"b": 1}]});

        let path: PathKey = "a[0].b".parse().unwrap();
        *traverse_by_level_mut(&mut input, path.segments()).unwrap() = json!(9);

        assert_eq!(input, json!({"a": [{"b": 9}]}));
    }
}
