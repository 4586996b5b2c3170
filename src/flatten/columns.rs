use crate::flatten::types::FlatRecord;
use serde::Serialize;
use std::collections::BTreeSet;

/// Union of column names observed across a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnSet(BTreeSet<String>);

impl ColumnSet {
    pub fn new() -> Self {
        ColumnSet::default()
    }

    /// Merge the keys of every record into the set
    pub fn observe(&mut self, records: &[FlatRecord]) {
        for record in records {
            for key in record.keys() {
                if !self.0.contains(key) {
                    self.0.insert(key.clone());
                }
            }
        }
    }

    pub fn insert(&mut self, column: impl Into<String>) -> bool {
        self.0.insert(column.into())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl IntoIterator for ColumnSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Insert all keys of `records` into `columns`
pub fn observe(columns: &mut ColumnSet, records: &[FlatRecord]) {
    columns.observe(records);
}
