use serde_json::{Map, Value};
use std::time::Duration;

/// A flat record: dot-notation path key -> scalar value.
///
/// Values are never objects or arrays. Key order follows the order in which
/// leaves were encountered in the source document.
pub type FlatRecord = Map<String, Value>;

/// Configuration for flattening runs
#[derive(Debug, Clone)]
pub struct FlattenConfig {
    /// Number of documents per batch when streaming
    pub batch_size: usize,

    /// Maximum attempts against a remote source before giving up
    pub max_retries: u32,

    /// Whether to accumulate the union of column names across a run
    pub collect_columns: bool,

    /// Emit warnings for skipped lines (advisory; errors are always reported)
    pub logging: bool,

    /// Delay unit between retries; attempt `n` waits `n * backoff_unit`
    pub backoff_unit: Duration,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            batch_size: 10,
            max_retries: 3,
            collect_columns: false,
            logging: true,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl FlattenConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_collect_columns(mut self, collect_columns: bool) -> Self {
        self.collect_columns = collect_columns;
        self
    }

    /// Batch size clamped to at least one document
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Returns true when a value may be stored in a [`FlatRecord`]
pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}
