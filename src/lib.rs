//! # Smelter - JSON Flattening Toolkit
//!
//! Turns nested JSON documents into flat, tabular records: arrays are
//! unwound into sibling rows and the remaining structure becomes
//! dot-notation column keys.
//!
//! ## Modules
//!
//! - **flatten**: Path codec, unwind engine and column accumulator
//! - **pipeline**: Batched streaming with progress notifications
//! - **source**: Resumable JSON Lines reader for files and HTTP(S) URLs
//! - **output**: JSON Lines writer for flat records
//!
//! ## Quick Start
//!
//! ### Single documents
//!
//! ```rust
//! use serde_json::json;
//!
//! # fn main() -> smelter::Result<()> {
//! let data = json!({
//!     "id": 1,
//!     "name": "Alice",
//!     "posts": [
//!         {"id": 10, "title": "First Post"},
//!         {"id": 11, "title": "Second Post"}
//!     ]
//! });
//!
//! let table = smelter::flatten_document(&data, true)?;
//!
//! // One row per post, parent fields repeated on each
//! assert_eq!(table.records.len(), 2);
//! assert_eq!(table.records[1]["posts.title"], "Second Post");
//!
//! // Path codec only: arrays stay indexed
//! let flat = smelter::to_dot_notation(&data);
//! assert_eq!(flat["posts[0].id"], 10);
//! # Ok(())
//! # }
//! ```
//!
//! ### Streaming
//!
//! ```rust,no_run
//! use smelter::{BatchNotification, CheckpointStore, FlattenConfig, SourceReader};
//!
//! # async fn run() {
//! let config = FlattenConfig::default().with_batch_size(500);
//! let reader = SourceReader::new(CheckpointStore::new(), &config);
//!
//! let mut notifications = smelter::flatten_source(&reader, "events.jsonl", &config);
//! while let Some(notification) = notifications.recv().await {
//!     if let BatchNotification::Failed(failure) = notification {
//!         eprintln!("stopped after {} lines: {}", failure.records_processed, failure.error);
//!     }
//! }
//! # }
//! ```

use serde_json::Value;

pub mod error;
pub mod flatten;
pub mod output;
pub mod pipeline;
pub mod source;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use flatten::{ColumnSet, FlatRecord, FlattenConfig, PathKey, Segment};
pub use output::RecordWriter;
pub use pipeline::{BatchNotification, DataTable, Notifications};
pub use source::{Checkpoint, CheckpointStore, SourceReader};

/// Flatten one document to dot-notation keys without unwinding arrays
pub fn to_dot_notation(document: &Value) -> FlatRecord {
    flatten::path::parse(document)
}

/// Unwind and flatten one document into a record set
pub fn flatten_document(document: &Value, collect_columns: bool) -> Result<DataTable> {
    pipeline::process_one(document, collect_columns)
}

/// Stream-flatten an in-memory collection of documents in batches
pub fn flatten_stream(documents: Vec<Value>, config: &FlattenConfig) -> Notifications {
    pipeline::process_stream(documents, config)
}

/// Stream-flatten a JSON Lines file or URL, resuming from `reader`'s checkpoint.
///
/// Batching and retries follow the configuration `reader` was built with;
/// only `config.collect_columns` is taken from `config`.
pub fn flatten_source(reader: &SourceReader, source: impl Into<String>, config: &FlattenConfig) -> Notifications {
    pipeline::process_source(reader, source, config)
}
