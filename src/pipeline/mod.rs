//! Batch streaming pipeline
//!
//! Runs the unwind engine over many documents and reports progress through
//! a [`Notifications`] stream. Batches are processed strictly one after the
//! other; the documents inside one batch are flattened concurrently on the
//! blocking pool and joined back in input order before the batch is emitted.
//!
//! ```no_run
//! use serde_json::json;
//! use smelter::flatten::FlattenConfig;
//! use smelter::pipeline::{process_stream, BatchNotification};
//!
//! # async fn run() {
//! let docs = vec![json!({"id": 1, "tags": ["a", "b"]}); 25];
//! let mut notifications = process_stream(docs, &FlattenConfig::default());
//!
//! while let Some(notification) = notifications.recv().await {
//!     match notification {
//!         BatchNotification::InProgress(p) => println!("{} rows", p.records.len()),
//!         BatchNotification::Completed(c) => println!("done: {}", c.records_processed),
//!         BatchNotification::Failed(f) => eprintln!("failed: {}", f.error),
//!     }
//! }
//! # }
//! ```

pub mod notification;

pub use notification::{BatchNotification, Completion, Failure, Notifications, Progress};

use crate::error::{Error, Result};
use crate::flatten::{self, ColumnSet, FlatRecord, FlattenConfig};
use crate::source::{SourceBatches, SourceReader};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Result of flattening a single document
#[derive(Debug, Clone, Serialize)]
pub struct DataTable {
    pub records: Vec<FlatRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_keys: Option<ColumnSet>,
    pub records_processed: u64,
    pub total_known: u64,
    pub completed: bool,
}

/// Flatten one document synchronously
pub fn process_one(document: &Value, collect_columns: bool) -> Result<DataTable> {
    let records = flatten::flatten(document)?;
    let column_keys = collect_columns.then(|| {
        let mut columns = ColumnSet::new();
        columns.observe(&records);
        columns
    });

    Ok(DataTable {
        records,
        column_keys,
        records_processed: 1,
        total_known: 1,
        completed: true,
    })
}

/// Stream-flatten an in-memory collection of documents.
///
/// Must be called from within a Tokio runtime; the work runs on a spawned
/// task and stops early if the returned [`Notifications`] is dropped.
pub fn process_stream(documents: Vec<Value>, config: &FlattenConfig) -> Notifications {
    let total = documents.len() as u64;
    let batch_size = config.effective_batch_size();
    let mut documents = documents.into_iter();
    let batches = std::iter::from_fn(move || {
        let batch: Vec<Value> = documents.by_ref().take(batch_size).collect();
        (!batch.is_empty()).then_some(batch)
    });

    stream_batches(batches, total, config.collect_columns)
}

/// Drive pre-split batches through the pipeline. The next batch is only
/// pulled while the consumer is still listening.
fn stream_batches<I>(mut batches: I, total: u64, collect_columns: bool) -> Notifications
where
    I: Iterator<Item = Vec<Value>> + Send + 'static,
{
    let (tx, notifications) = Notifications::channel();
    let mut run = Run::new(tx, total, collect_columns);

    tokio::spawn(async move {
        loop {
            if run.cancelled() {
                return;
            }
            let Some(batch) = batches.next() else {
                break;
            };

            let processed = run.processed + batch.len() as u64;
            match flatten_batch(batch).await {
                Ok(records) => {
                    if !run.progress(records, processed).await {
                        return;
                    }
                }
                Err(error) => return run.fail(error).await,
            }
        }
        run.complete().await;
    });

    notifications
}

/// Stream-flatten a line-delimited JSON source through `reader`.
///
/// `total_known` is the source's line count and `records_processed` the
/// reader's cumulative item count, so a resumed read continues from the
/// checkpointed count.
///
/// Only `config.collect_columns` is read here. Batch size, retries and
/// backoff are fixed when `reader` is built, so `config.batch_size` and
/// `config.max_retries` have no effect on this call.
pub fn process_source(reader: &SourceReader, source: impl Into<String>, config: &FlattenConfig) -> Notifications {
    let (tx, notifications) = Notifications::channel();
    let batches = reader.read_batches(source);
    let run = Run::new(tx, 0, config.collect_columns);

    tokio::spawn(drive_source(batches, run));

    notifications
}

async fn drive_source(mut batches: SourceBatches, mut run: Run) {
    loop {
        if run.cancelled() {
            return;
        }

        let batch = match batches.next_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(error) => {
                run.total = batches.total_lines();
                run.processed = batches.processed_count();
                return run.fail(error).await;
            }
        };

        run.total = batch.total_lines;
        match flatten_batch(batch.items).await {
            Ok(records) => {
                if !run.progress(records, batch.processed_count).await {
                    return;
                }
            }
            Err(error) => return run.fail(error).await,
        }
    }

    run.total = batches.total_lines();
    run.processed = batches.processed_count();
    run.complete().await;
}

/// Flatten every item of one batch on the blocking pool, keeping input order
async fn flatten_batch(items: Vec<Value>) -> Result<Vec<FlatRecord>> {
    let tasks = items
        .into_iter()
        .map(|item| tokio::task::spawn_blocking(move || flatten::flatten(&item)));

    let mut records = Vec::new();
    for result in try_join_all(tasks).await? {
        records.extend(result?);
    }
    Ok(records)
}

/// Producer side of one streaming run
struct Run {
    tx: mpsc::Sender<BatchNotification>,
    processed: u64,
    total: u64,
    columns: Option<ColumnSet>,
}

impl Run {
    fn new(tx: mpsc::Sender<BatchNotification>, total: u64, collect_columns: bool) -> Self {
        Run {
            tx,
            processed: 0,
            total,
            columns: collect_columns.then(ColumnSet::new),
        }
    }

    fn cancelled(&self) -> bool {
        if self.tx.is_closed() {
            debug!(processed = self.processed, "notification stream dropped, stopping");
            return true;
        }
        false
    }

    /// Emit one batch; false once the consumer has gone away
    async fn progress(&mut self, records: Vec<FlatRecord>, processed: u64) -> bool {
        if let Some(columns) = self.columns.as_mut() {
            columns.observe(&records);
        }
        self.processed = processed;

        let notification = BatchNotification::InProgress(Progress {
            records,
            records_processed: self.processed,
            total_known: self.total,
        });
        if self.tx.send(notification).await.is_err() {
            debug!(processed = self.processed, "notification stream dropped, stopping");
            return false;
        }
        true
    }

    async fn complete(self) {
        debug!(processed = self.processed, total = self.total, "run completed");
        let _ = self
            .tx
            .send(BatchNotification::Completed(Completion {
                column_keys: self.columns,
                records_processed: self.processed,
                total_known: self.total,
            }))
            .await;
    }

    async fn fail(self, error: Error) {
        debug!(processed = self.processed, error = %error, "run failed");
        let _ = self
            .tx
            .send(BatchNotification::Failed(Failure {
                error,
                records_processed: self.processed,
                total_known: self.total,
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_process_one() {
        let doc = json!({"user": {"name": "Alice"}, "roles": ["admin", "dev"]});
        let table = process_one(&doc, true).unwrap();

        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records_processed, 1);
        assert_eq!(table.total_known, 1);
        assert!(table.completed);

        let columns = table.column_keys.unwrap();
        assert!(columns.contains("user.name"));
        assert!(columns.contains("roles"));
    }

    #[test]
    fn test_process_one_rejects_non_objects() {
        assert!(matches!(process_one(&json!([1, 2]), false), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_batches_of_ten() {
        let docs = vec![json!({"id": 1, "name": "same"}); 42];
        let notifications = process_stream(docs, &FlattenConfig::default()).collect_all().await;

        assert_eq!(notifications.len(), 6);
        let sizes: Vec<usize> = notifications
            .iter()
            .filter_map(|n| match n {
                BatchNotification::InProgress(p) => Some(p.records.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![10, 10, 10, 10, 2]);

        let running: Vec<u64> = notifications.iter().map(|n| n.records_processed()).collect();
        assert_eq!(running, vec![10, 20, 30, 40, 42, 42]);

        match notifications.last().unwrap() {
            BatchNotification::Completed(c) => {
                assert_eq!(c.records_processed, 42);
                assert_eq!(c.total_known, 42);
                assert!(c.column_keys.is_none());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_matches_process_one() {
        let doc = json!({"order": 7, "items": [{"sku": "A"}, {"sku": "B"}]});
        let single = process_one(&doc, false).unwrap();

        let mut notifications = process_stream(vec![doc], &FlattenConfig::default());
        match notifications.recv().await {
            Some(BatchNotification::InProgress(p)) => assert_eq!(p.records, single.records),
            other => panic!("expected a batch, got {:?}", other),
        }
        assert!(notifications.recv().await.unwrap().is_completed());
        assert!(notifications.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_items_keep_input_order() {
        let docs: Vec<Value> = (0..7).map(|i| json!({"i": i})).collect();
        let config = FlattenConfig::default().with_batch_size(4);

        let mut seen = Vec::new();
        for notification in process_stream(docs, &config).collect_all().await {
            if let BatchNotification::InProgress(p) = notification {
                seen.extend(p.records.iter().map(|r| r["i"].as_i64().unwrap()));
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_failure_stops_the_stream() {
        let mut docs = vec![json!({"ok": true}); 3];
        docs.push(json!("not an object"));
        docs.extend(vec![json!({"ok": true}); 4]);
        let config = FlattenConfig::default().with_batch_size(3);

        let notifications = process_stream(docs, &config).collect_all().await;

        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].event(), "data");
        match &notifications[1] {
            BatchNotification::Failed(f) => {
                assert!(matches!(f.error, Error::InvalidInput(_)));
                assert_eq!(f.records_processed, 3);
                assert_eq!(f.total_known, 8);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collects_columns_across_batches() {
        let docs = vec![json!({"a": 1}), json!({"b": {"c": 2}}), json!({"a": 3, "d": [4]})];
        let config = FlattenConfig::default().with_batch_size(1).with_collect_columns(true);

        let notifications = process_stream(docs, &config).collect_all().await;
        match notifications.last().unwrap() {
            BatchNotification::Completed(c) => {
                let columns: Vec<&str> = c.column_keys.as_ref().unwrap().iter().collect();
                assert_eq!(columns, vec!["a", "b.c", "d"]);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input_completes() {
        let notifications = process_stream(Vec::new(), &FlattenConfig::default()).collect_all().await;

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].event(), "end");
        assert_eq!(notifications[0].records_processed(), 0);
    }

    #[tokio::test]
    async fn test_dropping_notifications_cancels() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let batches = (0..100).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![json!({"batch": i})]
        });

        let mut notifications = stream_batches(batches, 100, false);
        assert_eq!(notifications.recv().await.unwrap().event(), "data");
        drop(notifications);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_drop = pulled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One batch taken, one buffered, at most one more waiting to send
        assert!(after_drop <= 3, "pulled {} batches", after_drop);
        assert_eq!(pulled.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_listening_consumer_pulls_every_batch() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let batches = (0..12).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![json!({"batch": i})]
        });

        let notifications = stream_batches(batches, 12, false).collect_all().await;

        assert_eq!(notifications.len(), 13);
        assert_eq!(pulled.load(Ordering::SeqCst), 12);
    }
}
