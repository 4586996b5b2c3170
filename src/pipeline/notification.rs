use crate::error::Error;
use crate::flatten::{ColumnSet, FlatRecord};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Records from one finished batch
#[derive(Debug)]
pub struct Progress {
    pub records: Vec<FlatRecord>,
    /// Documents processed so far in this run
    pub records_processed: u64,
    pub total_known: u64,
}

/// Final summary of a successful run
#[derive(Debug)]
pub struct Completion {
    /// Union of record keys, when column collection was requested
    pub column_keys: Option<ColumnSet>,
    pub records_processed: u64,
    pub total_known: u64,
}

/// The error that ended a run, with the progress made before it
#[derive(Debug)]
pub struct Failure {
    pub error: Error,
    pub records_processed: u64,
    pub total_known: u64,
}

/// One event of a streaming run. Any number of `InProgress` events are
/// followed by exactly one `Completed` or `Failed`.
#[derive(Debug)]
pub enum BatchNotification {
    InProgress(Progress),
    Completed(Completion),
    Failed(Failure),
}

impl BatchNotification {
    /// Event name: `data`, `end` or `error`
    pub fn event(&self) -> &'static str {
        match self {
            BatchNotification::InProgress(_) => "data",
            BatchNotification::Completed(_) => "end",
            BatchNotification::Failed(_) => "error",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BatchNotification::Completed(_))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchNotification::InProgress(_))
    }

    pub fn records_processed(&self) -> u64 {
        match self {
            BatchNotification::InProgress(p) => p.records_processed,
            BatchNotification::Completed(c) => c.records_processed,
            BatchNotification::Failed(f) => f.records_processed,
        }
    }

    pub fn total_known(&self) -> u64 {
        match self {
            BatchNotification::InProgress(p) => p.total_known,
            BatchNotification::Completed(c) => c.total_known,
            BatchNotification::Failed(f) => f.total_known,
        }
    }
}

/// Receiving end of a streaming run.
///
/// Dropping it cancels the run at the next batch boundary.
#[derive(Debug)]
pub struct Notifications {
    rx: mpsc::Receiver<BatchNotification>,
}

impl Notifications {
    /// Single-slot channel: the producer waits until the previous
    /// notification has been taken.
    pub(crate) fn channel() -> (mpsc::Sender<BatchNotification>, Notifications) {
        let (tx, rx) = mpsc::channel(1);
        (tx, Notifications { rx })
    }

    pub async fn recv(&mut self) -> Option<BatchNotification> {
        self.rx.recv().await
    }

    /// Drain the stream, returning every notification in order
    pub async fn collect_all(mut self) -> Vec<BatchNotification> {
        let mut all = Vec::new();
        while let Some(notification) = self.recv().await {
            all.push(notification);
        }
        all
    }
}

impl Stream for Notifications {
    type Item = BatchNotification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
