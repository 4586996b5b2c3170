//! Resumable line-delimited JSON sources
//!
//! Reads JSON Lines from a local file or an HTTP(S) URL in batches. Progress
//! is checkpointed in memory after every parsed line, so a later read of the
//! same source skips what was already consumed. Malformed lines are logged
//! and skipped; remote failures are retried with a linear backoff.

pub mod checkpoint;
mod lines;
pub mod retry;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use retry::RetryPolicy;

use crate::error::{Error, Result};
use crate::flatten::types::FlattenConfig;
use lines::{LineSource, RemoteLines};
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Where a source identifier points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Local,
    Remote,
}

impl SourceKind {
    pub fn detect(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            SourceKind::Remote
        } else {
            SourceKind::Local
        }
    }
}

/// One batch of parsed items, with progress for the whole source
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub items: Vec<Value>,
    /// 1-based batch ordinal, continuing across resumed reads
    pub iteration: u64,
    /// Lines in the source, from the counting pre-pass
    pub total_lines: u64,
    /// Items parsed so far, including those from earlier reads
    pub processed_count: u64,
}

/// Opens batch readers over sources, sharing one checkpoint store
#[derive(Debug, Clone)]
pub struct SourceReader {
    store: CheckpointStore,
    client: Client,
    batch_size: usize,
    retry: RetryPolicy,
    logging: bool,
}

impl SourceReader {
    pub fn new(store: CheckpointStore, config: &FlattenConfig) -> Self {
        SourceReader {
            store,
            client: Client::new(),
            batch_size: config.effective_batch_size(),
            retry: RetryPolicy::from_config(config),
            logging: config.logging,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Start a lazy batch read of `source`.
    ///
    /// Nothing is opened until the first call to
    /// [`SourceBatches::next_batch`]. Two reads of the same source must not
    /// run at the same time.
    pub fn read_batches(&self, source: impl Into<String>) -> SourceBatches {
        let source = source.into();
        SourceBatches {
            kind: SourceKind::detect(&source),
            source,
            store: self.store.clone(),
            client: self.client.clone(),
            batch_size: self.batch_size,
            retry: self.retry,
            logging: self.logging,
            state: ReadState::Init,
            skip_through: 0,
            line_number: 0,
            processed_count: 0,
            total_lines: 0,
            iteration: 0,
            delivered: Checkpoint::default(),
        }
    }

    /// Discard the checkpoint for `source` so the next read starts over
    pub fn clear_progress(&self, source: &str) {
        self.store.clear(source);
    }
}

enum ReadState {
    /// Checkpoint not looked up, lines not counted
    Init,
    Reading(LineSource),
    /// Source exhausted, failed, or drained
    Terminal,
}

/// Pull-based batch reader over one source
pub struct SourceBatches {
    source: String,
    kind: SourceKind,
    store: CheckpointStore,
    client: Client,
    batch_size: usize,
    retry: RetryPolicy,
    logging: bool,
    state: ReadState,
    /// Lines at or below this number were consumed by an earlier read
    skip_through: u64,
    line_number: u64,
    processed_count: u64,
    total_lines: u64,
    iteration: u64,
    /// Position after the last batch handed to the consumer
    delivered: Checkpoint,
}

impl SourceBatches {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Lines counted by the pre-pass (zero before the first batch)
    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// Items parsed so far. After a failed read this is the count handed to
    /// the consumer before the failure.
    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    /// Read the next batch. `Ok(None)` once the source is exhausted; any
    /// error ends the read and rewinds the checkpoint to the end of the last
    /// batch returned, so items parsed into the lost batch are read again
    /// by the next run.
    pub async fn next_batch(&mut self) -> Result<Option<SourceBatch>> {
        let mut lines = match std::mem::replace(&mut self.state, ReadState::Terminal) {
            ReadState::Init => self.open().await?,
            ReadState::Reading(lines) => lines,
            ReadState::Terminal => return Ok(None),
        };

        let mut items = Vec::with_capacity(self.batch_size);
        while items.len() < self.batch_size {
            let raw = match lines.next_line().await {
                Ok(Some(raw)) => raw,
                Ok(None) => return Ok(self.drain(items, lines.byte_offset())),
                Err(error) => {
                    self.rewind(items.len());
                    return Err(error);
                }
            };

            self.line_number += 1;
            if self.line_number <= self.skip_through {
                continue;
            }

            if let Some(item) = self.parse_line(raw) {
                items.push(item);
                self.processed_count += 1;
                self.persist(lines.byte_offset());
            }
        }

        let byte_offset = lines.byte_offset();
        self.state = ReadState::Reading(lines);
        Ok(Some(self.hand_off(items, byte_offset)))
    }

    /// Look up the checkpoint, count lines, and open the source at its
    /// resume position.
    async fn open(&mut self) -> Result<LineSource> {
        let resume = self.store.get(&self.source).unwrap_or_default();
        self.store.save(&self.source, resume);

        self.total_lines = match self.kind {
            SourceKind::Local => lines::count_local_lines(Path::new(&self.source)).await?,
            SourceKind::Remote => lines::count_remote_lines(&self.client, &self.source, &self.retry).await?,
        };

        self.processed_count = resume.processed_count;
        self.delivered = resume;
        self.skip_through = resume.line_number;
        self.iteration = resume.processed_count / self.batch_size as u64;

        debug!(
            source = %self.source,
            total_lines = self.total_lines,
            resume_line = resume.line_number,
            "opening source"
        );

        match self.kind {
            SourceKind::Local => {
                self.line_number = 0;
                LineSource::open_local(Path::new(&self.source)).await
            }
            SourceKind::Remote => {
                let offset = resume.byte_offset.unwrap_or(0);
                // Transfer starts past the checkpointed line, so counting does too
                self.line_number = if offset > 0 { resume.line_number } else { 0 };
                Ok(LineSource::Remote(RemoteLines::new(
                    self.client.clone(),
                    self.source.clone(),
                    self.retry,
                    offset,
                )))
            }
        }
    }

    fn parse_line(&self, mut raw: Vec<u8>) -> Option<Value> {
        let start = raw.iter().position(|b| !b.is_ascii_whitespace())?;
        let end = raw.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;

        match simd_json::serde::from_slice::<Value>(&mut raw[start..end]) {
            Ok(value) => Some(value),
            Err(e) => {
                let error = Error::MalformedLine {
                    line: self.line_number,
                    message: e.to_string(),
                };
                if self.logging {
                    warn!(source = %self.source, "{}", error);
                } else {
                    debug!(source = %self.source, "{}", error);
                }
                None
            }
        }
    }

    fn persist(&self, byte_offset: Option<u64>) {
        self.store.save(
            &self.source,
            Checkpoint {
                processed_count: self.processed_count,
                line_number: self.line_number,
                byte_offset,
            },
        );
    }

    fn drain(&mut self, items: Vec<Value>, byte_offset: Option<u64>) -> Option<SourceBatch> {
        if items.is_empty() {
            debug!(source = %self.source, processed = self.processed_count, "source exhausted");
            return None;
        }
        self.persist(byte_offset);
        Some(self.hand_off(items, byte_offset))
    }

    /// Restore the checkpoint of the last delivered batch, dropping
    /// `pending` parsed items that will never reach the consumer
    fn rewind(&mut self, pending: usize) {
        debug!(
            source = %self.source,
            pending,
            line = self.delivered.line_number,
            "read failed, rewinding checkpoint"
        );
        self.processed_count = self.delivered.processed_count;
        self.line_number = self.delivered.line_number;
        self.store.save(&self.source, self.delivered);
    }

    fn hand_off(&mut self, items: Vec<Value>, byte_offset: Option<u64>) -> SourceBatch {
        self.iteration += 1;
        self.delivered = Checkpoint {
            processed_count: self.processed_count,
            line_number: self.line_number,
            byte_offset,
        };
        debug!(
            source = %self.source,
            iteration = self.iteration,
            size = items.len(),
            processed = self.processed_count,
            "batch ready"
        );
        SourceBatch {
            items,
            iteration: self.iteration,
            total_lines: self.total_lines,
            processed_count: self.processed_count,
        }
    }
}
