//! smelter: Flatten nested JSON into tabular JSON Lines
//!
//! Usage:
//!   # Read a JSON document or array from a file, output to stdout
//!   smelter data.json
//!
//!   # Read from stdin
//!   echo '{"id": 1, "posts": [{"id": 10}, {"id": 11}]}' | smelter
//!
//!   # Stream a JSON Lines file or URL in batches, with a trailing column list
//!   smelter --ndjson --batch-size 500 --collect-columns events.jsonl
//!   smelter https://example.com/export.jsonl
//!
//!   # Dot-notation keys only, arrays stay indexed
//!   smelter --dot-notation data.json

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use smelter::source::SourceKind;
use smelter::{BatchNotification, CheckpointStore, FlattenConfig, Notifications, RecordWriter, SourceReader};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smelter")]
#[command(about = "Flatten nested JSON into tabular JSON Lines", long_about = None)]
struct Args {
    /// Input file or http(s) URL (use stdin if omitted)
    #[arg(value_name = "SOURCE")]
    input: Option<String>,

    /// Treat the input as newline-delimited JSON (one document per line)
    #[arg(long)]
    ndjson: bool,

    /// Documents per batch when streaming (default: 10)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Attempts against a remote source before giving up (default: 3)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Write a trailing {"_columns": [...]} line with every column seen
    #[arg(long, alias = "keys-as-column")]
    collect_columns: bool,

    /// Don't warn about skipped lines
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Only rewrite keys to dot notation, without unwinding arrays
    #[arg(long)]
    dot_notation: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    // Build config
    let mut config = FlattenConfig::default();
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    config.collect_columns = args.collect_columns;
    config.logging = !args.quiet;

    let stdout = std::io::stdout();
    let mut writer = RecordWriter::new(BufWriter::new(stdout.lock()));

    let streamed_source = args.input.as_deref().filter(|input| {
        args.ndjson || SourceKind::detect(input) == SourceKind::Remote
    });

    if let (Some(source), false) = (streamed_source, args.dot_notation) {
        let reader = SourceReader::new(CheckpointStore::new(), &config);
        let notifications = smelter::flatten_source(&reader, source, &config);
        drain(notifications, &mut writer).await?;
    } else {
        let content = read_input(args.input.as_deref()).await?;
        let documents = parse_documents(content, args.ndjson, config.logging)?;

        if args.dot_notation {
            let records: Vec<_> = documents.iter().map(smelter::to_dot_notation).collect();
            writer.write_records(&records)?;
        } else if let [document] = documents.as_slice() {
            let table = smelter::flatten_document(document, config.collect_columns)?;
            writer.write_records(&table.records)?;
            if let Some(columns) = &table.column_keys {
                writer.write_columns(columns)?;
            }
        } else {
            let notifications = smelter::flatten_stream(documents, &config);
            drain(notifications, &mut writer).await?;
        }
    }

    writer.flush()?;
    info!(records = writer.written(), "done");
    Ok(())
}

/// Write every batch as it arrives; a failed run becomes the exit error
async fn drain<W: Write>(mut notifications: Notifications, writer: &mut RecordWriter<W>) -> Result<()> {
    while let Some(notification) = notifications.recv().await {
        match notification {
            BatchNotification::InProgress(progress) => {
                writer.write_records(&progress.records)?;
                if progress.total_known > 0 {
                    info!(
                        processed = progress.records_processed,
                        total = progress.total_known,
                        "batch written"
                    );
                }
            }
            BatchNotification::Completed(completion) => {
                if let Some(columns) = &completion.column_keys {
                    writer.write_columns(columns)?;
                }
                info!(processed = completion.records_processed, "all batches written");
            }
            BatchNotification::Failed(failure) => {
                writer.flush()?;
                return Err(failure.error).with_context(|| {
                    format!("Stopped after {} documents", failure.records_processed)
                });
            }
        }
    }
    Ok(())
}

/// Read the whole input (a local file, a URL without --ndjson, or stdin)
async fn read_input(input: Option<&str>) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    match input {
        Some(url) if SourceKind::detect(url) == SourceKind::Remote => {
            let response = reqwest::get(url)
                .await
                .and_then(|r| r.error_for_status())
                .with_context(|| format!("Failed to fetch {}", url))?;
            content.extend_from_slice(&response.bytes().await?);
        }
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
            BufReader::new(file).read_to_end(&mut content)?;
        }
        None => {
            std::io::stdin().read_to_end(&mut content).context("Failed to read stdin")?;
        }
    }
    Ok(content)
}

/// Parse the input as one JSON value using SIMD-accelerated parsing, falling
/// back to one document per line when that fails or `ndjson` is set.
/// Top-level arrays are treated as document streams.
fn parse_documents(mut content: Vec<u8>, ndjson: bool, logging: bool) -> Result<Vec<Value>> {
    if !ndjson {
        if let Ok(value) = simd_json::serde::from_slice::<Value>(&mut content.clone()) {
            return Ok(match value {
                Value::Array(documents) => documents,
                document => vec![document],
            });
        }
    }

    let mut documents = Vec::new();
    for (index, line) in content.split_mut(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match simd_json::serde::from_slice::<Value>(line) {
            Ok(document) => documents.push(document),
            Err(e) if logging => warn!(line = index + 1, error = %e, "skipping invalid JSON line"),
            Err(_) => {}
        }
    }
    Ok(documents)
}
