//! Raw line readers for local files and HTTP bodies

use crate::error::{Error, Result};
use crate::source::retry::RetryPolicy;
use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::debug;

/// Counts lines the way the readers split them: every `\n` terminates a
/// line, and trailing bytes without a terminator form one more.
#[derive(Debug, Default)]
pub(crate) struct LineCounter {
    lines: u64,
    open_line: bool,
}

impl LineCounter {
    pub fn feed(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if byte == b'\n' {
                self.lines += 1;
                self.open_line = false;
            } else {
                self.open_line = true;
            }
        }
    }

    pub fn finish(self) -> u64 {
        self.lines + u64::from(self.open_line)
    }
}

pub(crate) async fn count_local_lines(path: &Path) -> Result<u64> {
    let mut file = File::open(path).await?;
    let mut counter = LineCounter::default();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        counter.feed(&buf[..n]);
    }
    Ok(counter.finish())
}

pub(crate) async fn count_remote_lines(client: &Client, url: &str, retry: &RetryPolicy) -> Result<u64> {
    retry
        .run(url, move |_| async move {
            let mut response = checked(client.get(url).send().await?)?;
            let mut counter = LineCounter::default();
            while let Some(chunk) = response.chunk().await? {
                counter.feed(&chunk);
            }
            Ok::<_, Error>(counter.finish())
        })
        .await
}

fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::TransientSource(format!("HTTP status {}", status)))
    }
}

/// Strip the line terminator (`\n` or `\r\n`) in place
fn chomp(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

/// Bytes of a body being split into lines
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    /// Prefix of `bytes` already known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Remove and return the next complete line, terminator included
    fn next_line(&mut self) -> Option<Vec<u8>> {
        match self.bytes[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let end = self.scanned + pos;
                self.scanned = 0;
                Some(self.bytes.drain(..=end).collect())
            }
            None => {
                self.scanned = self.bytes.len();
                None
            }
        }
    }

    /// Everything left, as an unterminated last line
    fn take_rest(&mut self) -> Vec<u8> {
        self.scanned = 0;
        std::mem::take(&mut self.bytes)
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.scanned = 0;
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A source of raw lines, without terminators
pub(crate) enum LineSource {
    Local(BufReader<File>),
    Remote(RemoteLines),
}

impl LineSource {
    pub async fn open_local(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(LineSource::Local(BufReader::new(file)))
    }

    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        match self {
            LineSource::Local(reader) => {
                let mut line = Vec::new();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    return Ok(None);
                }
                chomp(&mut line);
                Ok(Some(line))
            }
            LineSource::Remote(remote) => remote.next_line().await,
        }
    }

    /// Byte offset just past the last line returned (remote sources only)
    pub fn byte_offset(&self) -> Option<u64> {
        match self {
            LineSource::Local(_) => None,
            LineSource::Remote(remote) => Some(remote.offset),
        }
    }
}

/// Lines pulled from an HTTP body, reconnecting with a `Range` request after
/// a failure so the transfer resumes where the last full line ended.
pub(crate) struct RemoteLines {
    client: Client,
    url: String,
    retry: RetryPolicy,
    response: Option<Response>,
    buffer: LineBuffer,
    /// End of the last line handed out
    offset: u64,
    /// Already-consumed prefix to discard when a server ignores `Range`
    skip: u64,
    failures: u32,
    finished: bool,
}

impl RemoteLines {
    pub fn new(client: Client, url: impl Into<String>, retry: RetryPolicy, offset: u64) -> Self {
        RemoteLines {
            client,
            url: url.into(),
            retry,
            response: None,
            buffer: LineBuffer::default(),
            offset,
            skip: 0,
            failures: 0,
            finished: false,
        }
    }

    async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(mut line) = self.buffer.next_line() {
                self.offset += line.len() as u64;
                chomp(&mut line);
                return Ok(Some(line));
            }

            if self.finished {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = self.buffer.take_rest();
                self.offset += line.len() as u64;
                return Ok(Some(line));
            }

            match self.pull().await {
                Ok(Some(chunk)) => self.append(&chunk),
                Ok(None) => self.finished = true,
                Err(error) => {
                    self.failures += 1;
                    let delay = self.retry.on_failure(self.failures, error, &self.url)?;
                    // Partial line bytes are dropped and re-requested from `offset`
                    self.response = None;
                    self.buffer.clear();
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn pull(&mut self) -> Result<Option<Vec<u8>>> {
        if self.response.is_none() {
            match self.connect().await? {
                Some(response) => self.response = Some(response),
                None => return Ok(None),
            }
        }

        let Some(response) = self.response.as_mut() else {
            return Ok(None);
        };

        Ok(response.chunk().await?.map(|chunk| chunk.to_vec()))
    }

    /// Open the body at `offset`. `None` means nothing remains past it.
    async fn connect(&mut self) -> Result<Option<Response>> {
        let mut request = self.client.get(&self.url);
        if self.offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", self.offset));
        }

        let response = request.send().await?;
        let status = response.status();

        if self.offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!(url = %self.url, offset = self.offset, "nothing left past resume offset");
            return Ok(None);
        }

        let response = checked(response)?;
        self.skip = if self.offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            debug!(url = %self.url, offset = self.offset, "range ignored by server, skipping consumed prefix");
            self.offset
        } else {
            0
        };

        Ok(Some(response))
    }

    fn append(&mut self, mut chunk: &[u8]) {
        if self.skip > 0 {
            let n = chunk.len().min(self.skip as usize);
            self.skip -= n as u64;
            chunk = &chunk[n..];
        }
        self.buffer.extend(chunk);
    }
}
