#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What a test server sees of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// 0-based request number
    pub index: usize,
    /// Start offset of a `Range: bytes=<start>-` header
    pub range: Option<u64>,
}

pub type Handler = Arc<dyn Fn(Hit) -> Vec<u8> + Send + Sync>;

/// Minimal HTTP/1.1 responder; every connection gets one response and is closed
pub struct TestServer {
    pub url: String,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl TestServer {
    pub async fn start(handler: impl Fn(Hit) -> Vec<u8> + Send + Sync + 'static) -> Self {
        let handler: Handler = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let hits = Arc::new(Mutex::new(Vec::new()));

        let seen = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_head(&mut stream).await;
                let hit = {
                    let mut seen = seen.lock().unwrap();
                    let hit = Hit {
                        index: seen.len(),
                        range: range_start(&request),
                    };
                    seen.push(hit);
                    hit
                };

                let response = handler(hit);
                let _ = stream.write_all(&response).await;
                let _ = stream.flush().await;
                let _ = stream.shutdown().await;
            }
        });

        TestServer {
            url: format!("http://{}/data.jsonl", addr),
            hits,
        }
    }

    /// Serve `body` in full, honoring `Range` requests
    pub async fn serving(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self::start(move |hit| ranged(&body, hit.range)).await
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

async fn read_head(stream: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

fn range_start(request: &str) -> Option<u64> {
    request.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("range") {
            return None;
        }
        value.trim().strip_prefix("bytes=")?.trim_end_matches('-').parse().ok()
    })
}

pub fn response(status: &str, headers: &[(&str, String)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status).into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

pub fn ok(body: &[u8]) -> Vec<u8> {
    response("200 OK", &[("Content-Length", body.len().to_string())], body)
}

pub fn server_error() -> Vec<u8> {
    response("500 Internal Server Error", &[("Content-Length", "0".to_string())], b"")
}

/// Announce the full body length but send only the first `sent` bytes
pub fn truncated(body: &[u8], sent: usize) -> Vec<u8> {
    response(
        "200 OK",
        &[("Content-Length", body.len().to_string())],
        &body[..sent],
    )
}

/// 206 for satisfiable ranges, 416 past the end, 200 without a range
pub fn ranged(body: &[u8], range: Option<u64>) -> Vec<u8> {
    let Some(start) = range else {
        return ok(body);
    };
    let start = start as usize;
    if start >= body.len() {
        return response(
            "416 Range Not Satisfiable",
            &[
                ("Content-Range", format!("bytes */{}", body.len())),
                ("Content-Length", "0".to_string()),
            ],
            b"",
        );
    }
    let rest = &body[start..];
    response(
        "206 Partial Content",
        &[
            ("Content-Range", format!("bytes {}-{}/{}", start, body.len() - 1, body.len())),
            ("Content-Length", rest.len().to_string()),
        ],
        rest,
    )
}

/// Write `contents` to a JSON Lines file in a fresh temp dir
pub fn jsonl_file(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("data.jsonl");
    let mut file = std::fs::File::create(&path).expect("create data file");
    file.write_all(contents.as_bytes()).expect("write data file");
    (dir, path)
}

/// `{"n":1}\n{"n":2}\n...` for 1..=count
pub fn numbered_lines(count: usize) -> String {
    (1..=count).map(|n| format!("{{\"n\":{}}}\n", n)).collect()
}
