//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ai_guard::clock::ManualClock;
use ai_guard::config::PromptConfig;
use ai_guard::provider::{BackendKind, ProviderSettings, Transport, TransportRequest, TransportResponse};
use ai_guard::GuardResult;

pub const VALID_QUIZ: &str = "\
What is the chemical symbol for water?
- [x] H2O
- [ ] CO2
- [ ] O2
- [ ] NaCl

Which organelle produces ATP?
- [ ] Nucleus
- [x] Mitochondrion
- [ ] Ribosome
- [ ] Golgi body";

pub fn responses_body(text: &str) -> String {
    json!({"output": [{"type": "message", "content": [{"type": "output_text", "text": text}]}]}).to_string()
}

pub fn choices_body(text: &str) -> String {
    json!({"choices": [{"message": {"role": "assistant", "content": text}}]}).to_string()
}

pub fn settings(backend: BackendKind) -> ProviderSettings {
    ProviderSettings {
        backend,
        model: "test-model".into(),
        base_url: None,
        temperature: 0.2,
        api_key: "sk-integration-secret".into(),
        signing_secret: None,
        prompt: PromptConfig::default(),
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        https_only: false,
    }
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(1_700_000_000_000)
}

/// Transport that replays canned replies in order, repeating the last one.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<TransportResponse>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn sequence(replies: Vec<(u16, String)>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|(status, body)| TransportResponse { status, body })
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn repeating(status: u16, body: impl Into<String>) -> Arc<Self> {
        Self::sequence(vec![(status, body.into())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _request: TransportRequest) -> GuardResult<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        };
        Ok(reply)
    }
}

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    /// Header names lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// Start a programmable mock backend on an ephemeral port.
///
/// Every request is captured before `f` produces the reply.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Arc<Mutex<Vec<CapturedRequest>>>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let seen = Arc::clone(&captured);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let seen = Arc::clone(&seen);
                    tokio::spawn(async move {
                        if let Some(request) = read_request(&mut socket).await {
                            seen.lock().unwrap().push(request);
                        }
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            401 => "401 Unauthorized",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, captured)
}
