//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::llms::base_llm::{BackendError, BackendErrorKind, CompletionRequest, LlmBackend};
use crate::tools::base_tool::{ToolAdapter, ToolError, ToolErrorKind};
use crate::utilities::clock::ManualClock;

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Backend that replays queued responses and records every request.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<String, BackendError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    advance: Option<(Arc<ManualClock>, Duration)>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Answers every request with `response`.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            fallback: Some(response.into()),
            ..Self::default()
        }
    }

    /// Queue a failure before the remaining responses.
    pub fn fail_first(self, kind: BackendErrorKind, times: usize) -> Self {
        {
            let mut queue = self.responses.lock();
            for _ in 0..times {
                queue.push_front(Err(BackendError::new(kind, "scripted failure")));
            }
        }
        self
    }

    /// Advance `clock` by `by` on every call, simulating a slow model.
    pub fn advancing(mut self, clock: Arc<ManualClock>, by: Duration) -> Self {
        self.advance = Some((clock, by));
        self
    }

    /// Block the calling thread for `delay` on every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl LlmBackend for ScriptedBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.requests.lock().push(request.clone());
        if let Some((clock, by)) = &self.advance {
            clock.advance(*by);
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => self.fallback.clone().ok_or_else(|| {
                BackendError::new(BackendErrorKind::InvalidResponse, "script exhausted")
            }),
        }
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Tool that returns a fixed output and records its arguments.
#[derive(Debug)]
pub struct RecordingTool {
    name: String,
    output: String,
    calls: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }
}

impl ToolAdapter for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed text."
    }

    fn invoke(&self, args: &Value) -> Result<String, ToolError> {
        self.calls.lock().push(args.clone());
        Ok(self.output.clone())
    }
}

/// Tool that fails a fixed number of times before succeeding.
#[derive(Debug)]
pub struct FlakyTool {
    name: String,
    output: String,
    kind: ToolErrorKind,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyTool {
    pub fn new(name: impl Into<String>, failures: usize, kind: ToolErrorKind, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            kind,
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ToolAdapter for FlakyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Fails a few times, then works."
    }

    fn invoke(&self, _args: &Value) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(ToolError::new(self.kind, "scripted tool failure"))
        } else {
            Ok(self.output.clone())
        }
    }
}

/// Tool that sleeps for real before answering.
#[derive(Debug)]
pub struct SlowTool {
    pub delay: Duration,
}

impl ToolAdapter for SlowTool {
    fn name(&self) -> &str {
        "slow_tool"
    }

    fn description(&self) -> &str {
        "Takes a long time."
    }

    fn invoke(&self, _args: &Value) -> Result<String, ToolError> {
        std::thread::sleep(self.delay);
        Ok("late".to_string())
    }
}

// ---------------------------------------------------------------------------
// StubServer
// ---------------------------------------------------------------------------

/// One-shot local HTTP server answering a single request with a canned
/// response, or holding the connection open without answering.
#[derive(Debug)]
pub struct StubServer {
    pub url: String,
    request: Arc<Mutex<Option<String>>>,
}

impl StubServer {
    /// Answer with `status` and a JSON `body`.
    pub fn respond(status: u16, body: impl Into<String>) -> Self {
        Self::start(Some((status, body.into())), Duration::ZERO)
    }

    /// Read the request, then say nothing for `hold`.
    pub fn stall(hold: Duration) -> Self {
        Self::start(None, hold)
    }

    fn start(reply: Option<(u16, String)>, hold: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let request = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&request);
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            *seen.lock() = Some(read_request(&mut stream));
            match reply {
                Some((status, body)) => {
                    let response = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes());
                }
                None => std::thread::sleep(hold),
            }
        });
        Self { url, request }
    }

    /// Raw text of the request the server received.
    pub fn request(&self) -> Option<String> {
        self.request.lock().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

/// Model response requesting `tool` with JSON `input`.
pub fn action(tool: &str, input: &str) -> String {
    format!("Thought: I should use {}\nAction: {}\nAction Input: {}", tool, tool, input)
}

/// Model response carrying a final answer.
pub fn final_answer(answer: &str) -> String {
    format!("Thought: I now know the final answer\nFinal Answer: {}", answer)
}
