//! OpenAI-compatible chat-completions backend.
//!
//! Works against api.openai.com and any server exposing the same
//! `/chat/completions` shape (set `OPENAI_BASE_URL`). The backend performs a
//! single attempt per call; retrying transient failures is the agent's job.

use std::time::Duration;

use serde_json::{json, Value};

use crate::llms::base_llm::{BackendError, BackendErrorKind, CompletionRequest, LlmBackend};
use crate::utilities::runtime::block_on;

/// Default API root.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    api_key: Option<String>,
    base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Organization header, if any.
    pub organization: Option<String>,
}

impl OpenAiBackend {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            timeout: Duration::from_secs(120),
            organization: None,
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_ORGANIZATION`.
    pub fn from_env() -> Self {
        let mut backend = Self::new(
            std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            std::env::var("OPENAI_BASE_URL").ok().filter(|u| !u.is_empty()),
        );
        backend.organization = std::env::var("OPENAI_ORGANIZATION").ok();
        backend
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Build the JSON request body.
    pub fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let model = request
            .model
            .strip_prefix("openai/")
            .unwrap_or(&request.model);
        let mut body = json!({
            "model": model,
            "messages": request.messages,
        });
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if !request.stop.is_empty() {
            // The API accepts at most four stop sequences.
            body["stop"] = json!(request.stop.iter().take(4).collect::<Vec<_>>());
        }
        body
    }

    async fn send(&self, api_key: &str, request: &CompletionRequest) -> Result<String, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BackendError::new(BackendErrorKind::InvalidResponse, e.to_string()))?;

        let endpoint = format!("{}/chat/completions", self.api_base_url());
        let mut http = client
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&self.build_request_body(request));
        if let Some(ref org) = self.organization {
            http = http.header("OpenAI-Organization", org);
        }

        let response = http.send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::new(
                BackendErrorKind::RateLimited,
                "rate limited by the OpenAI API (429)",
            ));
        }
        let text = response.text().await.map_err(map_reqwest_error)?;
        if status.is_server_error() {
            // 5xx are treated like timeouts: worth another attempt.
            return Err(BackendError::new(
                BackendErrorKind::Timeout,
                format!("OpenAI API server error {}", status),
            ));
        }
        if !status.is_success() {
            return Err(BackendError::new(
                BackendErrorKind::InvalidResponse,
                format!(
                    "OpenAI API error ({}): {}",
                    status,
                    text.chars().take(500).collect::<String>()
                ),
            ));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            BackendError::new(
                BackendErrorKind::InvalidResponse,
                format!("failed to parse OpenAI response: {}", e),
            )
        })?;
        let content = parse_completion(&parsed)?;
        Ok(apply_stop_words(content, &request.stop).to_string())
    }
}

impl LlmBackend for OpenAiBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        log::debug!(
            "OpenAiBackend.complete: model={}, messages={}",
            request.model,
            request.messages.len()
        );
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::InvalidResponse,
                "OpenAI API key not set. Set the OPENAI_API_KEY environment variable.",
            )
        })?;
        block_on(self.send(api_key, request)).map_err(|e| {
            BackendError::new(
                BackendErrorKind::InvalidResponse,
                format!("failed to start HTTP runtime: {}", e),
            )
        })?
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(response: &Value) -> Result<&str, BackendError> {
    if let Some(usage) = response.get("usage") {
        log::debug!(
            "OpenAI token usage: prompt={}, completion={}, total={}",
            usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
            usage.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0),
            usage.get("total_tokens").and_then(Value::as_i64).unwrap_or(0),
        );
    }
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::InvalidResponse,
                "OpenAI response has no choices[0].message.content",
            )
        })
}

/// Truncate `content` at the first stop sequence.
fn apply_stop_words<'a>(content: &'a str, stop: &[String]) -> &'a str {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| content.find(s.as_str()))
        .min()
        .map_or(content, |idx| content[..idx].trim_end())
}

fn map_reqwest_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() || e.is_connect() {
        BackendError::new(BackendErrorKind::Timeout, e.to_string())
    } else {
        BackendError::new(BackendErrorKind::InvalidResponse, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llms::base_llm::LlmMessage;
    use crate::testing::StubServer;

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![LlmMessage::system("be brief"), LlmMessage::user("hi")],
            model: "openai/gpt-4o-mini".to_string(),
            temperature: Some(0.7),
            stop: vec!["\nObservation:".to_string()],
        }
    }

    #[test]
    fn test_request_body_strips_provider_prefix() {
        let backend = OpenAiBackend::new(Some("k".into()), None);
        let body = backend.build_request_body(&request());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["stop"][0], "\nObservation:");
    }

    #[test]
    fn test_other_provider_prefixes_pass_through() {
        let backend = OpenAiBackend::new(Some("k".into()), None);
        let mut req = request();
        req.model = "anthropic/claude-3-5-sonnet".to_string();
        assert_eq!(backend.build_request_body(&req)["model"], "anthropic/claude-3-5-sonnet");
    }

    fn backend_for(server: &StubServer) -> OpenAiBackend {
        OpenAiBackend::new(Some("sk-test".into()), Some(server.url.clone())).with_timeout(Duration::from_millis(300))
    }

    #[test]
    fn test_complete_against_local_server() {
        let server = StubServer::respond(
            200,
            r#"{"choices": [{"message": {"role": "assistant", "content": "Final Answer: hired"}}]}"#,
        );
        let text = backend_for(&server).complete(&request()).unwrap();
        assert_eq!(text, "Final Answer: hired");
        let raw = server.request().unwrap();
        assert!(raw.starts_with("POST /chat/completions"));
        assert!(raw.contains("\"model\":\"gpt-4o-mini\""));
    }

    #[test]
    fn test_429_is_rate_limited() {
        let server = StubServer::respond(429, r#"{"error": {"message": "slow down"}}"#);
        let err = backend_for(&server).complete(&request()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::RateLimited);
        assert!(err.is_transient());
    }

    #[test]
    fn test_server_error_is_transient_timeout() {
        let server = StubServer::respond(503, r#"{"error": "overloaded"}"#);
        let err = backend_for(&server).complete(&request()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_error_is_invalid_response() {
        let server = StubServer::respond(400, r#"{"error": {"message": "bad model"}}"#);
        let err = backend_for(&server).complete(&request()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidResponse);
        assert!(!err.is_transient());
        assert!(err.message.contains("bad model"));
    }

    #[test]
    fn test_stalled_response_times_out() {
        let server = StubServer::stall(Duration::from_secs(3));
        let err = backend_for(&server).complete(&request()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_completion() {
        let response = json!({"choices": [{"message": {"role": "assistant", "content": "Final Answer: ok"}}]});
        assert_eq!(parse_completion(&response).unwrap(), "Final Answer: ok");
        let err = parse_completion(&json!({"choices": []})).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidResponse);
    }

    #[test]
    fn test_apply_stop_words() {
        let stop = vec!["\nObservation:".to_string()];
        assert_eq!(
            apply_stop_words("Action: read_file\nAction Input: {}\nObservation: made up", &stop),
            "Action: read_file\nAction Input: {}"
        );
        assert_eq!(apply_stop_words("no stop here", &stop), "no stop here");
    }

    #[test]
    fn test_missing_api_key_fails_without_network() {
        let backend = OpenAiBackend::new(None, None);
        let err = backend.complete(&request()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidResponse);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = OpenAiBackend::new(None, Some("http://localhost:11434/v1/".into()));
        assert_eq!(backend.api_base_url(), "http://localhost:11434/v1");
    }
}
