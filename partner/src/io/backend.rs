//! Text-generation backend client with bounded retries.
//!
//! The [`Backend`] trait is what the session talks to. [`BackendClient`]
//! implements it on top of a [`Transport`] (HTTP in production, scripted in
//! tests) and owns the retry policy:
//!
//! - timeout: fixed delay, then retry;
//! - connection failure or any other transport failure: exponential backoff;
//! - a reply without a `response` text field: returned at once as
//!   [`ErrorKind::MalformedResponse`], never retried.
//!
//! Failures are values, never panics: callers branch on [`BackendError::kind`].

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::config::SessionConfig;

/// Classification of a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectionFailed,
    Timeout,
    MalformedResponse,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::ConnectionFailed => "connection failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::Other => "backend error",
        };
        f.write_str(label)
    }
}

/// Tagged failure returned across the backend boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
    /// Attempts made before giving up.
    pub attempts: u32,
}

/// Failure of a single attempt at the wire level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    /// The server answered successfully but the body was not JSON.
    #[error("response body is not JSON: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Connect(_) => ErrorKind::ConnectionFailed,
            TransportError::Decode(_) => ErrorKind::MalformedResponse,
            TransportError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Sampling options sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    /// Upper bound on generated tokens.
    pub num_predict: u32,
    pub stop: Vec<String>,
}

/// Body of a non-streaming generate request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: GenerateOptions,
}

/// One request/response exchange with the backend server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request` and return the decoded JSON body of a successful response.
    async fn post(&self, request: &GenerateRequest) -> Result<Value, TransportError>;
}

/// What the session needs from a backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send a full prompt and return the reply text, trimmed.
    async fn call(&self, prompt: &str) -> Result<String, BackendError>;
}

/// HTTP transport for Ollama-style `/api/generate` endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Build a transport whose every request is bounded by `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &GenerateRequest) -> Result<Value, TransportError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "(no body)".to_string());
            return Err(TransportError::Other(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let body = response.text().await.map_err(classify)?;
        serde_json::from_str(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

/// Attempt budget and waits between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout_delay: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            max_attempts: cfg.max_retries,
            timeout_delay: Duration::from_millis(cfg.timeout_retry_delay_ms),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
        }
    }

    /// Policy with no waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            timeout_delay: Duration::ZERO,
            backoff_base: Duration::ZERO,
        }
    }

    /// Wait before the attempt after `attempt` (0-based) failed with `kind`.
    pub fn delay_after(&self, kind: ErrorKind, attempt: u32) -> Duration {
        match kind {
            ErrorKind::Timeout => self.timeout_delay,
            ErrorKind::ConnectionFailed | ErrorKind::Other => self
                .backoff_base
                .saturating_mul(2u32.saturating_pow(attempt)),
            ErrorKind::MalformedResponse => Duration::ZERO,
        }
    }
}

/// Backend client: request construction plus the retry loop.
#[derive(Debug, Clone)]
pub struct BackendClient<T> {
    transport: T,
    model: String,
    endpoint: String,
    options: GenerateOptions,
    policy: RetryPolicy,
}

impl BackendClient<HttpTransport> {
    /// Production client talking HTTP to `cfg.endpoint`.
    pub fn http(cfg: &SessionConfig) -> Result<Self> {
        let transport = HttpTransport::new(&cfg.endpoint, cfg.request_timeout())?;
        Ok(Self::new(transport, cfg))
    }
}

impl<T: Transport> BackendClient<T> {
    pub fn new(transport: T, cfg: &SessionConfig) -> Self {
        Self::with_policy(transport, cfg, RetryPolicy::from_config(cfg))
    }

    pub fn with_policy(transport: T, cfg: &SessionConfig, policy: RetryPolicy) -> Self {
        Self {
            transport,
            model: cfg.model.clone(),
            endpoint: cfg.endpoint.clone(),
            options: GenerateOptions {
                temperature: cfg.temperature,
                top_p: cfg.top_p,
                num_predict: cfg.max_output_tokens,
                stop: cfg.stop_sequences.clone(),
            },
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: self.options.clone(),
        }
    }

    fn exhausted(&self, err: &TransportError, attempts: u32) -> BackendError {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::Timeout => format!(
                "request timed out after {attempts} attempts; the model might be busy or too slow"
            ),
            ErrorKind::ConnectionFailed => format!(
                "failed to connect to {} after {attempts} attempts; check that the server is running",
                self.endpoint
            ),
            _ => format!("failed to communicate with backend after {attempts} attempts: {err}"),
        };
        BackendError {
            kind,
            message,
            attempts,
        }
    }
}

/// Pull the reply text out of a decoded response body.
fn extract_response(body: &Value) -> Result<String, String> {
    match body.get("response").and_then(Value::as_str) {
        Some(text) => Ok(text.trim().to_string()),
        None => Err("unexpected response format: missing `response` text field".to_string()),
    }
}

#[async_trait]
impl<T: Transport> Backend for BackendClient<T> {
    #[instrument(skip_all, fields(model = %self.model, prompt_bytes = prompt.len()))]
    async fn call(&self, prompt: &str) -> Result<String, BackendError> {
        let request = self.request(prompt);
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 0..max_attempts {
            info!(attempt = attempt + 1, max_attempts, "calling backend");
            let err = match self.transport.post(&request).await {
                Ok(body) => {
                    return extract_response(&body).map_err(|message| {
                        warn!(%message, "backend reply missing expected field");
                        BackendError {
                            kind: ErrorKind::MalformedResponse,
                            message,
                            attempts: attempt + 1,
                        }
                    });
                }
                Err(err) => err,
            };

            if err.kind() == ErrorKind::MalformedResponse {
                warn!(error = %err, "backend reply could not be decoded");
                return Err(BackendError {
                    kind: ErrorKind::MalformedResponse,
                    message: err.to_string(),
                    attempts: attempt + 1,
                });
            }
            if attempt + 1 == max_attempts {
                warn!(error = %err, attempts = max_attempts, "backend call failed; giving up");
                return Err(self.exhausted(&err, max_attempts));
            }

            let delay = self.policy.delay_after(err.kind(), attempt);
            warn!(
                error = %err,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "backend attempt failed; retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        debug!("retry loop ended without a result");
        Err(BackendError {
            kind: ErrorKind::Other,
            message: "failed to get a response from the backend".to_string(),
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use serde_json::json;

    fn client(script: Vec<Result<Value, TransportError>>) -> BackendClient<ScriptedTransport> {
        BackendClient::with_policy(
            ScriptedTransport::new(script),
            &SessionConfig::default(),
            RetryPolicy::immediate(3),
        )
    }

    #[test]
    fn request_matches_wire_shape() {
        let client = client(Vec::new());
        let value = serde_json::to_value(client.request("hello")).expect("serialize");
        assert_eq!(value["model"], "claude-3.5-sonnet");
        assert_eq!(value["prompt"], "hello");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 2000);
        assert_eq!(value["options"]["stop"].as_array().map(Vec::len), Some(4));
        let temperature = value["options"]["temperature"].as_f64().expect("temperature");
        assert!((temperature - 0.1).abs() < 0.001);
    }

    #[test]
    fn default_policy_waits_match_config() {
        let policy = RetryPolicy::from_config(&SessionConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(ErrorKind::Timeout, 0), Duration::from_secs(5));
        assert_eq!(policy.delay_after(ErrorKind::Timeout, 2), Duration::from_secs(5));
        assert_eq!(
            policy.delay_after(ErrorKind::ConnectionFailed, 0),
            Duration::from_secs(1)
        );
        assert_eq!(policy.delay_after(ErrorKind::Other, 1), Duration::from_secs(2));
        assert_eq!(
            policy.delay_after(ErrorKind::ConnectionFailed, 2),
            Duration::from_secs(4)
        );
    }

    #[tokio::test]
    async fn success_is_trimmed() {
        let client = client(vec![Ok(json!({"response": "  hi there \n"}))]);
        assert_eq!(client.call("p").await, Ok("hi there".to_string()));
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test]
    async fn connection_failures_then_success() {
        let client = client(vec![
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
            Ok(json!({"response": "third time"})),
        ]);
        assert_eq!(client.call("p").await, Ok("third time".to_string()));
        assert_eq!(client.transport().calls(), 3);
    }

    #[tokio::test]
    async fn timeouts_exhaust_attempts() {
        let client = client(vec![
            Err(TransportError::Timeout("slow".into())),
            Err(TransportError::Timeout("slow".into())),
            Err(TransportError::Timeout("slow".into())),
        ]);
        let err = client.call("p").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.attempts, 3);
        assert!(err.message.contains("timed out"));
        assert_eq!(client.transport().calls(), 3);
    }

    #[tokio::test]
    async fn final_error_kind_follows_last_attempt() {
        let client = client(vec![
            Err(TransportError::Timeout("slow".into())),
            Err(TransportError::Other("HTTP 500".into())),
            Err(TransportError::Connect("refused".into())),
        ]);
        let err = client.call("p").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionFailed);
        assert!(err.message.contains("failed to connect"));
    }

    #[tokio::test]
    async fn other_failures_report_generic_error() {
        let client = client(vec![
            Err(TransportError::Other("HTTP 500: boom".into())),
            Err(TransportError::Other("HTTP 500: boom".into())),
            Err(TransportError::Other("HTTP 502: bad gateway".into())),
        ]);
        let err = client.call("p").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Other);
        assert!(err.message.contains("bad gateway"));
    }

    #[tokio::test]
    async fn missing_field_is_not_retried() {
        let client = client(vec![
            Ok(json!({"error": "model not found"})),
            Ok(json!({"response": "never reached"})),
        ]);
        let err = client.call("p").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
        assert_eq!(err.attempts, 1);
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test]
    async fn undecodable_body_is_not_retried() {
        let client = client(vec![
            Err(TransportError::Decode("expected value".into())),
            Ok(json!({"response": "never reached"})),
        ]);
        let err = client.call("p").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test]
    async fn non_string_response_is_malformed() {
        let client = client(vec![Ok(json!({"response": 42}))]);
        let err = client.call("p").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn error_display_names_kind() {
        let err = BackendError {
            kind: ErrorKind::Timeout,
            message: "request timed out after 3 attempts".to_string(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "timeout: request timed out after 3 attempts");
    }
}
