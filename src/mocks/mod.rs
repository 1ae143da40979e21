//! Test doubles for the transport and token seams.

use crate::auth::{AccessToken, TokenSource};
use crate::errors::{AuthenticationError, TransportError};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock HTTP response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl MockResponse {
    /// Create a successful response with body.
    pub fn ok_with_body(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Create a successful response carrying a JSON document.
    pub fn json(value: serde_json::Value) -> Self {
        Self::ok_with_body(value.to_string())
    }

    /// Create a successful envelope response with `code = "0"` and the given data.
    pub fn envelope(data: serde_json::Value) -> Self {
        Self::json(serde_json::json!({"code": "0", "msg": "success", "data": data}))
    }

    /// Create an envelope response carrying an application error code.
    pub fn envelope_error(code: &str, msg: &str) -> Self {
        Self::json(serde_json::json!({"code": code, "msg": msg}))
    }

    /// Create an error response.
    pub fn error(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header to the response.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    fn to_http_response(&self) -> Result<HttpResponse, TransportError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| TransportError::Http(format!("invalid mock status: {}", e)))?;
        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::Http(format!("invalid mock header: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Http(format!("invalid mock header: {}", e)))?;
            headers.insert(name, value);
        }
        Ok(HttpResponse::new(status, headers, self.body.clone()))
    }
}

/// Outcome queued on a [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this response.
    Response(MockResponse),
    /// Fail at the transport level with a connection error.
    NetworkFailure(String),
}

impl From<MockResponse> for MockOutcome {
    fn from(response: MockResponse) -> Self {
        MockOutcome::Response(response)
    }
}

/// Mock HTTP transport for testing.
///
/// Queued outcomes are returned in order; once the queue is empty the default
/// response is used, or the call fails if there is none.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<HttpRequest>>,
    default_response: Option<MockResponse>,
    latency: Duration,
}

impl MockTransport {
    /// Create a new mock transport with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport with queued responses.
    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        Self::with_outcomes(responses.into_iter().map(MockOutcome::from).collect())
    }

    /// Create a mock transport with queued outcomes, including transport failures.
    pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
            default_response: None,
            latency: Duration::ZERO,
        }
    }

    /// Create a mock transport with a default response.
    pub fn with_default(response: MockResponse) -> Self {
        Self {
            default_response: Some(response),
            ..Self::default()
        }
    }

    /// Makes every exchange take `latency` before it resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue another outcome.
    pub fn push(&self, outcome: impl Into<MockOutcome>) {
        lock(&self.outcomes).push_back(outcome.into());
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = lock(&self.outcomes).pop_front();
        match outcome {
            Some(MockOutcome::Response(response)) => response.to_http_response(),
            Some(MockOutcome::NetworkFailure(message)) => Err(TransportError::Network(message)),
            None => match &self.default_response {
                Some(response) => response.to_http_response(),
                None => Err(TransportError::Http("no mock response queued".to_string())),
            },
        }
    }
}

/// Token source that issues `token-1`, `token-2`, ... and counts exchanges.
pub struct MockTokenSource {
    ttl: Duration,
    delay: Duration,
    exchanges: AtomicU32,
    failure: Mutex<Option<AuthenticationError>>,
}

impl MockTokenSource {
    /// Creates a source whose tokens expire `ttl` after issue.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            delay: Duration::ZERO,
            exchanges: AtomicU32::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Makes every exchange take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next exchange fail with `error`.
    pub fn fail_with(&self, error: AuthenticationError) {
        *lock(&self.failure) = Some(error);
    }

    /// Number of exchanges performed.
    pub fn exchanges(&self) -> u32 {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthenticationError> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = lock(&self.failure).take();
        if let Some(error) = failure {
            return Err(error);
        }
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(2));
        Ok(AccessToken::new(format!("token-{}", n), Utc::now() + ttl))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
