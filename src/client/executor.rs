//! Request executor with auth, throttling, retries and envelope decoding.

use crate::auth::TokenManager;
use crate::config::ApaasConfig;
use crate::errors::{
    is_retryable_status, truncate_body, ApaasError, ApaasResult, ApiError, AuthenticationError,
};
use crate::resilience::{RateLimiter, RetryExecutor};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::types::{ApiResponse, ResponseMeta};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Response header carrying the server-side request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Executes one authenticated, throttled and retried call.
///
/// A call:
/// - makes sure the token manager holds a valid token
/// - takes a slot from the shared rate limiter
/// - sends the request under the retry executor, reading the current token
///   on every attempt; transport failures and retryable statuses are
///   attempted again, and cancellation aborts the exchange in flight
/// - maps terminal non-2xx statuses to [`ApiError`] and decodes the envelope
pub struct RequestExecutor {
    config: ApaasConfig,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenManager>,
    limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
}

impl RequestExecutor {
    /// Creates a new request executor.
    pub fn new(
        config: ApaasConfig,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenManager>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let retry = RetryExecutor::new(config.retry.clone());
        Self {
            config,
            transport,
            tokens,
            limiter,
            retry,
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ApaasConfig {
        &self.config
    }

    /// Returns the namespace every resource path is scoped to.
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Returns the token manager.
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Returns the shared rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Executes a call and returns the decoded envelope.
    ///
    /// A non-success envelope code is logged and handed back to the caller
    /// untouched; use [`ApiResponse::ensure_success`] to turn it into an error.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        body: Option<Bytes>,
    ) -> ApaasResult<ApiResponse> {
        let url = self.config.endpoint_url(path)?;

        self.tokens.ensure_valid(cancel).await?;
        self.limiter.acquire(cancel).await?;

        debug!(method = %method, path, "sending request");

        let (url, body) = (&url, &body);
        let response = self
            .retry
            .run(cancel, || async move {
                // Token is read per attempt.
                let token = self.tokens.access_token(cancel).await?;
                let request = HttpRequest {
                    method,
                    url: url.clone(),
                    headers: self.build_headers(&token, body.is_some())?,
                    body: body.clone(),
                    timeout: Some(self.config.timeout),
                };
                let response = self.send_once(cancel, request, path).await?;
                Ok::<_, ApaasError>(response)
            })
            .await?;

        if !response.status.is_success() {
            return Err(ApaasError::Api(status_error(method, path, &response)));
        }

        let mut envelope = decode_envelope(&response.body)?;
        envelope.meta = ResponseMeta {
            status: response.status.as_u16(),
            request_id: response.header(REQUEST_ID_HEADER).map(str::to_string),
            method: method.as_str().to_string(),
            endpoint: path.to_string(),
        };

        if !envelope.is_success() {
            warn!(
                method = %method,
                path,
                code = %envelope.code,
                msg = %envelope.msg,
                request_id = envelope.meta.request_id.as_deref().unwrap_or(""),
                "api returned an error code"
            );
        }

        Ok(envelope)
    }

    /// Serializes `body` as JSON and executes the call.
    pub async fn execute_json<B>(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> ApaasResult<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body).map_err(|e| {
            ApaasError::validation("body", format!("failed to encode request body: {}", e))
        })?;
        self.execute(cancel, method, path, Some(Bytes::from(body)))
            .await
    }

    /// Executes a call, requires a success envelope and decodes its data.
    pub async fn execute_data<B, T>(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> ApaasResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        self.execute_json(cancel, method, path, body)
            .await?
            .ensure_success()?
            .decode_data_or_default()
    }

    /// Builds a full URL from a path.
    pub fn build_url(&self, path: &str) -> ApaasResult<Url> {
        self.config.endpoint_url(path)
    }

    async fn send_once(
        &self,
        cancel: &CancellationToken,
        request: HttpRequest,
        path: &str,
    ) -> ApaasResult<HttpResponse> {
        let method = request.method;
        // Dropping the transport future aborts the exchange.
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(method = %method, path, "request cancelled in flight");
                return Err(ApaasError::Cancelled);
            }
            result = self.transport.send(request) => result?,
        };

        let status = response.status.as_u16();
        if is_retryable_status(status) {
            return Err(ApaasError::Api(status_error(method, path, &response)));
        }

        Ok(response)
    }

    fn build_headers(&self, token: &SecretString, has_body: bool) -> ApaasResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(token.expose_secret()).map_err(|_| {
            ApaasError::Authentication(AuthenticationError::InvalidResponse(
                "access token is not a valid header value".to_string(),
            ))
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let user_agent = HeaderValue::from_str(&self.config.user_agent).map_err(|e| {
            ApaasError::configuration(format!("Invalid user agent: {}", e))
        })?;
        headers.insert(USER_AGENT, user_agent);

        Ok(headers)
    }
}

/// Maps a non-2xx response to an [`ApiError`], keeping the envelope code when the body has one.
fn status_error(method: HttpMethod, path: &str, response: &HttpResponse) -> ApiError {
    let (code, message) = match serde_json::from_slice::<ApiResponse>(&response.body) {
        Ok(envelope) if !envelope.code.is_empty() || !envelope.msg.is_empty() => {
            (envelope.code, envelope.msg)
        }
        _ => (String::new(), truncate_body(&response.body)),
    };

    ApiError::new(
        response.status.as_u16(),
        code,
        message,
        method.as_str(),
        path,
    )
    .with_request_id(response.header(REQUEST_ID_HEADER).map(str::to_string))
}

fn decode_envelope(body: &[u8]) -> ApaasResult<ApiResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ApiResponse::default());
    }
    serde_json::from_slice(body).map_err(|e| ApaasError::deserialization(e.to_string()))
}
