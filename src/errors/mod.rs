//! Error types for the aPaaS integration.
//!
//! Every failure surfaced by the client is an [`ApaasError`]. Callers decide
//! whether to try again through [`ApaasError::is_retryable`] instead of
//! inspecting concrete variants.

use std::fmt;
use thiserror::Error;

/// Result type for aPaaS operations.
pub type ApaasResult<T> = Result<T, ApaasError>;

/// HTTP statuses that mark a failed call as transient.
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Maximum number of body bytes kept on an [`ApiError`] built from a raw HTTP response.
pub const MAX_ERROR_BODY_BYTES: usize = 4096;

/// Top-level error type for the aPaaS integration.
#[derive(Debug, Error)]
pub enum ApaasError {
    /// Malformed caller input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Credential exchange failed or produced an unusable token.
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    /// Transport-level failure.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Non-success HTTP status or application code.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Response could not be decoded.
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    /// The caller's cancellation token fired while the operation was waiting.
    #[error("operation cancelled")]
    Cancelled,
}

impl ApaasError {
    /// Creates a validation error for the given field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApaasError::Validation(ValidationError::new(field, message))
    }

    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        ApaasError::Configuration(ConfigurationError::InvalidConfiguration(msg.into()))
    }

    /// Creates a network error for the given operation.
    pub fn network(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        ApaasError::Network(NetworkError::new(operation, msg))
    }

    /// Creates a deserialization error.
    pub fn deserialization(msg: impl Into<String>) -> Self {
        ApaasError::Response(ResponseError::Deserialization(msg.into()))
    }

    /// Returns true if the error is transient and the call may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApaasError::Network(err) => err.is_retryable(),
            ApaasError::Api(err) => err.is_retryable(),
            ApaasError::Validation(_)
            | ApaasError::Configuration(_)
            | ApaasError::Authentication(_)
            | ApaasError::Response(_)
            | ApaasError::Cancelled => false,
        }
    }

    /// Returns true if the error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApaasError::Cancelled)
    }

    /// Returns the HTTP status code if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApaasError::Api(err) => Some(err.status),
            ApaasError::Authentication(AuthenticationError::HttpStatus { status, .. }) => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Returns the application-level error code if applicable.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApaasError::Api(err) if !err.code.is_empty() => Some(err.code.as_str()),
            ApaasError::Authentication(AuthenticationError::ExchangeFailed { code, .. }) => {
                Some(code.as_str())
            }
            _ => None,
        }
    }

    /// Returns the server request identifier if one was reported.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ApaasError::Api(err) => err.request_id.as_deref(),
            _ => None,
        }
    }
}

/// Malformed caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation error: field={field}, msg={message}")]
pub struct ValidationError {
    /// Offending field or parameter.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required setting is missing or blank.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Authentication errors raised by the credential exchange.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The token endpoint answered with a non-success application code.
    #[error("failed to fetch access token: {message}")]
    ExchangeFailed {
        /// Application code from the envelope.
        code: String,
        /// Message from the envelope.
        message: String,
    },

    /// The token endpoint answered with a non-2xx status.
    #[error("token endpoint returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// The exchange succeeded but carried no token.
    #[error("received empty access token")]
    EmptyToken,

    /// The token payload could not be decoded.
    #[error("failed to decode token response: {0}")]
    InvalidResponse(String),

    /// The token endpoint could not be reached.
    #[error("token request failed: {0}")]
    Transport(String),
}

/// Transport-level failure wrapped with the operation that was running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network error during {operation}: {message}")]
pub struct NetworkError {
    /// Operation being performed, e.g. `http request`.
    pub operation: String,
    /// Underlying failure.
    pub message: String,
}

impl NetworkError {
    /// Creates a new network error.
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Network errors are always transient.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Error reported by the API, either as an HTTP status or an envelope code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Application code from the envelope, empty when the body had none.
    pub code: String,
    /// Message from the envelope or the raw body.
    pub message: String,
    /// Value of the `X-Request-Id` response header.
    pub request_id: Option<String>,
    /// HTTP method of the failed call.
    pub method: String,
    /// Request path of the failed call.
    pub endpoint: String,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        method: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            request_id: None,
            method: method.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Attaches the server request identifier.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id.filter(|id| !id.is_empty());
        self
    }

    /// Returns true if the status is in the retryable set.
    pub fn is_retryable(&self) -> bool {
        is_retryable_status(self.status)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "api error [{}]: code={}, msg={}",
            self.status, self.code, self.message
        )?;
        if let Some(request_id) = &self.request_id {
            write!(f, ", request_id={}", request_id)?;
        }
        write!(f, ", endpoint={} {}", self.method, self.endpoint)
    }
}

impl std::error::Error for ApiError {}

/// Returns true if a response with this status should be attempted again.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Response errors.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// Deserialization error.
    #[error("failed to decode API response: {0}")]
    Deserialization(String),

    /// Unexpected format.
    #[error("Unexpected response format: {0}")]
    UnexpectedFormat(String),
}

impl From<serde_json::Error> for ApaasError {
    fn from(err: serde_json::Error) -> Self {
        ApaasError::Response(ResponseError::Deserialization(err.to_string()))
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established or was interrupted.
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

impl From<TransportError> for NetworkError {
    fn from(err: TransportError) -> Self {
        NetworkError::new("http request", err.to_string())
    }
}

impl From<TransportError> for ApaasError {
    fn from(err: TransportError) -> Self {
        ApaasError::Network(err.into())
    }
}

/// Truncates a response body for inclusion in an error message.
pub(crate) fn truncate_body(body: &[u8]) -> String {
    let end = body.len().min(MAX_ERROR_BODY_BYTES);
    String::from_utf8_lossy(&body[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        for status in [408, 429, 500, 502, 503, 504] {
            let error = ApaasError::Api(ApiError::new(status, "", "busy", "GET", "/x"));
            assert!(error.is_retryable(), "status {} should be retryable", status);
        }

        for status in [400, 401, 403, 404, 409, 501] {
            let error = ApaasError::Api(ApiError::new(status, "", "nope", "GET", "/x"));
            assert!(!error.is_retryable(), "status {} should be terminal", status);
        }

        let error = ApaasError::network("http request", "connection reset");
        assert!(error.is_retryable());

        assert!(!ApaasError::validation("records", "required").is_retryable());
        assert!(!ApaasError::Authentication(AuthenticationError::EmptyToken).is_retryable());
        assert!(!ApaasError::Cancelled.is_retryable());
        assert!(!ApaasError::deserialization("bad json").is_retryable());
    }

    #[test]
    fn test_api_error_display() {
        let error = ApiError::new(400, "k_ec_000001", "invalid param", "POST", "/api/test");
        assert_eq!(
            error.to_string(),
            "api error [400]: code=k_ec_000001, msg=invalid param, endpoint=POST /api/test"
        );

        let error = error.with_request_id(Some("req-123".to_string()));
        assert_eq!(
            error.to_string(),
            "api error [400]: code=k_ec_000001, msg=invalid param, request_id=req-123, endpoint=POST /api/test"
        );
    }

    #[test]
    fn test_empty_request_id_is_dropped() {
        let error = ApiError::new(500, "", "boom", "GET", "/x").with_request_id(Some(String::new()));
        assert_eq!(error.request_id, None);
    }

    #[test]
    fn test_validation_and_network_display() {
        let error = ApaasError::validation("records", "must be provided");
        assert_eq!(
            error.to_string(),
            "validation error: field=records, msg=must be provided"
        );

        let error = ApaasError::from(TransportError::Network("connection refused".to_string()));
        assert_eq!(
            error.to_string(),
            "network error during http request: Network error: connection refused"
        );
    }

    #[test]
    fn test_accessors() {
        let error = ApaasError::Api(
            ApiError::new(429, "k_rate", "slow down", "GET", "/x")
                .with_request_id(Some("abc".to_string())),
        );
        assert_eq!(error.status_code(), Some(429));
        assert_eq!(error.code(), Some("k_rate"));
        assert_eq!(error.request_id(), Some("abc"));

        let error = ApaasError::Authentication(AuthenticationError::ExchangeFailed {
            code: "10001".to_string(),
            message: "bad secret".to_string(),
        });
        assert_eq!(error.code(), Some("10001"));
        assert_eq!(error.status_code(), None);
        assert_eq!(
            error.to_string(),
            "Authentication error: failed to fetch access token: bad secret"
        );
    }

    #[test]
    fn test_truncate_body() {
        let body = vec![b'a'; MAX_ERROR_BODY_BYTES + 100];
        assert_eq!(truncate_body(&body).len(), MAX_ERROR_BODY_BYTES);
        assert_eq!(truncate_body(b"  short  "), "short");
    }
}
