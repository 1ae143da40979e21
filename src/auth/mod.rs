//! App token management.
//!
//! Every call to the OpenAPI carries an app access token obtained by
//! exchanging the client id and secret at `/auth/v1/appToken`. The
//! [`TokenManager`] caches that token per client instance and makes sure that
//! concurrent callers racing on an expired token trigger exactly one exchange:
//! the first caller through the refresh gate performs it, every other caller
//! waits on the gate and then finds the fresh token already stored.
//!
//! # Example
//!
//! ```no_run
//! use integrations_apaas::auth::{AppTokenSource, TokenManager};
//! use integrations_apaas::config::ApaasConfig;
//! use integrations_apaas::transport::ReqwestTransport;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ApaasConfig::from_env()?;
//! let transport = Arc::new(ReqwestTransport::with_timeout(config.timeout)?);
//! let source = AppTokenSource::new(&config, transport)?;
//! let manager = TokenManager::new(Arc::new(source), config.disable_token_cache);
//!
//! manager.ensure_valid(&CancellationToken::new()).await?;
//! assert!(manager.current_token().await.is_some());
//! # Ok(())
//! # }
//! ```

use crate::config::ApaasConfig;
use crate::errors::{truncate_body, ApaasError, ApaasResult, AuthenticationError};
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::types::{ApiResponse, TokenResponseData, SUCCESS_CODE};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Path of the app token endpoint.
pub const APP_TOKEN_PATH: &str = "/auth/v1/appToken";

/// A cached token is only used while it has more than this left before expiry.
pub const TOKEN_REFRESH_MARGIN_SECONDS: i64 = 60;

/// App access token with its absolute expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The token string, sent verbatim in the `Authorization` header.
    pub token: SecretString,

    /// Expiration time.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a new access token.
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_at,
        }
    }

    /// Checks if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Checks if the token is still usable, i.e. expires more than the refresh margin from now.
    pub fn is_fresh(&self) -> bool {
        self.expires_at - Utc::now() > chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECONDS)
    }

    /// Time left until expiry, zero once expired.
    pub fn expires_in(&self) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Source of fresh app tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Performs one credential exchange.
    async fn fetch_token(&self) -> Result<AccessToken, AuthenticationError>;
}

/// Exchanges client credentials at the app token endpoint.
pub struct AppTokenSource {
    client_id: String,
    client_secret: SecretString,
    url: Url,
    timeout: Duration,
    user_agent: String,
    transport: Arc<dyn HttpTransport>,
}

impl AppTokenSource {
    /// Creates a token source for the configured application.
    pub fn new(config: &ApaasConfig, transport: Arc<dyn HttpTransport>) -> ApaasResult<Self> {
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            url: config.endpoint_url(APP_TOKEN_PATH)?,
            timeout: config.timeout,
            user_agent: config.user_agent.clone(),
            transport,
        })
    }

    fn build_request(&self) -> Result<HttpRequest, AuthenticationError> {
        let body = serde_json::json!({
            "clientId": self.client_id,
            "clientSecret": self.client_secret.expose_secret(),
        });
        let body = serde_json::to_vec(&body)
            .map_err(|e| AuthenticationError::Transport(format!("failed to encode body: {}", e)))?;

        let mut request = HttpRequest::new(HttpMethod::Post, self.url.clone());
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            request.headers.insert(USER_AGENT, ua);
        }
        request.body = Some(Bytes::from(body));
        request.timeout = Some(self.timeout);
        Ok(request)
    }
}

#[async_trait]
impl TokenSource for AppTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthenticationError> {
        let request = self.build_request()?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AuthenticationError::Transport(e.to_string()))?;

        if !response.status.is_success() {
            return Err(AuthenticationError::HttpStatus {
                status: response.status.as_u16(),
                body: truncate_body(&response.body),
            });
        }

        let envelope: ApiResponse = serde_json::from_slice(&response.body)
            .map_err(|e| AuthenticationError::InvalidResponse(e.to_string()))?;

        if envelope.code != SUCCESS_CODE {
            return Err(AuthenticationError::ExchangeFailed {
                code: envelope.code,
                message: envelope.msg,
            });
        }

        let data: TokenResponseData = envelope
            .decode_data()
            .map_err(|e| AuthenticationError::InvalidResponse(e.to_string()))?
            .ok_or_else(|| AuthenticationError::InvalidResponse("missing data".to_string()))?;

        if data.access_token.trim().is_empty() {
            return Err(AuthenticationError::EmptyToken);
        }

        let expires_at = Utc
            .timestamp_millis_opt(data.expire_time)
            .single()
            .ok_or_else(|| {
                AuthenticationError::InvalidResponse(format!(
                    "invalid expireTime {}",
                    data.expire_time
                ))
            })?;

        Ok(AccessToken::new(data.access_token, expires_at))
    }
}

/// Cached credential owned by one [`TokenManager`].
#[derive(Debug, Default)]
struct CredentialState {
    token: Option<AccessToken>,
}

impl CredentialState {
    fn is_fresh(&self) -> bool {
        self.token.as_ref().map_or(false, AccessToken::is_fresh)
    }
}

/// Clears the in-flight marker when the refresh scope ends, whatever the outcome.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn mark(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-client token cache with single-flight refresh.
pub struct TokenManager {
    source: Arc<dyn TokenSource>,
    state: RwLock<CredentialState>,
    refresh_gate: Mutex<()>,
    refresh_in_flight: AtomicBool,
    cache_disabled: bool,
}

impl TokenManager {
    /// Creates a manager with an empty cache.
    ///
    /// With `cache_disabled` every [`ensure_valid`](Self::ensure_valid) call
    /// performs a fresh exchange.
    pub fn new(source: Arc<dyn TokenSource>, cache_disabled: bool) -> Self {
        Self {
            source,
            state: RwLock::new(CredentialState::default()),
            refresh_gate: Mutex::new(()),
            refresh_in_flight: AtomicBool::new(false),
            cache_disabled,
        }
    }

    /// Makes sure a token that is valid beyond the refresh margin is cached.
    ///
    /// On failure the previously cached token is left untouched.
    pub async fn ensure_valid(&self, cancel: &CancellationToken) -> ApaasResult<()> {
        if !self.cache_disabled && self.state.read().await.is_fresh() {
            return Ok(());
        }

        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApaasError::Cancelled),
            gate = self.refresh_gate.lock() => gate,
        };

        if !self.cache_disabled && self.state.read().await.is_fresh() {
            debug!("token refreshed by a concurrent caller");
            return Ok(());
        }

        let _in_flight = InFlight::mark(&self.refresh_in_flight);
        debug!(cache_disabled = self.cache_disabled, "refreshing access token");

        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApaasError::Cancelled),
            result = self.source.fetch_token() => result,
        };

        let token = token.map_err(|e| {
            warn!(error = %e, "access token refresh failed");
            ApaasError::Authentication(e)
        })?;

        info!(expires_at = %token.expires_at, "access token refreshed");
        self.state.write().await.token = Some(token);
        Ok(())
    }

    /// Ensures a valid token and returns it.
    pub async fn access_token(&self, cancel: &CancellationToken) -> ApaasResult<SecretString> {
        self.ensure_valid(cancel).await?;
        self.current_token()
            .await
            .ok_or(ApaasError::Authentication(AuthenticationError::EmptyToken))
    }

    /// Returns the cached token, if any, without checking its expiry.
    pub async fn current_token(&self) -> Option<SecretString> {
        self.state
            .read()
            .await
            .token
            .as_ref()
            .map(|t| t.token.clone())
    }

    /// Time left on the cached token: `None` without a token, zero once expired.
    pub async fn expires_in(&self) -> Option<Duration> {
        self.state.read().await.token.as_ref().map(AccessToken::expires_in)
    }

    /// Returns true while an exchange is running.
    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_flight.load(Ordering::SeqCst)
    }

    /// Drops the cached token so the next call performs an exchange.
    pub async fn invalidate(&self) {
        self.state.write().await.token = None;
    }
}
