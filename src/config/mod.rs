//! Configuration for the aPaaS client.

use crate::errors::{ApaasError, ApaasResult, ConfigurationError};
use crate::resilience::{LimiterConfig, RetryConfig};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

/// Default OpenAPI host.
pub const DEFAULT_BASE_URL: &str = "https://ae-openapi.feishu.cn";

/// Default timeout for a single HTTP exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variables read by [`ApaasConfig::from_env`].
pub mod env {
    /// Namespace of the application.
    pub const NAMESPACE: &str = "APAAS_NAMESPACE";
    /// Client id used for the app token exchange.
    pub const CLIENT_ID: &str = "APAAS_CLIENT_ID";
    /// Client secret used for the app token exchange.
    pub const CLIENT_SECRET: &str = "APAAS_CLIENT_SECRET";
    /// Optional base URL override.
    pub const BASE_URL: &str = "APAAS_BASE_URL";
    /// Optional flag (`true`/`1`) that disables token caching.
    pub const DISABLE_TOKEN_CACHE: &str = "APAAS_DISABLE_TOKEN_CACHE";
}

/// Configuration for the aPaaS client.
#[derive(Debug, Clone)]
pub struct ApaasConfig {
    /// Application namespace, part of most endpoint paths.
    pub namespace: String,

    /// Client id for the app token exchange.
    pub client_id: String,

    /// Client secret for the app token exchange.
    pub client_secret: SecretString,

    /// Base URL for the API, always ending with `/`.
    pub base_url: Url,

    /// Timeout for a single HTTP exchange.
    pub timeout: Duration,

    /// Fetch a fresh token for every call instead of caching it.
    pub disable_token_cache: bool,

    /// Retry policy for transient failures.
    pub retry: RetryConfig,

    /// Request throttling; `None` disables it.
    pub limiter: Option<LimiterConfig>,

    /// User agent string.
    pub user_agent: String,
}

impl ApaasConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ApaasConfigBuilder {
        ApaasConfigBuilder::new()
    }

    /// Builds a configuration from the `APAAS_*` environment variables.
    pub fn from_env() -> ApaasResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ApaasResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(namespace) = lookup(env::NAMESPACE) {
            builder = builder.namespace(namespace);
        }
        if let Some(client_id) = lookup(env::CLIENT_ID) {
            builder = builder.client_id(client_id);
        }
        if let Some(secret) = lookup(env::CLIENT_SECRET) {
            builder = builder.client_secret(secret);
        }
        if let Some(base_url) = lookup(env::BASE_URL) {
            builder = builder.base_url(base_url);
        }
        if let Some(flag) = lookup(env::DISABLE_TOKEN_CACHE) {
            let flag = flag.trim();
            builder = builder.disable_token_cache(flag == "1" || flag.eq_ignore_ascii_case("true"));
        }
        builder.build()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ApaasResult<()> {
        require_non_blank("namespace", &self.namespace)?;
        require_non_blank("client_id", &self.client_id)?;
        require_non_blank("client_secret", self.client_secret.expose_secret())?;

        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(ApaasError::configuration(
                "Base URL must use http or https",
            ));
        }

        if self.timeout.is_zero() {
            return Err(ApaasError::configuration("Timeout must be greater than zero"));
        }

        self.retry.validate().map_err(ApaasError::configuration)?;

        Ok(())
    }

    /// Resolves an API path against the base URL.
    pub fn endpoint_url(&self, path: &str) -> ApaasResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApaasError::validation("path", format!("Invalid URL: {}", e)))
    }
}

fn require_non_blank(field: &str, value: &str) -> ApaasResult<()> {
    if value.trim().is_empty() {
        return Err(ApaasError::Configuration(ConfigurationError::MissingField(
            field.to_string(),
        )));
    }
    Ok(())
}

fn parse_base_url(raw: &str) -> ApaasResult<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    let trimmed = if trimmed.is_empty() {
        DEFAULT_BASE_URL
    } else {
        trimmed
    };
    Url::parse(&format!("{}/", trimmed))
        .map_err(|e| ApaasError::configuration(format!("Invalid base URL: {}", e)))
}

/// Builder for ApaasConfig.
pub struct ApaasConfigBuilder {
    namespace: Option<String>,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    base_url: Option<String>,
    timeout: Duration,
    disable_token_cache: bool,
    retry: RetryConfig,
    limiter: Option<LimiterConfig>,
    user_agent: Option<String>,
}

impl ApaasConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            namespace: None,
            client_id: None,
            client_secret: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            disable_token_cache: false,
            retry: RetryConfig::default(),
            limiter: Some(LimiterConfig::default()),
            user_agent: None,
        }
    }

    /// Sets the namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the client id.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the client secret.
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Sets the base URL. A blank value keeps the default host.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches a fresh token for every call when set.
    pub fn disable_token_cache(mut self, disable: bool) -> Self {
        self.disable_token_cache = disable;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    /// Sets the rate limiter configuration; zero values fall back to defaults.
    pub fn limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = Some(limiter.normalized());
        self
    }

    /// Turns request throttling off.
    pub fn disable_rate_limit(mut self) -> Self {
        self.limiter = None;
        self
    }

    /// Sets the user agent string.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ApaasResult<ApaasConfig> {
        let missing = |field: &str| {
            ApaasError::Configuration(ConfigurationError::MissingField(field.to_string()))
        };

        let namespace = self.namespace.ok_or_else(|| missing("namespace"))?;
        let client_id = self.client_id.ok_or_else(|| missing("client_id"))?;
        let client_secret = self.client_secret.ok_or_else(|| missing("client_secret"))?;

        let base_url = parse_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("integrations-apaas/{}", env!("CARGO_PKG_VERSION")));

        let config = ApaasConfig {
            namespace: namespace.trim().to_string(),
            client_id: client_id.trim().to_string(),
            client_secret,
            base_url,
            timeout: self.timeout,
            disable_token_cache: self.disable_token_cache,
            retry: self.retry,
            limiter: self.limiter,
            user_agent,
        };

        config.validate()?;

        Ok(config)
    }
}

impl Default for ApaasConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
