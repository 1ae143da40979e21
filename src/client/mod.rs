//! aPaaS OpenAPI client implementation.

use crate::auth::{AppTokenSource, TokenManager, TokenSource};
use crate::config::{ApaasConfig, ApaasConfigBuilder};
use crate::errors::{ApaasError, ApaasResult};
use crate::resilience::{LimiterConfig, RateLimiter, RetryConfig};
use crate::services::*;
use crate::transport::{HttpTransport, ReqwestTransport};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod executor;
pub use executor::{RequestExecutor, REQUEST_ID_HEADER};

/// aPaaS OpenAPI client.
///
/// This is the main entry point. It owns the token cache and the rate limiter
/// of one application; separate clients share nothing, so several
/// applications can be served from one process.
pub struct ApaasClient {
    config: ApaasConfig,
    executor: Arc<RequestExecutor>,
}

impl ApaasClient {
    /// Creates a client that talks HTTP through `reqwest`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use integrations_apaas::{ApaasClient, ApaasConfig};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ApaasConfig::builder()
    ///     .namespace("package_abc__c")
    ///     .client_id("c_123")
    ///     .client_secret("secret")
    ///     .build()?;
    ///
    /// let client = ApaasClient::new(config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ApaasConfig) -> ApaasResult<Self> {
        config.validate()?;

        let transport = ReqwestTransport::with_timeout(config.timeout).map_err(|e| {
            ApaasError::configuration(format!("Failed to create transport: {}", e))
        })?;

        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(
        config: ApaasConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> ApaasResult<Self> {
        let source = AppTokenSource::new(&config, transport.clone())?;
        Self::with_token_source(config, transport, Arc::new(source))
    }

    /// Creates a client over a custom transport and token source.
    pub fn with_token_source(
        config: ApaasConfig,
        transport: Arc<dyn HttpTransport>,
        source: Arc<dyn TokenSource>,
    ) -> ApaasResult<Self> {
        config.validate()?;

        let tokens = Arc::new(TokenManager::new(source, config.disable_token_cache));
        let limiter = Arc::new(RateLimiter::from_config(config.limiter.clone()));
        let executor = Arc::new(RequestExecutor::new(
            config.clone(),
            transport,
            tokens,
            limiter,
        ));

        Ok(Self { config, executor })
    }

    /// Creates a new client builder.
    pub fn builder() -> ApaasClientBuilder {
        ApaasClientBuilder::new()
    }

    /// Fetches the first access token so that later calls start warm.
    pub async fn init(&self, cancel: &CancellationToken) -> ApaasResult<()> {
        self.executor.tokens().ensure_valid(cancel).await
    }

    /// Returns a valid access token, refreshing it if needed.
    pub async fn token(&self, cancel: &CancellationToken) -> ApaasResult<SecretString> {
        self.executor.tokens().access_token(cancel).await
    }

    /// Time left on the cached token; `None` before the first exchange.
    pub async fn token_expires_in(&self) -> Option<Duration> {
        self.executor.tokens().expires_in().await
    }

    /// Namespace this client addresses.
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    // Service accessors

    /// Access the objects service for metadata and record operations.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use integrations_apaas::ApaasClient;
    /// # use tokio_util::sync::CancellationToken;
    /// # async fn example(client: ApaasClient) -> Result<(), Box<dyn std::error::Error>> {
    /// let cancel = CancellationToken::new();
    /// let fields = client.objects().fields(&cancel, "object_store").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn objects(&self) -> ObjectsService {
        ObjectsService::new(self.executor.clone())
    }

    /// Access global option sets.
    pub fn global_options(&self) -> GlobalService {
        GlobalService::new(self.executor.clone(), GlobalResource::Options)
    }

    /// Access global variables.
    pub fn global_variables(&self) -> GlobalService {
        GlobalService::new(self.executor.clone(), GlobalResource::Variables)
    }

    /// Access application pages.
    pub fn pages(&self) -> PagesService {
        PagesService::new(self.executor.clone())
    }

    /// Access cloud functions.
    pub fn functions(&self) -> FunctionsService {
        FunctionsService::new(self.executor.clone())
    }

    /// Access automation flows.
    pub fn automation(&self) -> AutomationService {
        AutomationService::new(self.executor.clone())
    }

    /// Access department id exchange.
    pub fn departments(&self) -> DepartmentsService {
        DepartmentsService::new(self.executor.clone())
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ApaasConfig {
        &self.config
    }

    /// Gets the request executor (for endpoints without a service wrapper).
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }
}

/// Builder for ApaasClient.
pub struct ApaasClientBuilder {
    config_builder: ApaasConfigBuilder,
}

impl ApaasClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_builder: ApaasConfig::builder(),
        }
    }

    /// Sets the namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.namespace(namespace);
        self
    }

    /// Sets the client id.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.client_id(client_id);
        self
    }

    /// Sets the client secret.
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.client_secret(secret);
        self
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(url);
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Exchanges a fresh token before every call.
    pub fn disable_token_cache(mut self, disable: bool) -> Self {
        self.config_builder = self.config_builder.disable_token_cache(disable);
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config_builder = self.config_builder.retry(retry);
        self
    }

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config_builder = self.config_builder.max_retries(retries);
        self
    }

    /// Sets the rate limit.
    pub fn limiter(mut self, limiter: LimiterConfig) -> Self {
        self.config_builder = self.config_builder.limiter(limiter);
        self
    }

    /// Turns client-side throttling off.
    pub fn disable_rate_limit(mut self) -> Self {
        self.config_builder = self.config_builder.disable_rate_limit();
        self
    }

    /// Sets the user agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.user_agent(ua);
        self
    }

    /// Builds the client.
    pub fn build(self) -> ApaasResult<ApaasClient> {
        let config = self.config_builder.build()?;
        ApaasClient::new(config)
    }

    /// Builds the client over a custom transport.
    pub fn build_with_transport(self, transport: Arc<dyn HttpTransport>) -> ApaasResult<ApaasClient> {
        let config = self.config_builder.build()?;
        ApaasClient::with_transport(config, transport)
    }
}

impl Default for ApaasClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigurationError;
    use crate::mocks::{MockResponse, MockTokenSource, MockTransport};
    use secrecy::ExposeSecret;
    use serde_json::json;

    fn builder() -> ApaasClientBuilder {
        ApaasClient::builder()
            .namespace("ns")
            .client_id("id")
            .client_secret("secret")
            .base_url("http://localhost:9")
    }

    #[test]
    fn test_client_builder() {
        let client = builder().timeout(Duration::from_secs(60)).build().unwrap();
        assert_eq!(client.namespace(), "ns");
        assert_eq!(client.config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_requires_credentials() {
        let result = ApaasClient::builder().namespace("ns").build();
        assert!(matches!(
            result,
            Err(ApaasError::Configuration(ConfigurationError::MissingField(_)))
        ));
    }

    #[tokio::test]
    async fn test_init_primes_token() {
        let transport = Arc::new(MockTransport::new());
        let source = Arc::new(MockTokenSource::new(Duration::from_secs(7200)));
        let config = ApaasConfig::builder()
            .namespace("ns")
            .client_id("id")
            .client_secret("secret")
            .build()
            .unwrap();
        let client = ApaasClient::with_token_source(config, transport, source.clone()).unwrap();
        let cancel = CancellationToken::new();

        assert!(client.token_expires_in().await.is_none());
        client.init(&cancel).await.unwrap();
        assert!(client.token_expires_in().await.unwrap() > Duration::from_secs(7000));
        assert_eq!(client.token(&cancel).await.unwrap().expose_secret(), "token-1");
        assert_eq!(source.exchanges(), 1);
    }

    #[tokio::test]
    async fn test_clients_do_not_share_tokens() {
        let make = || {
            let transport = Arc::new(MockTransport::with_responses(vec![
                MockResponse::json(json!({
                    "code": "0",
                    "data": {"accessToken": "t", "expireTime": 4102444800000i64}
                })),
            ]));
            builder().build_with_transport(transport).unwrap()
        };
        let first = make();
        let second = make();
        let cancel = CancellationToken::new();

        first.init(&cancel).await.unwrap();
        assert!(first.token_expires_in().await.is_some());
        assert!(second.token_expires_in().await.is_none());
    }
}
