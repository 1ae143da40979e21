//! aPaaS OpenAPI Integration Module
//!
//! A type-safe, resilient client for the aPaaS OpenAPI: application token
//! management, client-side rate limiting, retries with exponential backoff,
//! chunked bulk writes with per-item reporting, and paginated listings.
//!
//! # Features
//!
//! - **Authentication**: App token exchange with single-flight refresh one minute before expiry
//! - **Rate Limiting**: Token bucket shared by every call of a client
//! - **Retries**: Exponential backoff with jitter for transport failures and transient statuses
//! - **Batches**: Create, update and delete any number of records in chunks
//! - **Pagination**: Offset and page-token listings collected into one result
//! - **Services**: Objects, records, global options and variables, pages, cloud functions,
//!   automation flows, department id exchange
//!
//! Every operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken);
//! cancelling it aborts waits on the token refresh, the rate limiter and retry backoff.
//!
//! # Example
//!
//! ```no_run
//! use integrations_apaas::{ApaasClient, ApaasConfig, Record};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ApaasConfig::from_env()?;
//! let client = ApaasClient::new(config)?;
//! let cancel = CancellationToken::new();
//!
//! let records: Vec<Record> = (0..250)
//!     .map(|i| serde_json::from_value(serde_json::json!({"name": format!("row-{}", i)})))
//!     .collect::<Result<_, _>>()?;
//!
//! let result = client
//!     .objects()
//!     .create_with_iterator(&cancel, "object_store", Some(records.as_slice()), 100)
//!     .await?;
//! println!("{} created, {} failed", result.success_count, result.failed_count);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

// Core modules
pub mod auth;
pub mod batch;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod pagination;
pub mod resilience;
pub mod services;
pub mod transport;
pub mod types;

// Test doubles for the transport and token seams
pub mod mocks;

// Re-exports for convenience
pub use auth::{AccessToken, AppTokenSource, TokenManager, TokenSource};
pub use batch::{BatchOperation, BatchResult, OperationItem};
pub use client::{ApaasClient, ApaasClientBuilder, RequestExecutor};
pub use config::{ApaasConfig, ApaasConfigBuilder};
pub use errors::{ApaasError, ApaasResult};
pub use observability::{init_tracing, LogFormat, LogLevel, LoggingConfig};
pub use pagination::{PageAccumulator, PageIterator, RecordsIteratorResult};
pub use resilience::{LimiterConfig, RateLimiter, RetryConfig, RetryExecutor};
pub use types::{ApiResponse, FlowOperator, Record};

/// Prelude module with commonly used types and traits.
///
/// ```no_run
/// use integrations_apaas::prelude::*;
/// ```
pub mod prelude {
    // Client
    pub use crate::client::{ApaasClient, ApaasClientBuilder};

    // Configuration
    pub use crate::config::{ApaasConfig, ApaasConfigBuilder};
    pub use crate::resilience::{LimiterConfig, RetryConfig};

    // Services
    pub use crate::services::{
        AutomationService, AutomationV1Params, AutomationV2Params, DepartmentsService,
        FunctionsService, GlobalListParams, GlobalService, ObjectListFilter, ObjectListParams,
        ObjectsService, PageListParams, PageUrlParams, PagesService,
    };

    // Common types
    pub use crate::batch::{BatchResult, OperationItem};
    pub use crate::pagination::RecordsIteratorResult;
    pub use crate::types::{ApiResponse, FlowOperator, Record};

    // Errors
    pub use crate::errors::{ApaasError, ApaasResult};

    pub use tokio_util::sync::CancellationToken;
}
