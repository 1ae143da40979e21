//! Wire types shared across the client.

use crate::errors::{ApaasError, ApaasResult, ApiError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON object as sent to or returned by record endpoints.
pub type Record = serde_json::Map<String, Value>;

/// Application code the API uses for success.
pub const SUCCESS_CODE: &str = "0";

/// Response envelope returned by every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Application code; `"0"` or empty means success.
    #[serde(default)]
    pub code: String,
    /// Human-readable message accompanying the code.
    #[serde(default)]
    pub msg: String,
    /// Endpoint-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Transport details of the exchange that produced this envelope.
    #[serde(skip)]
    pub meta: ResponseMeta,
}

/// Transport details attached to a decoded envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// HTTP status.
    pub status: u16,
    /// Value of the `X-Request-Id` header.
    pub request_id: Option<String>,
    /// HTTP method of the call.
    pub method: String,
    /// Request path of the call.
    pub endpoint: String,
}

impl ApiResponse {
    /// Returns true if the envelope code denotes success.
    pub fn is_success(&self) -> bool {
        is_success_code(&self.code)
    }

    /// Decodes `data` into `T`; a missing or null payload yields `None`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> ApaasResult<Option<T>> {
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| ApaasError::deserialization(e.to_string())),
        }
    }

    /// Decodes `data` into `T`, falling back to `T::default()` when it is absent.
    pub fn decode_data_or_default<T: DeserializeOwned + Default>(&self) -> ApaasResult<T> {
        Ok(self.decode_data()?.unwrap_or_default())
    }

    /// Builds the [`ApiError`] describing this envelope.
    pub fn to_error(&self) -> ApiError {
        ApiError::new(
            self.meta.status,
            self.code.clone(),
            self.msg.clone(),
            self.meta.method.clone(),
            self.meta.endpoint.clone(),
        )
        .with_request_id(self.meta.request_id.clone())
    }

    /// Turns a non-success envelope into an error.
    pub fn ensure_success(self) -> ApaasResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApaasError::Api(self.to_error()))
        }
    }
}

/// Returns true if `code` is the success code or empty.
pub fn is_success_code(code: &str) -> bool {
    code.is_empty() || code == SUCCESS_CODE
}

/// Payload of the app token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponseData {
    /// Issued token.
    #[serde(default)]
    pub access_token: String,
    /// Absolute expiry in epoch milliseconds.
    #[serde(default)]
    pub expire_time: i64,
}

/// A page of items as returned by list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPayload<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Total number of items across all pages.
    #[serde(default)]
    pub total: u64,
    /// Cursor of the next page, empty on the last one.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl<T> Default for ListPayload<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            next_page_token: None,
        }
    }
}

/// Operator on whose behalf an automation flow runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowOperator {
    /// User id.
    #[serde(rename = "_id")]
    pub id: i64,
    /// User email.
    pub email: String,
}
