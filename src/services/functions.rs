//! Cloud function invocation.

use super::{escape_segment, path_segment};
use crate::client::RequestExecutor;
use crate::errors::ApaasResult;
use crate::transport::HttpMethod;
use crate::types::ApiResponse;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Service for cloud functions.
pub struct FunctionsService {
    executor: Arc<RequestExecutor>,
}

impl FunctionsService {
    /// Creates a new functions service.
    pub(crate) fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Invokes the cloud function `name` with `params`.
    pub async fn invoke(
        &self,
        cancel: &CancellationToken,
        name: &str,
        params: &Value,
    ) -> ApaasResult<ApiResponse> {
        let path = format!(
            "/api/cloudfunction/v1/namespaces/{}/invoke/{}",
            escape_segment(self.executor.namespace()),
            path_segment("name", name)?
        );
        info!(function = name, "invoking cloud function");
        let response = self
            .executor
            .execute_json(cancel, HttpMethod::Post, &path, &InvokeBody { params })
            .await?;
        debug!(function = name, code = %response.code, "cloud function invoked");
        Ok(response)
    }
}

#[derive(Serialize)]
struct InvokeBody<'a> {
    params: &'a Value,
}
