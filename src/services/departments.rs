//! Department id exchange.

use crate::client::RequestExecutor;
use crate::errors::{ApaasError, ApaasResult, ResponseError};
use crate::transport::HttpMethod;
use crate::types::Record;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Endpoint translating external department ids.
pub const DEPARTMENTS_PATH: &str = "/api/integration/v2/feishu/getDepartments";

/// Maximum number of ids sent per call by [`DepartmentsService::batch_exchange`].
pub const DEPARTMENT_CHUNK_SIZE: usize = 100;

/// Service translating department ids between id schemes.
pub struct DepartmentsService {
    executor: Arc<RequestExecutor>,
}

impl DepartmentsService {
    /// Creates a new departments service.
    pub(crate) fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Exchanges a single department id.
    pub async fn exchange(
        &self,
        cancel: &CancellationToken,
        id_type: &str,
        department_id: &str,
    ) -> ApaasResult<Record> {
        if department_id.trim().is_empty() {
            return Err(ApaasError::validation("department_id", "must not be empty"));
        }
        info!(department_id, "exchanging department id");

        let ids = [department_id.to_string()];
        self.fetch(cancel, id_type, &ids)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ApaasError::Response(ResponseError::UnexpectedFormat(
                    "department exchange returned no data".to_string(),
                ))
            })
    }

    /// Exchanges any number of department ids, 100 per call.
    ///
    /// The first failing call aborts the whole exchange.
    pub async fn batch_exchange(
        &self,
        cancel: &CancellationToken,
        id_type: &str,
        department_ids: &[String],
    ) -> ApaasResult<Vec<Record>> {
        let mut results = Vec::with_capacity(department_ids.len());
        let chunk_count = (department_ids.len() + DEPARTMENT_CHUNK_SIZE - 1) / DEPARTMENT_CHUNK_SIZE;

        for (index, chunk) in department_ids.chunks(DEPARTMENT_CHUNK_SIZE).enumerate() {
            info!(
                chunk = index + 1,
                chunks = chunk_count,
                size = chunk.len(),
                "exchanging department ids"
            );
            results.extend(self.fetch(cancel, id_type, chunk).await?);
        }

        Ok(results)
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        id_type: &str,
        ids: &[String],
    ) -> ApaasResult<Vec<Record>> {
        let body = ExchangeBody {
            department_id_type: id_type,
            department_ids: ids,
        };
        self.executor
            .execute_data(cancel, HttpMethod::Post, DEPARTMENTS_PATH, &body)
            .await
    }
}

#[derive(Serialize)]
struct ExchangeBody<'a> {
    department_id_type: &'a str,
    department_ids: &'a [String],
}
