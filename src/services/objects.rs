//! Object (data table) metadata and record operations.

use super::{escape_segment, path_segment};
use crate::batch::{self, run_batches, BatchOperation, BatchResult};
use crate::client::RequestExecutor;
use crate::errors::{ApaasError, ApaasResult};
use crate::pagination::{Page, PageCursor, PageIterator, RecordsIteratorResult};
use crate::transport::HttpMethod;
use crate::types::{ApiResponse, ListPayload, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Service for objects and their records.
pub struct ObjectsService {
    executor: Arc<RequestExecutor>,
}

impl ObjectsService {
    /// Creates a new objects service.
    pub(crate) fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    fn namespace(&self) -> String {
        escape_segment(self.executor.namespace())
    }

    fn meta_path(&self, object_name: &str) -> ApaasResult<String> {
        Ok(format!(
            "/api/data/v1/namespaces/{}/meta/objects/{}",
            self.namespace(),
            path_segment("object_name", object_name)?
        ))
    }

    fn records_path(&self, object_name: &str) -> ApaasResult<String> {
        Ok(format!(
            "/v1/data/namespaces/{}/objects/{}",
            self.namespace(),
            path_segment("object_name", object_name)?
        ))
    }

    fn record_path(&self, object_name: &str, record_id: &str) -> ApaasResult<String> {
        Ok(format!(
            "{}/records/{}",
            self.records_path(object_name)?,
            path_segment("record_id", record_id)?
        ))
    }

    /// Lists the objects of the namespace.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        params: &ObjectListParams,
    ) -> ApaasResult<ApiResponse> {
        let path = format!(
            "/api/data/v1/namespaces/{}/meta/objects/list",
            self.namespace()
        );
        info!(offset = params.offset, limit = params.limit, "listing objects");
        self.executor
            .execute_json(cancel, HttpMethod::Post, &path, params)
            .await
    }

    /// Fetches the metadata of one field.
    pub async fn field(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        field_name: &str,
    ) -> ApaasResult<ApiResponse> {
        let path = format!(
            "{}/fields/{}",
            self.meta_path(object_name)?,
            path_segment("field_name", field_name)?
        );
        let response = self
            .executor
            .execute(cancel, HttpMethod::Get, &path, None)
            .await?;
        debug!(object = object_name, field = field_name, code = %response.code, "field metadata fetched");
        Ok(response)
    }

    /// Fetches the metadata of every field of an object.
    pub async fn fields(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
    ) -> ApaasResult<ApiResponse> {
        let path = self.meta_path(object_name)?;
        let response = self
            .executor
            .execute(cancel, HttpMethod::Get, &path, None)
            .await?;
        debug!(object = object_name, code = %response.code, "fields metadata fetched");
        Ok(response)
    }

    /// Fetches one record, restricted to the `select`ed fields.
    pub async fn record(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        record_id: &str,
        select: &[String],
    ) -> ApaasResult<ApiResponse> {
        let path = self.record_path(object_name, record_id)?;
        info!(object = object_name, record_id, "querying record");
        self.executor
            .execute_json(cancel, HttpMethod::Post, &path, &SelectBody { select })
            .await
    }

    /// Runs a record query; the server returns at most 100 records per call.
    pub async fn records(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        query: &Record,
    ) -> ApaasResult<ApiResponse> {
        let path = format!("{}/records_query", self.records_path(object_name)?);
        let response = self
            .executor
            .execute_json(cancel, HttpMethod::Post, &path, query)
            .await?;
        debug!(object = object_name, code = %response.code, "records queried");
        Ok(response)
    }

    /// Runs a record query across every page, following `next_page_token`.
    pub async fn records_with_iterator(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        query: &Record,
    ) -> ApaasResult<RecordsIteratorResult> {
        let result = PageIterator::token(|cursor: PageCursor| async move {
            let mut payload = query.clone();
            let token = cursor.token().unwrap_or_default().to_string();
            payload.insert("page_token".to_string(), Value::String(token));

            let page: ListPayload<Record> = self
                .records(cancel, object_name, &payload)
                .await?
                .ensure_success()?
                .decode_data_or_default()?;
            info!(
                object = object_name,
                items = page.items.len(),
                next = page.next_page_token.as_deref().unwrap_or(""),
                "records page completed"
            );
            Ok::<_, ApaasError>(Page::from(page))
        })
        .collect_all()
        .await?;

        Ok(result)
    }

    /// Creates one record.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        record: &Record,
    ) -> ApaasResult<ApiResponse> {
        let path = format!("{}/records", self.records_path(object_name)?);
        info!(object = object_name, "creating record");
        self.executor
            .execute_json(cancel, HttpMethod::Post, &path, &RecordBody { record })
            .await
    }

    /// Creates up to 100 records in one call.
    pub async fn create_batch(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        records: &[Record],
    ) -> ApaasResult<ApiResponse> {
        let path = format!("{}/records_batch", self.records_path(object_name)?);
        info!(object = object_name, count = records.len(), "creating records");
        self.executor
            .execute_json(cancel, HttpMethod::Post, &path, &RecordsBody { records })
            .await
    }

    /// Creates any number of records, `chunk_size` per call (zero means 100).
    ///
    /// Items the server returns without a `success` flag count as created.
    pub async fn create_with_iterator(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        records: Option<&[Record]>,
        chunk_size: usize,
    ) -> ApaasResult<BatchResult> {
        let path = format!("{}/records_batch", self.records_path(object_name)?);
        let path = path.as_str();
        run_batches(records, chunk_size, BatchOperation::Create, batch::record_id, |chunk| async move {
            self.executor
                .execute_json(cancel, HttpMethod::Post, path, &RecordsBody { records: chunk })
                .await
        })
        .await
    }

    /// Updates one record.
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        record_id: &str,
        record: &Record,
    ) -> ApaasResult<ApiResponse> {
        let path = self.record_path(object_name, record_id)?;
        info!(object = object_name, record_id, "updating record");
        self.executor
            .execute_json(cancel, HttpMethod::Patch, &path, &RecordBody { record })
            .await
    }

    /// Updates up to 100 records in one call; each record carries its `_id`.
    pub async fn update_batch(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        records: &[Record],
    ) -> ApaasResult<ApiResponse> {
        let path = format!("{}/records_batch", self.records_path(object_name)?);
        info!(object = object_name, count = records.len(), "updating records");
        self.executor
            .execute_json(cancel, HttpMethod::Patch, &path, &RecordsBody { records })
            .await
    }

    /// Updates any number of records, `chunk_size` per call (zero means 100).
    ///
    /// Items the server returns without a `success` flag count as failed.
    pub async fn update_with_iterator(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        records: Option<&[Record]>,
        chunk_size: usize,
    ) -> ApaasResult<BatchResult> {
        let path = format!("{}/records_batch", self.records_path(object_name)?);
        let path = path.as_str();
        run_batches(records, chunk_size, BatchOperation::Update, batch::record_id, |chunk| async move {
            self.executor
                .execute_json(cancel, HttpMethod::Patch, path, &RecordsBody { records: chunk })
                .await
        })
        .await
    }

    /// Deletes one record.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        record_id: &str,
    ) -> ApaasResult<ApiResponse> {
        let path = self.record_path(object_name, record_id)?;
        info!(object = object_name, record_id, "deleting record");
        self.executor
            .execute(cancel, HttpMethod::Delete, &path, None)
            .await
    }

    /// Deletes up to 100 records in one call.
    pub async fn delete_batch(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        ids: &[String],
    ) -> ApaasResult<ApiResponse> {
        let path = format!("{}/records_batch", self.records_path(object_name)?);
        info!(object = object_name, count = ids.len(), "deleting records");
        self.executor
            .execute_json(cancel, HttpMethod::Delete, &path, &IdsBody { ids })
            .await
    }

    /// Deletes any number of records, `chunk_size` ids per call (zero means 100).
    ///
    /// Items the server returns without a `success` flag count as failed.
    pub async fn delete_with_iterator(
        &self,
        cancel: &CancellationToken,
        object_name: &str,
        ids: Option<&[String]>,
        chunk_size: usize,
    ) -> ApaasResult<BatchResult> {
        let path = format!("{}/records_batch", self.records_path(object_name)?);
        let path = path.as_str();
        run_batches(
            ids,
            chunk_size,
            BatchOperation::Delete,
            |id: &String| Some(id.clone()),
            |chunk| async move {
                self.executor
                    .execute_json(cancel, HttpMethod::Delete, path, &IdsBody { ids: chunk })
                    .await
            },
        )
        .await
    }
}

// Request types

/// Parameters for listing objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectListParams {
    /// Number of objects to skip.
    pub offset: u64,
    /// Optional filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ObjectListFilter>,
    /// Maximum number of objects to return.
    pub limit: u64,
}

/// Filter for [`ObjectsService::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListFilter {
    /// Object type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// Fuzzy match on object names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_query: Option<String>,
}

#[derive(Serialize)]
struct SelectBody<'a> {
    select: &'a [String],
}

#[derive(Serialize)]
struct RecordBody<'a> {
    record: &'a Record,
}

#[derive(Serialize)]
struct RecordsBody<'a> {
    records: &'a [Record],
}

#[derive(Serialize)]
struct IdsBody<'a> {
    ids: &'a [String],
}
