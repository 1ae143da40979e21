//! Global options and global variables.

use super::{escape_segment, path_segment};
use crate::client::RequestExecutor;
use crate::errors::{ApaasError, ApaasResult};
use crate::pagination::{Page, PageCursor, PageIterator, RecordsIteratorResult};
use crate::transport::HttpMethod;
use crate::types::{ApiResponse, ListPayload, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Which global resource a [`GlobalService`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalResource {
    /// Global option sets.
    Options,
    /// Global variables.
    Variables,
}

impl GlobalResource {
    fn path_segment(&self) -> &'static str {
        match self {
            GlobalResource::Options => "globalOptions",
            GlobalResource::Variables => "globalVariables",
        }
    }
}

/// Service for global options or global variables.
///
/// Both resources expose the same operations; the client hands out one
/// instance per resource.
pub struct GlobalService {
    executor: Arc<RequestExecutor>,
    resource: GlobalResource,
}

impl GlobalService {
    /// Creates a new global service for `resource`.
    pub(crate) fn new(executor: Arc<RequestExecutor>, resource: GlobalResource) -> Self {
        Self { executor, resource }
    }

    /// The resource this service addresses.
    pub fn resource(&self) -> GlobalResource {
        self.resource
    }

    fn base_path(&self) -> String {
        format!(
            "/api/data/v1/namespaces/{}/{}",
            escape_segment(self.executor.namespace()),
            self.resource.path_segment()
        )
    }

    /// Fetches one option set or variable by API name.
    pub async fn get(&self, cancel: &CancellationToken, api_name: &str) -> ApaasResult<ApiResponse> {
        let path = format!("{}/{}", self.base_path(), path_segment("api_name", api_name)?);
        info!(resource = ?self.resource, api_name, "fetching global detail");
        let response = self
            .executor
            .execute(cancel, HttpMethod::Get, &path, None)
            .await?;
        debug!(resource = ?self.resource, api_name, code = %response.code, "global detail fetched");
        Ok(response)
    }

    /// Fetches one page of the listing.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        params: &GlobalListParams,
    ) -> ApaasResult<ApiResponse> {
        let path = format!("{}/list", self.base_path());
        info!(
            resource = ?self.resource,
            offset = params.offset,
            limit = params.limit,
            "fetching global list"
        );
        self.executor
            .execute_json(cancel, HttpMethod::Post, &path, params)
            .await
    }

    /// Fetches the whole listing, `limit` items per page (zero means 100).
    pub async fn list_with_iterator(
        &self,
        cancel: &CancellationToken,
        limit: u64,
        filter: Option<&Record>,
    ) -> ApaasResult<RecordsIteratorResult> {
        let limit = if limit == 0 { 100 } else { limit };

        PageIterator::offset(limit, |cursor: PageCursor| async move {
            let params = GlobalListParams {
                limit,
                offset: cursor.offset().unwrap_or_default(),
                filter: filter.cloned(),
            };
            let page: ListPayload<Record> = self
                .list(cancel, &params)
                .await?
                .ensure_success()?
                .decode_data_or_default()?;
            info!(
                resource = ?self.resource,
                items = page.items.len(),
                offset = params.offset,
                "global page completed"
            );
            Ok::<_, ApaasError>(Page::from(page))
        })
        .collect_all()
        .await
    }
}

/// Body of the global list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalListParams {
    /// Page size.
    pub limit: u64,
    /// Number of entries to skip.
    pub offset: u64,
    /// Optional filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_paths() {
        assert_eq!(GlobalResource::Options.path_segment(), "globalOptions");
        assert_eq!(GlobalResource::Variables.path_segment(), "globalVariables");
    }

    #[test]
    fn test_list_params_omit_empty_filter() {
        let params = GlobalListParams {
            limit: 100,
            offset: 200,
            filter: None,
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"limit": 100, "offset": 200})
        );
    }
}
