//! Builder page metadata.

use super::{escape_segment, path_segment};
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

/// Service for application pages.
pub struct PagesService {
    executor: Arc<RequestExecutor>,
}

impl PagesService {
    /// Creates a new pages service.
    pub(crate) fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    fn base_path(&self) -> String {
        format!(
            "/api/builder/v1/namespaces/{}/meta/pages",
            escape_segment(self.executor.namespace())
        )
    }

    /// Fetches one page of the page listing.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        params: &PageListParams,
    ) -> ApaasResult<ApiResponse> {
        info!(offset = params.offset, limit = params.limit, "fetching pages list");
        let response = self
            .executor
            .execute_json(cancel, HttpMethod::Post, &self.base_path(), params)
            .await?;
        debug!(code = %response.code, "pages list fetched");
        Ok(response)
    }

    /// Fetches every page, `limit` per call (zero means 100).
    pub async fn list_with_iterator(
        &self,
        cancel: &CancellationToken,
        limit: u64,
    ) -> ApaasResult<RecordsIteratorResult> {
        let limit = if limit == 0 { 100 } else { limit };

        PageIterator::offset(limit, |cursor: PageCursor| async move {
            let params = PageListParams {
                limit,
                offset: cursor.offset().unwrap_or_default(),
            };
            let page: ListPayload<Record> = self
                .list(cancel, &params)
                .await?
                .ensure_success()?
                .decode_data_or_default()?;
            Ok::<_, ApaasError>(Page::from(page))
        })
        .collect_all()
        .await
    }

    /// Fetches the detail of one page.
    pub async fn detail(&self, cancel: &CancellationToken, page_id: &str) -> ApaasResult<ApiResponse> {
        let path = format!("{}/{}", self.base_path(), path_segment("page_id", page_id)?);
        info!(page_id, "fetching page detail");
        self.executor
            .execute(cancel, HttpMethod::Get, &path, None)
            .await
    }

    /// Resolves an accessible URL for a page.
    pub async fn url(
        &self,
        cancel: &CancellationToken,
        page_id: &str,
        params: &PageUrlParams,
    ) -> ApaasResult<ApiResponse> {
        let path = format!(
            "{}/{}/link",
            self.base_path(),
            path_segment("page_id", page_id)?
        );
        info!(page_id, "fetching page url");
        self.executor
            .execute_json(cancel, HttpMethod::Post, &path, params)
            .await
    }
}

/// Body of the page listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageListParams {
    /// Page size.
    pub limit: u64,
    /// Number of pages to skip.
    pub offset: u64,
}

/// Options for [`PagesService::url`]; unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUrlParams {
    /// Parameters passed to the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_params: Option<Value>,
    /// Parameters passed to the parent page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_page_params: Option<Value>,
    /// Navigation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nav_id: Option<String>,
    /// Tab id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
}
