//! Automation flow execution.

use super::{escape_segment, path_segment};
use crate::client::RequestExecutor;
use crate::errors::ApaasResult;
use crate::transport::HttpMethod;
use crate::types::{ApiResponse, FlowOperator, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Service for automation flows.
pub struct AutomationService {
    executor: Arc<RequestExecutor>,
}

impl AutomationService {
    /// Creates a new automation service.
    pub(crate) fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    fn namespace(&self) -> String {
        escape_segment(self.executor.namespace())
    }

    /// Runs a flow through the v1 endpoint.
    pub async fn execute_v1(
        &self,
        cancel: &CancellationToken,
        flow_api_name: &str,
        params: &AutomationV1Params,
    ) -> ApaasResult<ApiResponse> {
        let path = format!(
            "/api/flow/v1/namespaces/{}/flows/{}/execute",
            self.namespace(),
            path_segment("flow_api_name", flow_api_name)?
        );
        info!(flow = flow_api_name, "executing flow (v1)");
        let response = self
            .executor
            .execute_json(cancel, HttpMethod::Post, &path, params)
            .await?;
        debug!(flow = flow_api_name, code = %response.code, "flow executed (v1)");
        Ok(response)
    }

    /// Runs a flow through the v2 endpoint.
    pub async fn execute_v2(
        &self,
        cancel: &CancellationToken,
        flow_api_name: &str,
        params: &AutomationV2Params,
    ) -> ApaasResult<ApiResponse> {
        let path = format!(
            "/v2/namespaces/{}/flows/{}/execute",
            self.namespace(),
            path_segment("flow_api_name", flow_api_name)?
        );
        info!(flow = flow_api_name, resubmit = ?params.is_resubmit, "executing flow (v2)");
        let response = self
            .executor
            .execute_json(cancel, HttpMethod::Post, &path, params)
            .await?;
        debug!(flow = flow_api_name, code = %response.code, "flow executed (v2)");
        Ok(response)
    }
}

/// Body of a v1 flow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationV1Params {
    /// User the flow runs as.
    pub operator: FlowOperator,
    /// Flow input.
    #[serde(default)]
    pub params: Record,
}

/// Body of a v2 flow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationV2Params {
    /// User the flow runs as.
    pub operator: FlowOperator,
    /// Flow input.
    #[serde(default)]
    pub params: Record,
    /// Resubmits a previous instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_resubmit: Option<bool>,
    /// Instance being resubmitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_instance_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_v2_params_serialization() {
        let params = AutomationV2Params {
            operator: FlowOperator {
                id: 7,
                email: "ops@example.com".to_string(),
            },
            params: Record::new(),
            is_resubmit: Some(true),
            pre_instance_id: None,
        };

        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "operator": {"_id": 7, "email": "ops@example.com"},
                "params": {},
                "is_resubmit": true
            })
        );
    }
}
