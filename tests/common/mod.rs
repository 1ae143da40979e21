//! Shared helpers for integration tests.

#![allow(dead_code)]

use chrono::Utc;
use integrations_apaas::{ApaasClient, ApaasConfig, Record, RetryConfig};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const NAMESPACE: &str = "package_test__c";

/// Starts a mock server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Answers the app token endpoint with `token`, valid for two hours.
pub async fn mount_token(server: &MockServer, token: &str) {
    let expire_time = (Utc::now() + chrono::Duration::hours(2)).timestamp_millis();
    Mock::given(method("POST"))
        .and(path("/auth/v1/appToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "0",
            "msg": "success",
            "data": {"accessToken": token, "expireTime": expire_time}
        })))
        .mount(server)
        .await;
}

/// Retry policy with millisecond delays so tests stay fast.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        jitter: false,
    }
}

/// Config pointing at `server`, without client-side throttling.
pub fn config(server: &MockServer) -> ApaasConfig {
    ApaasConfig::builder()
        .namespace(NAMESPACE)
        .client_id("c_test")
        .client_secret("s_test")
        .base_url(server.uri())
        .retry(fast_retry(3))
        .disable_rate_limit()
        .build()
        .expect("valid test config")
}

/// Client over reqwest, pointing at `server`.
pub fn client(server: &MockServer) -> ApaasClient {
    ApaasClient::new(config(server)).expect("client")
}

/// Success envelope around `data`.
pub fn envelope(data: Value) -> Value {
    json!({"code": "0", "msg": "success", "data": data})
}

/// `n` records, each with `_id` `id-<i>`.
pub fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let mut record = Record::new();
            record.insert("_id".to_string(), json!(format!("id-{}", i)));
            record.insert("name".to_string(), json!(format!("row {}", i)));
            record
        })
        .collect()
}

/// Per-item results echoing the `_id` of every record in a request body.
pub fn echo_items(body: &Value, success: Option<bool>) -> Value {
    let key = if body.get("ids").is_some() { "ids" } else { "records" };
    let items: Vec<Value> = body[key]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|entry| {
                    let id = entry.get("_id").unwrap_or(entry).clone();
                    match success {
                        Some(flag) => json!({"_id": id, "success": flag}),
                        None => json!({"_id": id}),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    envelope(json!({"items": items}))
}
