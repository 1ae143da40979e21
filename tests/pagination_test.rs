//! Iterator-style listings against a mock server.

mod common;

use common::*;
use integrations_apaas::ApaasError;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, Request, ResponseTemplate};

fn query_path() -> String {
    format!("/v1/data/namespaces/{}/objects/object_store/records_query", NAMESPACE)
}

async fn mount_token_page(server: &wiremock::MockServer, token: &str, items: Value, next: &str) {
    Mock::given(method("POST"))
        .and(path(query_path()))
        .and(body_partial_json(json!({"page_token": token})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "items": items,
            "total": 5,
            "next_page_token": next
        }))))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_records_follow_page_tokens() {
    let server = setup_mock_server().await;
    mount_token(&server, "t-page").await;
    mount_token_page(&server, "", json!([{"_id": "1"}, {"_id": "2"}]), "p2").await;
    mount_token_page(&server, "p2", json!([{"_id": "3"}, {"_id": "4"}]), "p3").await;
    mount_token_page(&server, "p3", json!([{"_id": "5"}]), "").await;

    let client = client(&server);
    let mut query = integrations_apaas::Record::new();
    query.insert("page_size".to_string(), json!(2));

    let result = client
        .objects()
        .records_with_iterator(&CancellationToken::new(), "object_store", &query)
        .await
        .unwrap();

    assert_eq!(result.total, 5);
    let ids: Vec<&str> = result
        .items
        .iter()
        .map(|item| item["_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

    let requests = server.received_requests().await.unwrap();
    let last: Value = serde_json::from_slice(&requests.last().unwrap().body).unwrap();
    assert_eq!(last, json!({"page_size": 2, "page_token": "p3"}));
}

#[tokio::test]
async fn test_global_options_walk_offsets_until_total() {
    let server = setup_mock_server().await;
    mount_token(&server, "t-global").await;
    Mock::given(method("POST"))
        .and(path(format!(
            "/api/data/v1/namespaces/{}/globalOptions/list",
            NAMESPACE
        )))
        .respond_with(|req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            let offset = body["offset"].as_u64().unwrap();
            let limit = body["limit"].as_u64().unwrap();
            let items: Vec<Value> = (offset..(offset + limit).min(250))
                .map(|i| json!({"api_name": format!("option_{}", i)}))
                .collect();
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({"items": items, "total": 250})))
        })
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server);
    let result = client
        .global_options()
        .list_with_iterator(&CancellationToken::new(), 100, None)
        .await
        .unwrap();

    assert_eq!(result.total, 250);
    assert_eq!(result.items.len(), 250);
    assert_eq!(result.items[249]["api_name"], json!("option_249"));
}

#[tokio::test]
async fn test_pages_stop_on_empty_page() {
    let server = setup_mock_server().await;
    mount_token(&server, "t-pages").await;
    let pages_path = format!("/api/builder/v1/namespaces/{}/meta/pages", NAMESPACE);
    Mock::given(method("POST"))
        .and(path(pages_path.clone()))
        .and(body_partial_json(json!({"offset": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "items": [{"id": "p1"}],
            "total": 10
        }))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(pages_path))
        .and(body_partial_json(json!({"offset": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "items": [],
            "total": 10
        }))))
        .mount(&server)
        .await;

    let client = client(&server);
    let result = client
        .pages()
        .list_with_iterator(&CancellationToken::new(), 1)
        .await
        .unwrap();

    assert_eq!(result.total, 10);
    assert_eq!(result.items.len(), 1);
}

#[tokio::test]
async fn test_error_mid_iteration_aborts() {
    let server = setup_mock_server().await;
    mount_token(&server, "t-err").await;
    mount_token_page(&server, "", json!([{"_id": "1"}]), "p2").await;
    Mock::given(method("POST"))
        .and(path(query_path()))
        .and(body_partial_json(json!({"page_token": "p2"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": "k_ec_000004", "msg": "invalid page token"})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let result = client
        .objects()
        .records_with_iterator(
            &CancellationToken::new(),
            "object_store",
            &integrations_apaas::Record::new(),
        )
        .await;

    match result {
        Err(ApaasError::Api(err)) => {
            assert_eq!(err.code, "k_ec_000004");
            assert_eq!(err.message, "invalid page token");
            assert_eq!(err.method, "POST");
            assert_eq!(err.endpoint, query_path());
        }
        other => panic!("unexpected: {:?}", other),
    }
}
