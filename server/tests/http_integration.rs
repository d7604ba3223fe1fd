#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use server::http::{AppState, dto::ApiResponse, router};
use server::storage::MemoryConnectorFactory;
use std::sync::Arc;
use tower::util::ServiceExt;

fn create_test_app() -> Router {
    router(AppState::new(
        Arc::new(MemoryConnectorFactory::new()),
        "integration",
        "allconfig",
    ))
}

fn request(extra: Value) -> Value {
    let mut body = json!({
        "type": "mongodb",
        "host": "localhost",
        "port": 27017,
        "database": "integration",
        "table_name": "team_config"
    });
    for (k, v) in extra.as_object().unwrap() {
        body[k.as_str()] = v.clone();
    }
    body
}

async fn call(app: &Router, op: Value) -> (StatusCode, ApiResponse) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/allconfig-operation")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request(op)).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn data(app: &Router, op: Value) -> Value {
    let (status, body) = call(app, op).await;
    assert_eq!(status, StatusCode::OK, "unexpected failure: {:?}", body.error);
    assert!(body.success);
    body.data.unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_custom_table_lifecycle() {
    let app = create_test_app();

    assert_eq!(data(&app, json!({"operation": "create_table"})).await["table"], "team_config");
    assert_eq!(data(&app, json!({"operation": "create_table"})).await["created"], false);

    let summary = data(
        &app,
        json!({
            "operation": "set_multiple",
            "configs": {"log_level": "info", "max_conn": "25", "region": "eu"},
            "maker_id": "ops"
        }),
    )
    .await;
    assert_eq!(summary["total_items"], 3);
    assert_eq!(summary["success_count"], 3);

    assert_eq!(data(&app, json!({"operation": "count_admin"})).await["count"], 3);

    let filtered = data(
        &app,
        json!({"operation": "filter", "filter": {"key": "region"}}),
    )
    .await;
    assert_eq!(filtered[0]["config_value"], "eu");

    let overwrite = data(
        &app,
        json!({"operation": "set_multiple", "configs": {"region": "us"}}),
    )
    .await;
    assert_eq!(overwrite["success_count"], 1);
    let region = data(&app, json!({"operation": "get_config", "key": "region"})).await;
    assert_eq!(region["config_value"], "us");
    assert_eq!(data(&app, json!({"operation": "count_admin"})).await["count"], 3);

    let paged = data(
        &app,
        json!({"operation": "read_all", "limit": 2, "offset": 1}),
    )
    .await;
    let keys: Vec<_> = paged
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["config_key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["max_conn", "region"]);

    let updated = data(
        &app,
        json!({
            "operation": "update_batch",
            "config_items": [
                {"key": "log_level", "value": "debug"},
                {"key": "new_key", "value": "fresh", "description": "added by batch"}
            ]
        }),
    )
    .await;
    assert_eq!(updated["success_count"], 2);
    assert_eq!(data(&app, json!({"operation": "count"})).await["count"], 4);

    let deleted = data(
        &app,
        json!({
            "operation": "delete_batch",
            "config_items": [{"key": "log_level"}, {"key": "region"}]
        }),
    )
    .await;
    assert_eq!(deleted["success_count"], 2);

    let exists = data(&app, json!({"operation": "exists_admin", "key": "region"})).await;
    assert_eq!(exists, json!({"exists": false, "key": "region"}));

    data(&app, json!({"operation": "delete_all"})).await;
    assert_eq!(data(&app, json!({"operation": "count_admin"})).await["count"], 0);

    assert_eq!(data(&app, json!({"operation": "drop_table"})).await["dropped"], true);
}

#[tokio::test]
async fn test_requests_per_maker_and_history() {
    let app = create_test_app();
    data(&app, json!({"operation": "create_table"})).await;
    data(
        &app,
        json!({"operation": "direct_create", "key": "quota", "value": "10", "description": "per user"}),
    )
    .await;

    let update = data(
        &app,
        json!({"operation": "submit_update", "key": "quota", "value": "20", "maker_id": "alice"}),
    )
    .await;
    let delete = data(
        &app,
        json!({"operation": "submit_delete", "key": "quota", "maker_id": "bob"}),
    )
    .await;

    let mine = data(&app, json!({"operation": "get_my_requests", "maker_id": "alice"})).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["previous_value"], "10");
    assert_eq!(mine[0]["operation"], "update");

    let (status, body) = call(&app, json!({"operation": "get_my_requests"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.error.unwrap().contains("maker_id"));

    data(
        &app,
        json!({
            "operation": "approve_request",
            "request_id": update["request_id"],
            "checker_id": "bob"
        }),
    )
    .await;
    let entry = data(&app, json!({"operation": "read_admin", "key": "quota"})).await;
    assert_eq!(entry["config_value"], "20");
    assert_eq!(entry["description"], "per user");

    let rejected = data(
        &app,
        json!({
            "operation": "reject_request",
            "request_id": delete["request_id"],
            "checker_id": "alice",
            "approval_comment": "keep it"
        }),
    )
    .await;
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["approval_comment"], "keep it");

    assert!(data(&app, json!({"operation": "get_pending_approvals"})).await.as_array().unwrap().is_empty());
    let history = data(&app, json!({"operation": "get_approval_history", "limit": 5})).await;
    assert_eq!(history.as_array().unwrap().len(), 2);

    let search = data(&app, json!({"operation": "search_admin", "search_term": "USER"})).await;
    assert_eq!(search[0]["config_key"], "quota");
}

#[tokio::test]
async fn test_tables_are_isolated_by_name() {
    let app = create_test_app();
    data(&app, json!({"operation": "create_table"})).await;
    data(&app, json!({"operation": "create_table", "table_name": "other_config"})).await;

    data(&app, json!({"operation": "create", "key": "shared", "value": "a"})).await;
    let other = data(
        &app,
        json!({"operation": "get_config", "key": "shared", "table_name": "other_config"}),
    )
    .await;
    assert!(other.is_null());
}
