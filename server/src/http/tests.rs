use super::server::router;
use super::state::AppState;
use crate::storage::MemoryConnectorFactory;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

fn create_test_app() -> Router {
    let state = AppState::new(Arc::new(MemoryConnectorFactory::new()), "test-governor", "allconfig");
    router(state)
}

fn connection() -> Value {
    json!({
        "type": "mongodb",
        "host": "localhost",
        "port": 27017,
        "database": "testdb"
    })
}

fn with_connection(extra: Value) -> Value {
    let mut body = connection();
    for (k, v) in extra.as_object().unwrap() {
        body[k.as_str()] = v.clone();
    }
    body
}

async fn send(app: &Router, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => Request::builder().uri(uri).body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn operation(app: &Router, op: Value) -> (StatusCode, Value) {
    send(app, "/allconfig-operation", Some(with_connection(op))).await
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();
    let (status, body) = send(&app, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["service"], "test-governor");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_connection_succeeds() {
    let app = create_test_app();
    let (status, body) = send(&app, "/test-connection", Some(connection())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["connection_status"], "success");
    assert_eq!(body["data"]["database_type"], "mongodb");
    assert_eq!(body["data"]["connected"], true);
}

#[tokio::test]
async fn test_connection_rejects_invalid_descriptor() {
    let app = create_test_app();
    let mut descriptor = connection();
    descriptor["host"] = json!("");
    let (status, body) = send(&app, "/test-connection", Some(descriptor)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("host"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = create_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/allconfig-operation")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON"));
}

#[tokio::test]
async fn test_table_check_before_and_after_create() {
    let app = create_test_app();

    let (status, body) = send(&app, "/allconfig", Some(connection())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "AllConfig table check completed");
    assert_eq!(body["data"]["table_name"], "allconfig");
    assert_eq!(body["data"]["table_exists"], false);
    assert_eq!(body["data"]["create_table_sql"]["type"], "mongodb");

    let (status, body) = operation(&app, json!({"operation": "create_table"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], true);

    let (_, body) = send(&app, "/allconfig", Some(connection())).await;
    assert_eq!(body["data"]["table_exists"], true);
    assert_eq!(body["data"]["config_count"], 0);
    assert!(body["data"].get("create_table_sql").is_none());
}

#[tokio::test]
async fn test_maker_checker_flow() {
    let app = create_test_app();
    operation(&app, json!({"operation": "create_table"})).await;

    let (status, body) = operation(
        &app,
        json!({
            "operation": "submit_create",
            "key": "payment_timeout",
            "value": "30s",
            "description": "gateway timeout",
            "maker_id": "alice"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "AllConfig operation 'submit_create' completed");
    assert_eq!(body["data"]["status"], "submitted_for_approval");
    let request_id = body["data"]["request_id"].as_str().unwrap().to_string();

    let (_, body) = operation(&app, json!({"operation": "read", "key": "payment_timeout"})).await;
    assert!(body["data"].is_null());

    let (_, body) = operation(&app, json!({"operation": "get_pending_approvals"})).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = operation(
        &app,
        json!({
            "operation": "approve_request",
            "request_id": request_id,
            "checker_id": "bob",
            "approval_comment": "approved for release"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["checker_id"], "bob");

    let (_, body) = operation(&app, json!({"operation": "read", "key": "payment_timeout"})).await;
    assert_eq!(body["data"]["config_value"], "30s");
    assert_eq!(body["data"]["checker_id"], "bob");

    let (_, body) = operation(&app, json!({"operation": "get_approval_history"})).await;
    assert_eq!(body["data"][0]["request_id"], request_id);

    let (status, body) = operation(
        &app,
        json!({"operation": "approve_request", "request_id": request_id, "checker_id": "carol"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_self_approval_is_rejected() {
    let app = create_test_app();
    operation(&app, json!({"operation": "create_table"})).await;

    let (_, body) = operation(
        &app,
        json!({"operation": "submit_delete", "key": "k", "maker_id": "alice"}),
    )
    .await;
    let request_id = body["data"]["request_id"].as_str().unwrap().to_string();

    let (status, _) = operation(
        &app,
        json!({"operation": "reject_request", "request_id": request_id, "checker_id": "alice"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_direct_operations_and_search() {
    let app = create_test_app();
    operation(&app, json!({"operation": "create_table"})).await;

    let (status, body) = operation(
        &app,
        json!({
            "operation": "create_batch",
            "config_items": [
                {"key": "db_host", "value": "primary.db"},
                {"key": "db_port", "value": "5432"},
                {"key": "db_host", "value": "dup"}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success_count"], 2);
    assert_eq!(body["data"]["failure_count"], 1);

    let (_, body) = operation(&app, json!({"operation": "search", "search_term": "DB_"})).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = operation(
        &app,
        json!({"operation": "update", "key": "db_port", "value": "6432"}),
    )
    .await;
    assert_eq!(body["success"], true);

    let (_, body) = operation(&app, json!({"operation": "get_config", "key": "db_port"})).await;
    assert_eq!(body["data"]["config_value"], "6432");

    let (_, body) = operation(&app, json!({"operation": "delete_config", "key": "db_port"})).await;
    assert_eq!(body["data"]["rows_affected"], 1);

    let (_, body) = operation(&app, json!({"operation": "count"})).await;
    assert_eq!(body["data"]["count"], 1);
}

#[tokio::test]
async fn test_operation_errors() {
    let app = create_test_app();

    let (status, body) = operation(&app, json!({"operation": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Operation is required");

    let (status, body) = operation(&app, json!({"operation": "explode"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Unsupported operation"));

    let (status, _) = operation(&app, json!({"operation": "submit_create", "key": "k"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = operation(
        &app,
        json!({"operation": "read", "table_name": "bad-name", "key": "k"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_execute_generic_document_operations() {
    let app = create_test_app();

    let (status, body) = send(
        &app,
        "/execute",
        Some(with_connection(json!({
            "operation": "insert",
            "params": {"collection": "users", "document": {"name": "ada", "role": "admin"}}
        }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Operation executed successfully");
    assert_eq!(body["data"]["rows_affected"], 1);

    let (_, body) = send(
        &app,
        "/execute",
        Some(with_connection(json!({
            "operation": "find",
            "params": {"collection": "users", "filter": {"role": "admin"}, "limit": 10}
        }))),
    )
    .await;
    assert_eq!(body["data"][0]["name"], "ada");

    let (status, body) = send(
        &app,
        "/execute",
        Some(with_connection(json!({"operation": "teleport", "params": {"collection": "users"}}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("teleport"));

    let (status, _) = send(
        &app,
        "/execute",
        Some(with_connection(json!({"operation": "query", "query": "SELECT 1"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_method_is_rejected() {
    let app = create_test_app();
    let request = Request::builder()
        .uri("/allconfig")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
