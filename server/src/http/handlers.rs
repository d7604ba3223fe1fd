use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    dto::{ApiResponse, ConfigOperationRequest, ExecuteRequest, TableCheckRequest},
    error::{ApiError, ApiResult},
    state::AppState,
};
use crate::storage::{
    ApprovalWorkflow, ConfigOperation, ConfigStore, ConnectionConfig, Connector, GenericOperation,
    StoreError, deadline, dispatch, run_config_operation, run_generic_operation,
};

/// Validates the descriptor, then builds and connects a fresh connector
async fn open(state: &AppState, config: &ConnectionConfig) -> ApiResult<Box<dyn Connector>> {
    config.validate()?;
    let mut connector = state.factory.create(config)?;
    deadline::within(deadline::READ, connector.connect()).await?;
    Ok(connector)
}

async fn close(mut connector: Box<dyn Connector>) {
    if let Err(err) = connector.close().await {
        warn!(backend = %connector.kind(), error = %err, "Failed to close connection");
    }
}

async fn table_check(
    connector: &dyn Connector,
    table: &str,
    database: &str,
) -> Result<Value, StoreError> {
    let store = ConfigStore::new(connector, table)?;
    let report = deadline::within(deadline::READ, store.inspect(Some(database))).await?;
    let mut data = json!({
        "table_name": report.table,
        "table_exists": report.exists,
        "database_type": connector.kind(),
    });
    if let Some(structure) = report.structure {
        data["table_structure"] = json!(structure);
    }
    if let Some(count) = report.count {
        data["config_count"] = json!(count);
    }
    if let Some(artifact) = report.create_table_sql {
        data["create_table_sql"] = artifact;
    }
    Ok(data)
}

async fn config_operation(
    connector: &dyn Connector,
    table: &str,
    operation: &ConfigOperation,
) -> Result<Value, StoreError> {
    let workflow = ApprovalWorkflow::new(ConfigStore::new(connector, table)?);
    let limit = dispatch::deadline_for(&operation.operation);
    deadline::within(limit, run_config_operation(&workflow, operation)).await
}

async fn generic_operation(
    connector: &dyn Connector,
    operation: &GenericOperation,
) -> Result<Value, StoreError> {
    let limit = dispatch::deadline_for(&operation.operation);
    deadline::within(limit, run_generic_operation(connector, operation)).await
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(
        json!({
            "status": "healthy",
            "service": state.app_name,
            "version": env!("CARGO_PKG_VERSION"),
        }),
        "Service is healthy",
    ))
}

/// POST /test-connection
#[instrument(skip_all)]
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConnectionConfig>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(config) = payload?;
    info!(backend = %config.kind, host = %config.host, "Testing connection");

    let connector = open(&state, &config).await?;
    let ping = deadline::within(deadline::READ, connector.ping()).await;
    let connected = connector.is_connected().await;
    let kind = connector.kind();
    close(connector).await;
    ping?;

    Ok(Json(ApiResponse::ok(
        json!({
            "connection_status": "success",
            "database_type": kind,
            "connected": connected,
        }),
        "Database connection successful",
    )))
}

/// POST /execute
#[instrument(skip_all)]
pub async fn execute_operation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(request) = payload?;
    if request.operation.operation.trim().is_empty() {
        return Err(ApiError::BadRequest("Operation is required".to_string()));
    }
    info!(
        backend = %request.connection.kind,
        operation = %request.operation.operation,
        "Executing operation"
    );

    let connector = open(&state, &request.connection).await?;
    let outcome = generic_operation(connector.as_ref(), &request.operation).await;
    close(connector).await;

    Ok(Json(ApiResponse::ok(outcome?, "Operation executed successfully")))
}

/// POST /allconfig
#[instrument(skip_all)]
pub async fn check_table(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TableCheckRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(request) = payload?;
    let table = request
        .table_name
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| state.default_table.clone());
    info!(backend = %request.connection.kind, %table, "Checking config table");

    let connector = open(&state, &request.connection).await?;
    let outcome = table_check(connector.as_ref(), &table, &request.connection.database).await;
    close(connector).await;

    Ok(Json(ApiResponse::ok(outcome?, "AllConfig table check completed")))
}

/// POST /allconfig-operation
#[instrument(skip_all)]
pub async fn config_table_operation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConfigOperationRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(request) = payload?;
    let name = request.operation.operation.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Operation is required".to_string()));
    }
    let table = request
        .table_name
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| state.default_table.clone());
    info!(backend = %request.connection.kind, %table, operation = %name, "Running config operation");

    let connector = open(&state, &request.connection).await?;
    let outcome = config_operation(connector.as_ref(), &table, &request.operation).await;
    close(connector).await;

    Ok(Json(ApiResponse::ok(
        outcome?,
        format!("AllConfig operation '{name}' completed"),
    )))
}
