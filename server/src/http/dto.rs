use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{ConfigOperation, ConnectionConfig, GenericOperation};

/// Envelope for every response, success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ApiResponse {
    pub fn ok(data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(flatten)]
    pub operation: GenericOperation,
}

/// Body of `POST /allconfig`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCheckRequest {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// Falls back to the server's default table
    #[serde(default)]
    pub table_name: Option<String>,
}

/// Body of `POST /allconfig-operation`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOperationRequest {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(flatten)]
    pub operation: ConfigOperation,
}
