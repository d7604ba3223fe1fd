use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::dto::ApiResponse;
use crate::storage::StoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Store(StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(err) => match err {
                StoreError::Validation(_) | StoreError::UnsupportedOperation { .. } => {
                    StatusCode::BAD_REQUEST
                }
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Connection { .. } => StatusCode::BAD_GATEWAY,
                StoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                StoreError::NotConnected(_) | StoreError::Backend { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Store(err) => err.to_string(),
        };
        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid JSON: {}", rejection.body_text()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
