use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Wallet(String),

    #[error("Ledger RPC error: {0}")]
    Rpc(String),

    #[error("Payment verification failed: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            CheckoutError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            CheckoutError::Wallet(_) => (StatusCode::BAD_REQUEST, "WALLET_ERROR"),
            CheckoutError::Rpc(_) => (StatusCode::BAD_GATEWAY, "LEDGER_RPC_ERROR"),
            CheckoutError::Backend(_) => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
            CheckoutError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            CheckoutError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
