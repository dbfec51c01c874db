// crates/backend-lib/src/error.rs

//! Central error type + response translation.
use axum::http::StatusCode;
use lms_common::MessageResponse;
use thiserror::Error;

use crate::store::StoreError;

/// Message shown to clients for every internal failure
pub const INTERNAL_MESSAGE: &str = "Erro de servidor";

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed, missing or mistyped input
    #[error("{0}")]
    Validation(String),

    /// Request could not be read or parsed at all
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotAuthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("rate-limit")]
    RateLimited {
        /// Seconds until the client's window resets
        retry_after: u64,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn not_authorized() -> Self {
        AppError::NotAuthorized("Não autorizado".to_string())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("Sem permissão".to_string())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Store(_) | AppError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VAL_001",
            AppError::BadRequest(_) => "REQ_001",
            AppError::NotAuthorized(_) => "AUTH_001",
            AppError::Forbidden(_) => "AUTH_002",
            AppError::NotFound(_) => "NF_001",
            AppError::Conflict(_) => "CONFLICT_001",
            AppError::PayloadTooLarge(_) => "REQ_002",
            AppError::RateLimited { .. } => "RATE_001",
            AppError::Internal(_) => "INT_001",
            AppError::Store(_) => "INT_002",
            AppError::Json(_) => "INT_003",
        }
    }

    /// Failures the client must never see the details of
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Body sent to the client. Internal details are replaced by a generic message.
    pub fn to_body(&self) -> MessageResponse {
        let message = if self.is_internal() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };
        MessageResponse {
            message,
            code: Some(self.error_code().to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task failed: {err}"))
    }
}
