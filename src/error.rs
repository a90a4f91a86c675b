use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::db::DbError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },
    #[error("Invalid ID format")]
    InvalidId,
    #[error("{0}")]
    Authentication(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("{0}")]
    Authorization(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("A record with this information already exists")]
    Duplicate,
    #[error("{0}")]
    Payment(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

/// Attached to error responses so the logging middleware can report the
/// unredacted cause.
#[derive(Debug, Clone)]
pub struct ErrorSummary {
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn invalid_fields(fields: Vec<FieldError>) -> Self {
        AppError::Validation {
            message: "Validation failed".to_string(),
            fields,
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::InvalidId | AppError::Payment(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Authentication(_) | AppError::InvalidToken | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::Duplicate => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InvalidId => "INVALID_ID",
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::Authorization(_) => "AUTHORIZATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT_ERROR",
            AppError::Duplicate => "DUPLICATE_ERROR",
            AppError::Payment(_) => "PAYMENT_ERROR",
            AppError::BadGateway(_) => "BAD_GATEWAY",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

fn envelope(status: StatusCode, code: &'static str, message: &str, fields: &[FieldError]) -> Response {
    let mut body = json!({
        "error": {
            "message": message,
            "code": code,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    });
    if !fields.is_empty() {
        body["error"]["fields"] = json!(fields);
    }
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = self.to_string();
        let fields: &[FieldError] = match &self {
            AppError::Validation { fields, .. } => fields,
            _ => &[],
        };

        let mut response = envelope(self.status(), code, &message, fields);
        response.extensions_mut().insert(ErrorSummary { code, message });
        response
    }
}

/// Swaps the message of a 500 response for a generic one. The
/// `ErrorSummary` extension keeps the real cause for logging.
pub fn redact_internal(response: Response) -> Response {
    let Some(summary) = response.extensions().get::<ErrorSummary>().cloned() else {
        return response;
    };
    let mut redacted = envelope(
        StatusCode::INTERNAL_SERVER_ERROR,
        summary.code,
        "An unexpected error occurred",
        &[],
    );
    redacted.extensions_mut().insert(summary);
    redacted
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation() {
            return AppError::Duplicate;
        }
        match err {
            DbError::Pool(e) => {
                tracing::error!("Database pool unavailable: {}", e);
                AppError::ServiceUnavailable("Database temporarily unavailable".to_string())
            }
            other => AppError::Internal(format!("Database error: {}", other)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}
