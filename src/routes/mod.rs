use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::AppError;

pub mod admin;
pub mod blog;
pub mod certificates;
pub mod donations;
pub mod programs;
pub mod reports;
pub mod transparency;
pub mod users;

pub type ApiResult = Result<Response, AppError>;

/// Success envelope shared by every JSON endpoint.
#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

fn envelope<T: Serialize>(
    status: StatusCode,
    data: T,
    message: Option<String>,
    count: Option<usize>,
) -> Response {
    let body = Envelope {
        success: true,
        data,
        message,
        count,
    };
    (status, Json(body)).into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, data, None, None)
}

pub fn ok_message<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    envelope(StatusCode::OK, data, Some(message.into()), None)
}

pub fn created<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    envelope(StatusCode::CREATED, data, Some(message.into()), None)
}

pub fn listing<T: Serialize>(items: Vec<T>) -> Response {
    let count = items.len();
    envelope(StatusCode::OK, items, None, Some(count))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn not_found() -> Response {
    let body = json!({
        "error": {
            "message": "Route not found",
            "code": "ROUTE_NOT_FOUND",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
