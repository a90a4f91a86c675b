use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::auth;
use crate::error::{self, AppError, ErrorSummary};
use crate::AppState;

const MAX_LOGGED_BODY: usize = 1024 * 1024;

/// Replaces every `password` field, at any depth, before the body is logged.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if key.eq_ignore_ascii_case("password") {
                    *field = Value::String("[REDACTED]".to_string());
                } else {
                    redact(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

fn loggable_body(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "{}".to_string();
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(mut json) => {
            redact(&mut json);
            json.to_string()
        }
        Err(_) => format!("<{} bytes, not JSON>", bytes.len()),
    }
}

/// Logs the context of every error response the API produces.
pub async fn log_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_id = auth::bearer_token(req.headers())
        .and_then(|token| auth::verify_token(&state.config.jwt_secret, token).ok())
        .map(|user| user.id)
        .unwrap_or_else(|| "anonymous".to_string());

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(%method, %path, "Rejected unreadable request body: {}", e);
            return AppError::validation("Request body is too large or unreadable").into_response();
        }
    };
    let req = Request::from_parts(parts, Body::from(bytes.clone()));

    let response = next.run(req).await;

    if let Some(summary) = response.extensions().get::<ErrorSummary>() {
        let status = response.status();
        let body = loggable_body(&bytes);
        let timestamp = chrono::Utc::now().to_rfc3339();
        if status.is_server_error() {
            tracing::error!(
                %method, %path, user = %user_id, %timestamp, code = summary.code, body = %body,
                "Request failed: {}", summary.message
            );
        } else {
            tracing::warn!(
                %method, %path, user = %user_id, %timestamp, code = summary.code, body = %body,
                "Request rejected: {}", summary.message
            );
        }
    }

    hide_internal_details(response, state.config.is_production())
}

fn hide_internal_details(response: Response, production: bool) -> Response {
    if production && response.status() == StatusCode::INTERNAL_SERVER_ERROR {
        error::redact_internal(response)
    } else {
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passwords_are_redacted_at_any_depth() {
        let mut body = json!({
            "email": "donor@example.org",
            "password": "hunter22",
            "nested": { "Password": "x", "items": [{ "password": "y" }] }
        });
        redact(&mut body);
        assert_eq!(body["password"], "[REDACTED]");
        assert_eq!(body["nested"]["Password"], "[REDACTED]");
        assert_eq!(body["nested"]["items"][0]["password"], "[REDACTED]");
        assert_eq!(body["email"], "donor@example.org");
    }

    async fn message_of(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: Value = serde_json::from_slice(&bytes).expect("json");
        json["error"]["message"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn production_hides_internal_messages_only() {
        let internal = || AppError::Internal("Database error: no such table".into()).into_response();

        let shown = hide_internal_details(internal(), false);
        assert_eq!(message_of(shown).await, "Database error: no such table");

        let hidden = hide_internal_details(internal(), true);
        assert_eq!(hidden.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message_of(hidden).await, "An unexpected error occurred");

        let conflict = AppError::Conflict("Program with this name already exists".into()).into_response();
        let kept = hide_internal_details(conflict, true);
        assert_eq!(message_of(kept).await, "Program with this name already exists");
    }

    #[test]
    fn non_json_bodies_are_summarised() {
        assert_eq!(loggable_body(b""), "{}");
        assert_eq!(loggable_body(b"not json"), "<8 bytes, not JSON>");
        assert!(!loggable_body(br#"{"password":"p"}"#).contains("\"p\""));
    }
}
