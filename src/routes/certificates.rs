use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::certificates::is_safe_filename;
use crate::db::models::{Certificate, CertificateType};
use crate::error::AppError;
use crate::routes::{ok, ApiResult};
use crate::validation::ensure_id;
use crate::{db, AppState};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateSummary {
    certificate_type: CertificateType,
    #[serde(rename = "certificateURL")]
    certificate_url: String,
    issued_date: chrono::DateTime<chrono::Utc>,
}

impl From<Certificate> for CertificateSummary {
    fn from(c: Certificate) -> Self {
        Self {
            certificate_type: c.certificate_type,
            certificate_url: c.certificate_url,
            issued_date: c.issued_date,
        }
    }
}

/// Certificates of one donation; visible to its donor and to admins.
pub async fn for_donation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(donation_id): Path<String>,
) -> ApiResult {
    ensure_id(&donation_id)?;
    let donation = db::donations::find_donation(&state.db, &donation_id)
        .await?
        .ok_or_else(|| AppError::not_found("Donation"))?;

    if donation.user_id != user.id && !user.is_admin() {
        return Err(AppError::Authorization(
            "You do not have permission to access this certificate".to_string(),
        ));
    }

    let certificates = db::certificates::list_for_donation(&state.db, &donation_id).await?;
    if certificates.is_empty() {
        return Err(AppError::not_found("Certificate"));
    }
    let summaries: Vec<CertificateSummary> = certificates.into_iter().map(Into::into).collect();
    Ok(ok(summaries))
}

pub async fn download(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Response, AppError> {
    if !is_safe_filename(&filename) {
        return Err(AppError::validation("Invalid certificate filename"));
    }

    let bytes = state
        .certificates
        .read(&filename)
        .await
        .map_err(|e| {
            tracing::error!(filename = %filename, "Certificate read failed: {}", e);
            AppError::Internal("Failed to read certificate".to_string())
        })?
        .ok_or_else(|| AppError::not_found("Certificate"))?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|_| AppError::validation("Invalid certificate filename"))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
