use axum::extract::{Path, State};
use serde::Deserialize;

use crate::auth::AdminUser;
use crate::error::AppError;
use crate::routes::{created, listing, ok, ApiResult};
use crate::validation::{ensure_id, is_http_url, Checks, Payload};
use crate::{db, AppState};

pub async fn list(State(state): State<AppState>) -> ApiResult {
    let reports = db::reports::list_reports(&state.db).await?;
    Ok(listing(reports))
}

pub async fn latest_for_program(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
) -> ApiResult {
    ensure_id(&program_id)?;
    let report = db::reports::latest_for_program(&state.db, &program_id)
        .await?
        .ok_or_else(|| AppError::not_found("Report for this program"))?;
    Ok(ok(report))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    program_id: Option<String>,
    #[serde(rename = "reportFileURL", alias = "reportFileUrl")]
    report_file_url: Option<String>,
    funds_received: Option<i64>,
    funds_utilized: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Payload(req): Payload<ReportRequest>,
) -> ApiResult {
    let url = req.report_file_url.as_deref().unwrap_or_default().trim().to_string();
    let received = req.funds_received.unwrap_or(-1);
    let utilized = req.funds_utilized.unwrap_or(-1);

    Checks::new()
        .require(req.program_id.is_some(), "programId", "Program ID is required")
        .require(is_http_url(&url), "reportFileURL", "Report file URL must be a valid URL")
        .require(received >= 0, "fundsReceived", "Funds received must be a positive number")
        .require(utilized >= 0, "fundsUtilized", "Funds utilized must be a positive number")
        .require(
            utilized <= received,
            "fundsUtilized",
            "Funds utilized cannot exceed funds received",
        )
        .finish()?;

    let program_id = req.program_id.unwrap_or_default();
    ensure_id(&program_id)?;
    if db::programs::find_program(&state.db, &program_id).await?.is_none() {
        return Err(AppError::not_found("Program"));
    }

    let report = db::reports::create_report(&state.db, &program_id, &url, received, utilized).await?;
    tracing::info!(report_id = %report.id, program_id = %program_id, admin_id = %admin.id, "Impact report uploaded");
    Ok(created(report, "Report uploaded successfully"))
}
