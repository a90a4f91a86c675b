use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::AdminUser;
use crate::db::donations::{DonationFilter, DonationTotals, DonationWithProgram};
use crate::db::models::TransactionStatus;
use crate::db::programs::ProgramStats;
use crate::error::{AppError, FieldError};
use crate::routes::{listing, ok, ok_message, ApiResult};
use crate::scheduler::{schedule_options, ScheduleUpdate};
use crate::validation::{ensure_id, parse_date, Payload};
use crate::{db, AppState};

const RECENT_DONATIONS: u32 = 10;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Dashboard {
    total_donations: i64,
    total_amount: i64,
    recent_donations: Vec<DonationWithProgram>,
    #[serde(flatten)]
    programs: ProgramStats,
}

pub async fn dashboard(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let DonationTotals { count, amount } = db::donations::completed_totals(&state.db, None).await?;
    let recent_donations = db::donations::recent_completed(&state.db, RECENT_DONATIONS).await?;
    let programs = db::programs::program_stats(&state.db).await?;

    Ok(ok(Dashboard {
        total_donations: count,
        total_amount: amount,
        recent_donations,
        programs,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationQuery {
    program_id: Option<String>,
    status: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl DonationQuery {
    fn into_filter(self) -> Result<DonationFilter, AppError> {
        let mut fields = Vec::new();
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let program_id = non_empty(self.program_id);
        if let Some(id) = &program_id {
            ensure_id(id)?;
        }
        let status = match non_empty(self.status) {
            Some(raw) => match raw.parse::<TransactionStatus>() {
                Ok(status) => Some(status),
                Err(_) => {
                    fields.push(FieldError::new(
                        "status",
                        "Status must be pending, completed or failed",
                    ));
                    None
                }
            },
            None => None,
        };
        let start_date = match non_empty(self.start_date) {
            Some(raw) => {
                let parsed = parse_date(&raw);
                if parsed.is_none() {
                    fields.push(FieldError::new("startDate", "Start date must be a valid date"));
                }
                parsed
            }
            None => None,
        };
        let end_date = match non_empty(self.end_date) {
            Some(raw) => {
                let parsed = parse_date(&raw);
                if parsed.is_none() {
                    fields.push(FieldError::new("endDate", "End date must be a valid date"));
                }
                // A bare date covers the whole day.
                let bare_date = raw.trim().len() == 10;
                parsed.map(|d| {
                    if bare_date {
                        d + Duration::days(1) - Duration::milliseconds(1)
                    } else {
                        d
                    }
                })
            }
            None => None,
        };

        if !fields.is_empty() {
            return Err(AppError::invalid_fields(fields));
        }
        Ok(DonationFilter {
            program_id,
            status,
            start_date,
            end_date,
        })
    }
}

pub async fn donations(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<DonationQuery>,
) -> ApiResult {
    let filter = query.into_filter()?;
    let rows = db::donations::list_filtered(&state.db, &filter).await?;
    Ok(listing(rows))
}

pub async fn donors(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let donors = db::donations::donor_summaries(&state.db).await?;
    Ok(listing(donors))
}

pub async fn scheduler_status(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    Ok(ok(state.scheduler.status()))
}

pub async fn scheduler_options(_admin: AdminUser) -> ApiResult {
    Ok(ok(schedule_options()))
}

pub async fn scheduler_config(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Payload(update): Payload<ScheduleUpdate>,
) -> ApiResult {
    let status = state.scheduler.update_config(&update)?;
    tracing::info!(admin_id = %admin.id, schedule = %status.schedule, "Admin changed report schedule");
    let message = format!("Schedule updated: {}", status.schedule);
    Ok(ok_message(status, message))
}

/// Runs the progress-report batch now and reports its outcome.
pub async fn scheduler_trigger(State(state): State<AppState>, AdminUser(admin): AdminUser) -> ApiResult {
    tracing::info!(admin_id = %admin.id, "Manual progress report requested");
    let report = state.scheduler.trigger().await;
    let message = if report.success {
        format!("Progress reports sent to {} donor(s)", report.sent_count)
    } else {
        "Failed to trigger reports".to_string()
    };
    let body = json!({
        "success": report.success,
        "message": message,
        "data": report,
    });
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub async fn scheduler_enable(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    Ok(ok_message(state.scheduler.enable(), "Email scheduler enabled"))
}

pub async fn scheduler_disable(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    Ok(ok_message(state.scheduler.disable(), "Email scheduler disabled"))
}
