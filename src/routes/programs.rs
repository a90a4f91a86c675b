use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::db::models::{Program, ProgramStatus};
use crate::db::programs::{FundsUpdate, NewProgram};
use crate::error::AppError;
use crate::routes::{created, listing, ok, ok_message, ApiResult};
use crate::validation::{ensure_id, parse_date, Checks, Payload};
use crate::{db, AppState};

/// A program as exposed over the API, with its utilization percentage.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramView {
    #[serde(flatten)]
    pub program: Program,
    pub utilization_rate: f64,
}

pub fn two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl From<Program> for ProgramView {
    fn from(program: Program) -> Self {
        let utilization_rate = two_decimals(program.utilization_rate());
        Self {
            program,
            utilization_rate,
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    status: Option<String>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<ProgramStatus>().map_err(|_| {
            AppError::validation("Status must be active, completed or archived")
        })?),
        None => None,
    };
    let programs = db::programs::list_programs(&state.db, status).await?;
    Ok(listing(programs.into_iter().map(ProgramView::from).collect()))
}

async fn load(state: &AppState, id: &str) -> Result<Program, AppError> {
    ensure_id(id)?;
    db::programs::find_program(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Program"))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let program = load(&state, &id).await?;
    Ok(ok(ProgramView::from(program)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRequest {
    #[serde(alias = "name")]
    program_name: Option<String>,
    description: Option<String>,
    target_amount: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
    status: Option<ProgramStatus>,
}

struct ProgramFields {
    name: String,
    description: String,
    target_amount: i64,
    start_date: Option<chrono::DateTime<chrono::Utc>>,
    end_date: Option<chrono::DateTime<chrono::Utc>>,
    status: ProgramStatus,
}

/// Validates the merged field set so a partial update is judged the same way
/// as a create.
fn check_fields(req: &ProgramRequest, fields: &ProgramFields) -> Result<(), AppError> {
    let mut checks = Checks::new();
    checks
        .char_len(&fields.name, "programName", 3, 200)
        .char_len(&fields.description, "description", 10, 2000)
        .require(
            fields.target_amount >= 0,
            "targetAmount",
            "Target amount must be a positive number",
        )
        .require(
            fields.start_date.is_some(),
            "startDate",
            "Start date must be a valid date",
        );
    if let Some(raw) = req.end_date.as_deref().filter(|s| !s.is_empty()) {
        checks.require(
            parse_date(raw).is_some(),
            "endDate",
            "End date must be a valid date",
        );
    }
    if let (Some(start), Some(end)) = (fields.start_date, fields.end_date) {
        checks.require(end > start, "endDate", "End date must be after start date");
    }
    checks.finish()
}

fn duplicate_name(err: db::DbError) -> AppError {
    if err.is_unique_violation() {
        AppError::Conflict("Program with this name already exists".to_string())
    } else {
        err.into()
    }
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Payload(req): Payload<ProgramRequest>,
) -> ApiResult {
    let fields = ProgramFields {
        name: req.program_name.clone().unwrap_or_default().trim().to_string(),
        description: req.description.clone().unwrap_or_default().trim().to_string(),
        target_amount: req.target_amount.unwrap_or(0),
        start_date: req.start_date.as_deref().and_then(parse_date),
        end_date: req.end_date.as_deref().and_then(parse_date),
        status: req.status.unwrap_or(ProgramStatus::Active),
    };
    check_fields(&req, &fields)?;
    let Some(start_date) = fields.start_date else {
        return Err(AppError::validation("Start date is required"));
    };

    let program = db::programs::create_program(
        &state.db,
        NewProgram {
            name: &fields.name,
            description: &fields.description,
            target_amount: fields.target_amount,
            start_date,
            end_date: fields.end_date,
            status: fields.status,
        },
    )
    .await
    .map_err(duplicate_name)?;

    tracing::info!(program_id = %program.id, admin_id = %admin.id, "Program created");
    Ok(created(ProgramView::from(program), "Program created successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<ProgramRequest>,
) -> ApiResult {
    let mut program = load(&state, &id).await?;

    if program.status == ProgramStatus::Archived
        && req.status.is_some_and(|s| s != ProgramStatus::Archived)
    {
        return Err(AppError::Conflict(
            "Archived programs cannot be reactivated".to_string(),
        ));
    }

    let fields = ProgramFields {
        name: req
            .program_name
            .as_deref()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| program.name.clone()),
        description: req
            .description
            .as_deref()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| program.description.clone()),
        target_amount: req.target_amount.unwrap_or(program.target_amount),
        start_date: match req.start_date.as_deref() {
            Some(raw) => parse_date(raw),
            None => Some(program.start_date),
        },
        end_date: match req.end_date.as_deref() {
            Some(raw) => parse_date(raw),
            None => program.end_date,
        },
        status: req.status.unwrap_or(program.status),
    };
    check_fields(&req, &fields)?;

    program.name = fields.name;
    program.description = fields.description;
    program.target_amount = fields.target_amount;
    if let Some(start) = fields.start_date {
        program.start_date = start;
    }
    program.end_date = fields.end_date;
    program.status = fields.status;

    if !db::programs::update_program_details(&state.db, &program)
        .await
        .map_err(duplicate_name)?
    {
        return Err(AppError::not_found("Program"));
    }
    tracing::info!(program_id = %program.id, admin_id = %admin.id, "Program updated");

    let refreshed = load(&state, &id).await?;
    Ok(ok_message(ProgramView::from(refreshed), "Program updated successfully"))
}

#[derive(Deserialize)]
pub struct FundsRequest {
    amount: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FundsResult {
    funds_utilized: i64,
    funds_received: i64,
    utilization_rate: f64,
}

pub async fn update_funds(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<FundsRequest>,
) -> ApiResult {
    ensure_id(&id)?;
    let amount = match req.amount {
        Some(a) if a >= 0 => a,
        _ => {
            return Err(AppError::invalid_fields(vec![crate::error::FieldError::new(
                "amount",
                "Amount must be a positive number",
            )]))
        }
    };

    match db::programs::set_funds_utilized(&state.db, &id, amount).await? {
        FundsUpdate::NotFound => Err(AppError::not_found("Program")),
        FundsUpdate::ExceedsReceived { funds_received } => {
            tracing::warn!(program_id = %id, amount, funds_received, "Rejected utilization above receipts");
            Err(AppError::validation(
                "Funds utilized cannot exceed funds received",
            ))
        }
        FundsUpdate::Updated {
            funds_utilized,
            funds_received,
        } => {
            tracing::info!(program_id = %id, admin_id = %admin.id, funds_utilized, "Program utilization updated");
            Ok(ok_message(
                FundsResult {
                    funds_utilized,
                    funds_received,
                    utilization_rate: two_decimals(crate::db::models::utilization_rate(
                        funds_received,
                        funds_utilized,
                    )),
                },
                "Funds updated successfully",
            ))
        }
    }
}

pub async fn archive(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    ensure_id(&id)?;
    if !db::programs::set_status(&state.db, &id, ProgramStatus::Archived).await? {
        return Err(AppError::not_found("Program"));
    }
    tracing::info!(program_id = %id, admin_id = %admin.id, "Program archived");
    let program = load(&state, &id).await?;
    Ok(ok_message(ProgramView::from(program), "Program archived successfully"))
}

#[cfg(test)]
mod tests {
    use super::two_decimals;

    #[test]
    fn rates_round_to_cents() {
        assert_eq!(two_decimals(33.33333), 33.33);
        assert_eq!(two_decimals(66.666), 66.67);
        assert_eq!(two_decimals(0.0), 0.0);
    }
}
