use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::db::donations::DonationWithProgram;
use crate::error::AppError;
use crate::routes::{ok, ok_message, ApiResult};
use crate::validation::{is_valid_phone, Checks, Payload};
use crate::{db, AppState};

pub async fn profile(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult {
    let profile = db::users::find_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ok(profile))
}

#[derive(Deserialize)]
pub struct ProfileUpdate {
    name: Option<String>,
    phone: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Payload(update): Payload<ProfileUpdate>,
) -> ApiResult {
    let name = update.name.as_deref().map(str::trim);
    let phone = update.phone.as_deref().map(str::trim);

    let mut checks = Checks::new();
    if let Some(name) = name {
        checks.char_len(name, "name", 2, 100);
    }
    if let Some(phone) = phone {
        checks.require(is_valid_phone(phone), "phone", "Phone number must be 10 digits");
    }
    checks.finish()?;

    let profile = db::users::update_profile(&state.db, &user.id, name, phone)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(ok_message(profile, "Profile updated successfully"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DonorDashboard {
    donations: Vec<DonationWithProgram>,
    total_contribution: i64,
    donation_count: i64,
}

/// The caller's donations plus totals over the completed ones.
pub async fn dashboard(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult {
    let donations = db::donations::list_for_user(&state.db, &user.id).await?;
    let totals = db::donations::completed_totals(&state.db, Some(&user.id)).await?;
    Ok(ok(DonorDashboard {
        donations,
        total_contribution: totals.amount,
        donation_count: totals.count,
    }))
}
