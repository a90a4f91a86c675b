use axum::extract::State;

use crate::db::models::ProgramStatus;
use crate::routes::programs::ProgramView;
use crate::routes::{listing, ApiResult};
use crate::{db, AppState};

/// Public fund data for every active program.
pub async fn programs(State(state): State<AppState>) -> ApiResult {
    let programs = db::programs::list_programs(&state.db, Some(ProgramStatus::Active)).await?;
    Ok(listing(programs.into_iter().map(ProgramView::from).collect()))
}
