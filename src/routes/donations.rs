use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::db::models::{Certificate, TransactionStatus};
use crate::routes::{created, listing, ok, ok_message, ApiResult};
use crate::services::checkout::{self, CreateOrderRequest, FailureRequest, VerifyRequest};
use crate::validation::Payload;
use crate::{db, AppState};

/// Size of the public donor wall.
const PUBLIC_FEED_LIMIT: u32 = 100;

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Payload(req): Payload<CreateOrderRequest>,
) -> ApiResult {
    let order = checkout::create_order(&state, &user.id, req).await?;
    Ok(created(order, "Payment order created successfully"))
}

pub async fn verify(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Payload(req): Payload<VerifyRequest>,
) -> ApiResult {
    let verified = checkout::verify_payment(&state, req).await?;
    Ok(ok(verified))
}

pub async fn fail(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Payload(req): Payload<FailureRequest>,
) -> ApiResult {
    let donation = checkout::report_failure(&state, req).await?;
    Ok(ok_message(donation, "Payment failure recorded"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryCertificate {
    certificate_type: String,
    #[serde(rename = "certificateURL")]
    certificate_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    donation_id: String,
    amount: i64,
    program_id: String,
    program_name: String,
    program_description: String,
    date: DateTime<Utc>,
    transaction_status: TransactionStatus,
    razorpay_payment_id: Option<String>,
    #[serde(rename = "certificateURL")]
    certificate_url: Option<String>,
    certificates: Vec<HistoryCertificate>,
}

fn history_certificates(certs: Vec<Certificate>) -> Vec<HistoryCertificate> {
    certs
        .into_iter()
        .map(|c| HistoryCertificate {
            certificate_type: c.certificate_type.as_str().to_string(),
            certificate_url: c.certificate_url,
        })
        .collect()
}

pub async fn history(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult {
    let rows = db::donations::list_for_user(&state.db, &user.id).await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let certificates =
            history_certificates(db::certificates::list_for_donation(&state.db, &row.donation.id).await?);
        let donation = row.donation;
        entries.push(HistoryEntry {
            certificate_url: certificates.first().map(|c| c.certificate_url.clone()),
            certificates,
            donation_id: donation.id,
            amount: donation.amount,
            program_id: donation.program_id,
            program_name: row.program_name.unwrap_or_else(|| "Unknown Program".to_string()),
            program_description: row.program_description.unwrap_or_default(),
            date: donation.created_at,
            transaction_status: donation.status,
            razorpay_payment_id: donation.payment_id,
        });
    }

    Ok(listing(entries))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicDonation {
    display_name: String,
    amount: i64,
    program_name: String,
    date: DateTime<Utc>,
}

pub async fn public_feed(State(state): State<AppState>) -> ApiResult {
    let rows = db::donations::recent_completed(&state.db, PUBLIC_FEED_LIMIT).await?;
    let feed: Vec<PublicDonation> = rows
        .into_iter()
        .map(|row| PublicDonation {
            display_name: row.donation.display_name().to_string(),
            amount: row.donation.amount,
            program_name: row.program_name.unwrap_or_else(|| "Unknown Program".to_string()),
            date: row.donation.created_at,
        })
        .collect();
    Ok(listing(feed))
}
