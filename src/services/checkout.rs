use serde::{Deserialize, Serialize};

use crate::db::donations::{self as donation_store, Completion, FailureOutcome, NewDonation};
use crate::db::models::{Donation, ProgramStatus, Visibility};
use crate::db;
use crate::email::templates::{self, Confirmation};
use crate::error::AppError;
use crate::payments::{self, CURRENCY};
use crate::validation::{ensure_id, Checks};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: Option<i64>,
    pub program_id: Option<String>,
    pub visibility_choice: Option<Visibility>,
    pub public_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: String,
    /// Rupees, as requested.
    pub amount: i64,
    pub currency: String,
    /// Publishable gateway key; `None` in mock mode so clients skip the checkout widget.
    pub key: Option<String>,
}

/// Display token for anonymous donations, e.g. `DONOR-1A2B3C4D`.
pub fn donor_alias() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("DONOR-{}", token[..8].to_uppercase())
}

/// Creates the gateway order, then the matching `pending` donation. The ledger
/// is not touched until verification.
pub async fn create_order(
    state: &AppState,
    user_id: &str,
    req: CreateOrderRequest,
) -> Result<OrderCreated, AppError> {
    let public_name = req
        .public_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut checks = Checks::new();
    checks.require(
        matches!(req.amount, Some(a) if a >= 1),
        "amount",
        "Amount must be at least 1",
    );
    checks.require(
        req.amount.map_or(true, |a| payments::to_paise(a).is_some()),
        "amount",
        "Amount is too large",
    );
    checks.require(req.program_id.is_some(), "programId", "Program ID is required");
    checks.require(
        req.visibility_choice.is_some(),
        "visibilityChoice",
        "Visibility choice must be public or anonymous",
    );
    if req.visibility_choice == Some(Visibility::Public) {
        checks.require(
            public_name.is_some(),
            "publicName",
            "Public name is required for public donations",
        );
        if let Some(name) = public_name {
            checks.char_len(name, "publicName", 1, 100);
        }
    }
    checks.finish()?;

    let (Some(amount), Some(program_id), Some(visibility)) =
        (req.amount, req.program_id, req.visibility_choice)
    else {
        return Err(AppError::validation("Validation failed"));
    };
    ensure_id(&program_id)?;

    let program = db::programs::find_program(&state.db, &program_id)
        .await?
        .ok_or_else(|| AppError::not_found("Program"))?;
    if program.status != ProgramStatus::Active {
        return Err(AppError::validation("Program is not accepting donations"));
    }

    let order = state.gateway.create_order(amount, user_id).await?;

    let (public_name, alias) = match visibility {
        Visibility::Public => (public_name, None),
        Visibility::Anonymous => (None, Some(donor_alias())),
    };

    let donation = donation_store::create_pending(
        &state.db,
        NewDonation {
            user_id,
            program_id: &program.id,
            amount,
            order_id: &order.id,
            visibility,
            public_name,
            donor_alias: alias.as_deref(),
        },
    )
    .await?;

    tracing::info!(
        donation_id = %donation.id,
        order_id = %order.id,
        program_id = %program.id,
        amount,
        "Payment order created"
    );

    Ok(OrderCreated {
        order_id: order.id,
        amount,
        currency: CURRENCY.to_string(),
        key: if state.config.mock_payments {
            None
        } else {
            state.config.razorpay_key_id.clone()
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verified {
    pub donation_id: String,
    pub message: String,
}

/// Verifies a gateway callback and finalizes the donation.
///
/// Duplicate callbacks for an already-completed order succeed without touching
/// the ledger or re-sending anything. Certificates and the confirmation email
/// are queued on the background task set once the transaction has committed.
pub async fn verify_payment(state: &AppState, req: VerifyRequest) -> Result<Verified, AppError> {
    let mut checks = Checks::new();
    for (value, field) in [
        (&req.razorpay_order_id, "razorpay_order_id"),
        (&req.razorpay_payment_id, "razorpay_payment_id"),
        (&req.razorpay_signature, "razorpay_signature"),
    ] {
        checks.require(
            value.as_deref().is_some_and(|v| !v.trim().is_empty()),
            field,
            &format!("{} is required", field),
        );
    }
    checks.finish()?;
    let order_id = req.razorpay_order_id.unwrap_or_default();
    let payment_id = req.razorpay_payment_id.unwrap_or_default();
    let signature = req.razorpay_signature.unwrap_or_default();

    let authentic = payments::verify_signature(
        state.config.razorpay_key_secret.as_deref(),
        &order_id,
        &payment_id,
        &signature,
        state.config.mock_payments,
    );
    if !authentic {
        tracing::warn!(order_id = %order_id, "Rejected payment callback with invalid signature");
        return Err(AppError::Payment("Invalid payment signature".to_string()));
    }

    match donation_store::complete_donation(&state.db, &order_id, &payment_id).await? {
        Completion::Missing => Err(AppError::not_found("Donation")),
        Completion::Failed(donation) => {
            tracing::warn!(donation_id = %donation.id, "Verification received for a failed donation");
            Err(AppError::Conflict(
                "Donation has already been marked as failed".to_string(),
            ))
        }
        Completion::AlreadyCompleted(donation) => {
            tracing::info!(donation_id = %donation.id, order_id = %order_id, "Duplicate verification ignored");
            Ok(Verified {
                donation_id: donation.id,
                message: "Payment already verified".to_string(),
            })
        }
        Completion::Completed {
            donation,
            program_credited,
        } => {
            if program_credited {
                tracing::info!(
                    donation_id = %donation.id,
                    program_id = %donation.program_id,
                    amount = donation.amount,
                    "Donation completed and program credited"
                );
            } else {
                tracing::error!(
                    donation_id = %donation.id,
                    program_id = %donation.program_id,
                    "Donation completed but its program no longer exists; ledger not updated"
                );
            }
            queue_side_effects(state, &donation);
            Ok(Verified {
                donation_id: donation.id,
                message: "Payment verified successfully".to_string(),
            })
        }
    }
}

fn queue_side_effects(state: &AppState, donation: &Donation) {
    let certificates = state.certificates.clone();
    let pool = state.db.clone();
    let config = state.config.clone();
    let owned = donation.clone();
    state.tasks.spawn("certificates", async move {
        certificates
            .issue_for_donation(&pool, &owned, &config.foundation)
            .await
            .map(|_| ())
    });

    let pool = state.db.clone();
    let config = state.config.clone();
    let mailer = state.mailer.clone();
    let owned = donation.clone();
    state.tasks.spawn("confirmation-email", async move {
        let donor = db::users::find_user(&pool, &owned.user_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("donor {} not found", owned.user_id))?;
        let program = db::programs::find_program(&pool, &owned.program_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("program {} not found", owned.program_id))?;

        let certificate_url = format!(
            "{}/certificates/{}",
            config.frontend_url.trim_end_matches('/'),
            owned.id
        );
        let message = templates::donation_confirmation(
            &Confirmation {
                to: &donor.email,
                donor_name: &donor.name,
                amount: owned.amount,
                program_name: &program.name,
                donation_id: &owned.id,
                certificate_url: &certificate_url,
                date: owned.created_at,
            },
            &config.foundation,
        );
        mailer.send(message).await.map_err(|e| e.to_string())?;
        tracing::info!(donation_id = %owned.id, email = %donor.email, "Confirmation email sent");
        Ok::<(), String>(())
    });
}

#[derive(Debug, Deserialize)]
pub struct FailureRequest {
    pub razorpay_order_id: Option<String>,
    pub reason: Option<String>,
}

/// Marks a pending donation failed after the gateway reports a failed payment.
pub async fn report_failure(state: &AppState, req: FailureRequest) -> Result<Donation, AppError> {
    let order_id = req
        .razorpay_order_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            AppError::invalid_fields(vec![crate::error::FieldError::new(
                "razorpay_order_id",
                "razorpay_order_id is required",
            )])
        })?;
    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().take(500).collect::<String>());

    match donation_store::mark_failed(&state.db, &order_id, reason.as_deref()).await? {
        FailureOutcome::Missing => Err(AppError::not_found("Donation")),
        FailureOutcome::AlreadyCompleted(_) => Err(AppError::Conflict(
            "Completed donations cannot be marked as failed".to_string(),
        )),
        FailureOutcome::Failed(donation) => {
            tracing::info!(donation_id = %donation.id, order_id = %order_id, "Donation marked as failed");
            Ok(donation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::donor_alias;

    #[test]
    fn alias_shape() {
        let alias = donor_alias();
        assert_eq!(alias.len(), "DONOR-".len() + 8);
        assert!(alias.starts_with("DONOR-"));
        assert!(alias[6..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(donor_alias(), donor_alias());
    }
}
