use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const CURRENCY: &str = "INR";

const PAISE_PER_RUPEE: i64 = 100;

/// `rupees` in paise, or `None` when the figure does not fit an `i64`.
pub fn to_paise(rupees: i64) -> Option<i64> {
    rupees.checked_mul(PAISE_PER_RUPEE)
}

/// An order as the gateway reports it; `amount` is in paise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment gateway is not configured")]
    NotConfigured,
    #[error("Payment gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Payment gateway rejected the order (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Order amount {0} is out of range")]
    AmountOutOfRange(i64),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured => {
                AppError::ServiceUnavailable("Payment gateway is not configured".to_string())
            }
            GatewayError::AmountOutOfRange(_) => AppError::validation("Amount is too large"),
            other => {
                tracing::error!("Gateway order creation failed: {}", other);
                AppError::BadGateway("Failed to create payment order".to_string())
            }
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a remote order for `amount` rupees.
    async fn create_order(&self, amount: i64, user_id: &str) -> Result<GatewayOrder, GatewayError>;
}

pub struct RazorpayGateway {
    client: reqwest::Client,
    api_base: String,
    key_id: Option<String>,
    key_secret: Option<String>,
}

impl RazorpayGateway {
    pub fn new(api_base: &str, key_id: Option<String>, key_secret: Option<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, amount: i64, user_id: &str) -> Result<GatewayOrder, GatewayError> {
        let (Some(key_id), Some(key_secret)) = (&self.key_id, &self.key_secret) else {
            return Err(GatewayError::NotConfigured);
        };
        let paise = to_paise(amount).ok_or(GatewayError::AmountOutOfRange(amount))?;

        let body = json!({
            "amount": paise,
            "currency": CURRENCY,
            "receipt": format!("rcpt_{}", chrono::Utc::now().timestamp_millis()),
            "payment_capture": 1,
            "notes": { "userId": user_id },
        });

        let resp = self
            .client
            .post(format!("{}/orders", self.api_base))
            .basic_auth(key_id, Some(key_secret))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<GatewayOrder>().await?)
    }
}

/// Issues local order ids without calling out; used when mock payments are on.
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, amount: i64, _user_id: &str) -> Result<GatewayOrder, GatewayError> {
        let paise = to_paise(amount).ok_or(GatewayError::AmountOutOfRange(amount))?;
        let token = uuid::Uuid::new_v4().simple().to_string();
        Ok(GatewayOrder {
            id: format!(
                "order_{}_{}",
                chrono::Utc::now().timestamp_millis(),
                &token[..8]
            ),
            amount: paise,
            currency: CURRENCY.to_string(),
        })
    }
}

pub fn gateway_from_config(config: &AppConfig) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
    if config.mock_payments {
        tracing::warn!("Mock payments enabled: orders are not sent to the gateway");
        return Ok(Arc::new(MockGateway));
    }
    if config.razorpay_key_id.is_none() || config.razorpay_key_secret.is_none() {
        tracing::warn!("Razorpay credentials missing; order creation will be unavailable");
    }
    Ok(Arc::new(RazorpayGateway::new(
        &config.razorpay_api_base,
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    )?))
}

/// Hex HMAC-SHA256 of `{order_id}|{payment_id}`.
pub fn expected_signature(secret: &str, order_id: &str, payment_id: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a callback signature in constant time.
pub fn verify_signature(
    secret: Option<&str>,
    order_id: &str,
    payment_id: &str,
    signature: &str,
    mock: bool,
) -> bool {
    if mock {
        return true;
    }
    let Some(secret) = secret else {
        tracing::error!("RAZORPAY_KEY_SECRET is not set; rejecting payment signature");
        return false;
    };
    let Ok(supplied) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&supplied).is_ok()
}
