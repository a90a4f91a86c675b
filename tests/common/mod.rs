#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

use donation_portal::auth::issue_token;
use donation_portal::certificates::CertificateStore;
use donation_portal::config::AppConfig;
use donation_portal::db::{self, models::Role};
use donation_portal::email::{EmailMessage, MailError, Mailer};
use donation_portal::payments::{expected_signature, MockGateway};
use donation_portal::scheduler::Scheduler;
use donation_portal::services::progress_report::ProgressReportJob;
use donation_portal::tasks::BackgroundTasks;
use donation_portal::{build_router, AppState};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const GATEWAY_SECRET: &str = "test_secret";

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail_for: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailer lock").clone()
    }

    /// Makes every send to `address` fail.
    pub fn reject(&self, address: &str) {
        self.fail_for.lock().expect("mailer lock").push(address.to_string());
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if self.fail_for.lock().expect("mailer lock").contains(&message.to) {
            return Err(MailError::Address(message.to));
        }
        self.sent.lock().expect("mailer lock").push(message);
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    router: Router,
    _dir: TempDir,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub bytes: Vec<u8>,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).expect("json body")
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("test.db");
        let pool = db::init_pool(db_path.to_str().expect("utf-8 path"))
            .await
            .expect("init pool");
        db::migrate(&pool).await.expect("migrate");

        let config = Arc::new(AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            razorpay_key_id: Some("rzp_test_key".to_string()),
            razorpay_key_secret: Some(GATEWAY_SECRET.to_string()),
            mock_payments: false,
            ..AppConfig::default()
        });
        let mailer = Arc::new(RecordingMailer::default());
        let job = Arc::new(ProgressReportJob::new(
            pool.clone(),
            mailer.clone(),
            config.foundation.clone(),
        ));

        let state = AppState {
            db: pool,
            config,
            gateway: Arc::new(MockGateway),
            mailer: mailer.clone(),
            certificates: CertificateStore::memory().expect("memory store"),
            scheduler: Arc::new(Scheduler::new(job)),
            tasks: BackgroundTasks::new(),
        };

        Self {
            router: build_router(state.clone()),
            state,
            mailer,
            _dir: dir,
        }
    }

    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body").to_vec();
        Response {
            status,
            headers,
            bytes,
        }
    }

    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.send(method, uri, token, body).await;
        let json = if response.bytes.is_empty() {
            Value::Null
        } else {
            response.json()
        };
        (response.status, json)
    }

    /// Inserts a user directly and returns `(token, user_id)`.
    pub async fn user(&self, name: &str, email: &str, role: Role) -> (String, String) {
        let user = db::users::create_user(&self.state.db, name, email, "9876543210", "unused-hash", role)
            .await
            .expect("create user");
        let token = issue_token(
            JWT_SECRET,
            std::time::Duration::from_secs(3600),
            &user.id,
            user.role,
        )
        .expect("token");
        (token, user.id)
    }

    pub async fn admin(&self) -> String {
        self.user("Site Admin", "admin@example.org", Role::Admin).await.0
    }

    pub async fn create_program(&self, admin_token: &str, name: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/programs",
                Some(admin_token),
                Some(serde_json::json!({
                    "programName": name,
                    "description": "Funding for a community program",
                    "targetAmount": 10000,
                    "startDate": "2024-01-01",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create program: {}", body);
        body["data"]["id"].as_str().expect("program id").to_string()
    }

    /// Creates an order through the API and returns its id.
    pub async fn create_order(&self, token: &str, program_id: &str, amount: i64) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/donations/create-order",
                Some(token),
                Some(serde_json::json!({
                    "amount": amount,
                    "programId": program_id,
                    "visibilityChoice": "public",
                    "publicName": "Asha",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create order: {}", body);
        body["data"]["orderId"].as_str().expect("order id").to_string()
    }

    pub async fn verify(&self, token: &str, order_id: &str, payment_id: &str) -> (StatusCode, Value) {
        let signature = expected_signature(GATEWAY_SECRET, order_id, payment_id).expect("signature");
        self.call(
            "POST",
            "/api/donations/verify",
            Some(token),
            Some(serde_json::json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": payment_id,
                "razorpay_signature": signature,
            })),
        )
        .await
    }

    pub async fn program(&self, program_id: &str) -> Value {
        let (status, body) = self.call("GET", &format!("/api/programs/{}", program_id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        body["data"].clone()
    }
}
