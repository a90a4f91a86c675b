mod common;

use axum::http::{header, StatusCode};
use serde_json::json;

use common::TestApp;
use donation_portal::db::models::Role;

#[tokio::test]
async fn verified_payment_credits_program_and_issues_certificates() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/donations/create-order",
            Some(&donor),
            Some(json!({
                "amount": 500,
                "programId": program_id,
                "visibilityChoice": "public",
                "publicName": "Asha",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["amount"], 500);
    assert_eq!(body["data"]["currency"], "INR");
    assert_eq!(body["data"]["key"], "rzp_test_key");
    let order_id = body["data"]["orderId"].as_str().expect("order id").to_string();

    // Nothing is credited before verification.
    assert_eq!(app.program(&program_id).await["fundsReceived"], 0);

    let (status, body) = app.verify(&donor, &order_id, "pay_001").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let donation_id = body["data"]["donationId"].as_str().expect("donation id").to_string();
    app.state.tasks.drain().await;

    assert_eq!(app.program(&program_id).await["fundsReceived"], 500);

    let (status, body) = app
        .call("GET", &format!("/api/certificates/donation/{}", donation_id), Some(&donor), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let certificates = body["data"].as_array().expect("certificates");
    let mut types: Vec<&str> = certificates
        .iter()
        .map(|c| c["certificateType"].as_str().expect("type"))
        .collect();
    types.sort_unstable();
    assert_eq!(types, vec!["12A", "80G"]);

    let url = certificates[0]["certificateURL"].as_str().expect("url");
    assert!(url.starts_with("/certificates/"));
    let download = app.send("GET", url, None, None).await;
    assert_eq!(download.status, StatusCode::OK);
    assert_eq!(download.headers[header::CONTENT_TYPE], "application/pdf");
    assert!(download.headers[header::CONTENT_DISPOSITION]
        .to_str()
        .expect("disposition")
        .starts_with("attachment"));
    assert!(download.bytes.starts_with(b"%PDF"));

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "asha@example.org");
    assert_eq!(sent[0].subject, "Thank You for Your Donation!");
    assert!(sent[0].html.contains("Clean Water"));

    let (status, body) = app.call("GET", "/api/donations/history", Some(&donor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["transactionStatus"], "completed");
    assert_eq!(body["data"][0]["razorpayPaymentId"], "pay_001");
    assert_eq!(body["data"][0]["certificates"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn duplicate_verification_is_a_no_op() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;
    let order_id = app.create_order(&donor, &program_id, 500).await;

    let (first, body) = app.verify(&donor, &order_id, "pay_001").await;
    assert_eq!(first, StatusCode::OK);
    let donation_id = body["data"]["donationId"].clone();
    app.state.tasks.drain().await;

    let (second, body) = app.verify(&donor, &order_id, "pay_001").await;
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["data"]["donationId"], donation_id);
    app.state.tasks.drain().await;

    assert_eq!(app.program(&program_id).await["fundsReceived"], 500);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_verifications_credit_once() {
    let app = std::sync::Arc::new(TestApp::new().await);
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;
    let order_id = app.create_order(&donor, &program_id, 750).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let app = app.clone();
        let donor = donor.clone();
        let order_id = order_id.clone();
        handles.push(tokio::spawn(async move {
            app.verify(&donor, &order_id, "pay_race").await.0
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.expect("join"), StatusCode::OK);
    }
    app.state.tasks.drain().await;

    assert_eq!(app.program(&program_id).await["fundsReceived"], 750);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn tampered_signature_changes_nothing() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;
    let order_id = app.create_order(&donor, &program_id, 500).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/donations/verify",
            Some(&donor),
            Some(json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": "pay_001",
                "razorpay_signature": "deadbeef",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PAYMENT_ERROR");
    app.state.tasks.drain().await;

    assert_eq!(app.program(&program_id).await["fundsReceived"], 0);
    assert!(app.mailer.sent().is_empty());
    let (_, history) = app.call("GET", "/api/donations/history", Some(&donor), None).await;
    assert_eq!(history["data"][0]["transactionStatus"], "pending");
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;

    let (status, body) = app.verify(&donor, "order_missing", "pay_001").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn failed_payments_are_terminal() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;
    let order_id = app.create_order(&donor, &program_id, 500).await;

    let fail = json!({ "razorpay_order_id": order_id, "reason": "card declined" });
    let (status, body) = app.call("POST", "/api/donations/fail", Some(&donor), Some(fail.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "failed");

    // Repeated reports are harmless.
    let (status, _) = app.call("POST", "/api/donations/fail", Some(&donor), Some(fail)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.verify(&donor, &order_id, "pay_late").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT_ERROR");
    assert_eq!(app.program(&program_id).await["fundsReceived"], 0);

    // A completed donation can never be marked failed.
    let paid = app.create_order(&donor, &program_id, 200).await;
    assert_eq!(app.verify(&donor, &paid, "pay_ok").await.0, StatusCode::OK);
    let (status, _) = app
        .call("POST", "/api/donations/fail", Some(&donor), Some(json!({ "razorpay_order_id": paid })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    app.state.tasks.drain().await;
    assert_eq!(app.program(&program_id).await["fundsReceived"], 200);
}

#[tokio::test]
async fn order_validation_and_program_state() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/donations/create-order",
            Some(&donor),
            Some(json!({ "amount": 0, "programId": program_id, "visibilityChoice": "public" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .map(|f| f["field"].as_str().expect("field"))
        .collect();
    assert_eq!(fields, vec!["amount", "publicName"]);

    let (status, body) = app
        .call(
            "POST",
            "/api/donations/create-order",
            Some(&donor),
            Some(json!({
                "amount": i64::MAX / 100 + 1,
                "programId": program_id,
                "visibilityChoice": "anonymous",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"]["fields"][0]["field"], "amount");
    assert_eq!(body["error"]["fields"][0]["message"], "Amount is too large");

    // The largest representable amount is still an ordinary order.
    let (status, body) = app
        .call(
            "POST",
            "/api/donations/create-order",
            Some(&donor),
            Some(json!({
                "amount": i64::MAX / 100,
                "programId": program_id,
                "visibilityChoice": "anonymous",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, _) = app
        .call(
            "POST",
            "/api/donations/create-order",
            None,
            Some(json!({ "amount": 10, "programId": program_id, "visibilityChoice": "anonymous" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            "POST",
            "/api/donations/create-order",
            Some(&donor),
            Some(json!({ "amount": 10, "programId": "not-a-uuid", "visibilityChoice": "anonymous" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ID");

    let (status, _) = app
        .call("DELETE", &format!("/api/programs/{}", program_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(
            "POST",
            "/api/donations/create-order",
            Some(&donor),
            Some(json!({ "amount": 10, "programId": program_id, "visibilityChoice": "anonymous" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn anonymous_donations_show_an_alias_on_the_public_wall() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/donations/create-order",
            Some(&donor),
            Some(json!({
                "amount": 300,
                "programId": program_id,
                "visibilityChoice": "anonymous",
                "publicName": "Should not appear",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["data"]["orderId"].as_str().expect("order id").to_string();
    assert_eq!(app.verify(&donor, &order_id, "pay_anon").await.0, StatusCode::OK);
    app.state.tasks.drain().await;

    let (status, body) = app.call("GET", "/api/donations/public", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let name = body["data"][0]["displayName"].as_str().expect("display name");
    assert!(name.starts_with("DONOR-"), "{}", name);
    assert_eq!(body["data"][0]["programName"], "Clean Water");
    assert!(!body.to_string().contains("Should not appear"));
}

#[tokio::test]
async fn certificates_are_private_to_their_donor() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (donor, _) = app.user("Asha Rao", "asha@example.org", Role::Donor).await;
    let (other, _) = app.user("Ravi Kumar", "ravi@example.org", Role::Donor).await;
    let program_id = app.create_program(&admin, "Clean Water").await;
    let order_id = app.create_order(&donor, &program_id, 500).await;
    let (_, body) = app.verify(&donor, &order_id, "pay_001").await;
    let donation_id = body["data"]["donationId"].as_str().expect("id").to_string();
    app.state.tasks.drain().await;

    let uri = format!("/api/certificates/donation/{}", donation_id);
    assert_eq!(app.call("GET", &uri, Some(&other), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.call("GET", &uri, Some(&admin), None).await.0, StatusCode::OK);

    let bad = app.send("GET", "/api/certificates/download/..%2Fsecret.pdf", None, None).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    let missing = app.send("GET", "/certificates/80G_missing_1.pdf", None, None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}
