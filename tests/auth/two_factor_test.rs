use axum::http::StatusCode;
use lunglife_auth::services::totp::TotpGenerator;
use serde_json::json;

use crate::common::{test_email, test_password, TestContext};

/// Runs the setup + verify dance and returns the shared secret.
async fn enable_two_factor(ctx: &TestContext, access_token: &str) -> String {
    let setup = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(access_token)
        .await;
    setup.assert_status(StatusCode::OK);
    let body: serde_json::Value = setup.json();
    let secret = body["secret"].as_str().unwrap().to_string();

    let code = TotpGenerator::new("lunglife").current_code(&secret).unwrap();
    ctx.server
        .post("/auth/verify-2fa")
        .authorization_bearer(access_token)
        .json(&json!({ "code": code }))
        .await
        .assert_status(StatusCode::OK);

    secret
}

#[tokio::test]
async fn setup_returns_secret_and_backup_codes() {
    let ctx = TestContext::new().await;
    let (_email, access_token) = ctx.register_and_login().await;

    let response = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert!(!body["secret"].as_str().unwrap().is_empty());
    assert!(body["otpauth_url"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));
    assert!(body.get("qr_code").is_some());
    assert_eq!(body["backup_codes"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn setup_requires_authentication() {
    let ctx = TestContext::new().await;

    let response = ctx.server.post("/auth/enable-2fa").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verify_with_wrong_code_leaves_two_factor_disabled() {
    let ctx = TestContext::new().await;
    let (email, access_token) = ctx.register_and_login().await;

    ctx.server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await
        .assert_status(StatusCode::OK);

    let response = ctx
        .server
        .post("/auth/verify-2fa")
        .authorization_bearer(&access_token)
        .json(&json!({ "code": "000000" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let user = ctx.store.user_by_email(&email).await.unwrap();
    assert!(!user.two_factor_enabled);
}

#[tokio::test]
async fn verify_with_current_code_enables_two_factor() {
    let ctx = TestContext::new().await;
    let (email, access_token) = ctx.register_and_login().await;

    enable_two_factor(&ctx, &access_token).await;

    let user = ctx.store.user_by_email(&email).await.unwrap();
    assert!(user.two_factor_enabled);
}

#[tokio::test]
async fn login_with_two_factor_requires_second_step() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();

    let secret = enable_two_factor(&ctx, &access_token).await;

    // Step one yields a challenge, not a session.
    let step_one = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;
    step_one.assert_status(StatusCode::OK);
    let body: serde_json::Value = step_one.json();
    assert_eq!(body["requires_two_factor"], true);
    assert!(body.get("access_token").is_none());
    let two_factor_token = body["two_factor_token"].as_str().unwrap().to_string();

    let code = TotpGenerator::new("lunglife").current_code(&secret).unwrap();
    let step_two = ctx
        .server
        .post("/auth/login/2fa")
        .json(&json!({ "two_factor_token": two_factor_token, "code": code }))
        .await;
    step_two.assert_status(StatusCode::OK);
    let session: serde_json::Value = step_two.json();
    assert!(session.get("access_token").is_some());
    assert!(session.get("refresh_token").is_some());
}

#[tokio::test]
async fn second_step_rejects_wrong_code() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    enable_two_factor(&ctx, &access_token).await;

    let step_one = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;
    let body: serde_json::Value = step_one.json();
    let two_factor_token = body["two_factor_token"].as_str().unwrap().to_string();

    let response = ctx
        .server
        .post("/auth/login/2fa")
        .json(&json!({ "two_factor_token": two_factor_token, "code": "000000" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn challenge_token_is_not_a_session_token() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    enable_two_factor(&ctx, &access_token).await;

    let step_one = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;
    let body: serde_json::Value = step_one.json();
    let two_factor_token = body["two_factor_token"].as_str().unwrap().to_string();

    let response = ctx
        .server
        .get("/auth/me")
        .authorization_bearer(&two_factor_token)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn disable_requires_the_account_password() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    enable_two_factor(&ctx, &access_token).await;

    let wrong = ctx
        .server
        .post("/auth/disable-2fa")
        .authorization_bearer(&access_token)
        .json(&json!({ "password": "WrongPassword123!" }))
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    let right = ctx
        .server
        .post("/auth/disable-2fa")
        .authorization_bearer(&access_token)
        .json(&json!({ "password": test_password() }))
        .await;
    right.assert_status(StatusCode::OK);

    // Login goes back to a single step.
    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;
    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert!(body.get("access_token").is_some());
}

#[tokio::test]
async fn setup_is_rejected_once_enabled() {
    let ctx = TestContext::new().await;
    let (_email, access_token) = ctx.register_and_login().await;
    enable_two_factor(&ctx, &access_token).await;

    let response = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
