use axum::http::StatusCode;
use lunglife_auth::services::totp::TotpGenerator;
use serde_json::json;

use crate::common::{test_email, test_password, TestContext};

async fn setup_two_factor(ctx: &TestContext, access_token: &str) -> Vec<String> {
    let setup = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(access_token)
        .await;
    setup.assert_status(StatusCode::OK);
    let body: serde_json::Value = setup.json();
    let secret = body["secret"].as_str().unwrap().to_string();
    let backup_codes: Vec<String> = body["backup_codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect();

    let code = TotpGenerator::new("lunglife").current_code(&secret).unwrap();
    ctx.server
        .post("/auth/verify-2fa")
        .authorization_bearer(access_token)
        .json(&json!({ "code": code }))
        .await
        .assert_status(StatusCode::OK);

    backup_codes
}

async fn two_factor_challenge(ctx: &TestContext, email: &str) -> String {
    let step_one = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": email, "password": test_password() }))
        .await;
    step_one.assert_status(StatusCode::OK);
    let body: serde_json::Value = step_one.json();
    body["two_factor_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn backup_code_completes_a_two_factor_login() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    let codes = setup_two_factor(&ctx, &access_token).await;

    let challenge = two_factor_challenge(&ctx, &email).await;
    let response = ctx
        .server
        .post("/auth/login/2fa")
        .json(&json!({ "two_factor_token": challenge, "backup_code": codes[0] }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert!(body.get("access_token").is_some());
}

#[tokio::test]
async fn backup_code_is_single_use() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let user_id = ctx.user_id(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    let codes = setup_two_factor(&ctx, &access_token).await;

    let challenge = two_factor_challenge(&ctx, &email).await;
    ctx.server
        .post("/auth/login/2fa")
        .json(&json!({ "two_factor_token": challenge, "backup_code": codes[0] }))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(ctx.store.unused_backup_codes(&user_id).await, 7);

    let challenge = two_factor_challenge(&ctx, &email).await;
    let replay = ctx
        .server
        .post("/auth/login/2fa")
        .json(&json!({ "two_factor_token": challenge, "backup_code": codes[0] }))
        .await;
    replay.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_uses_of_one_backup_code_admit_exactly_one() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    let codes = setup_two_factor(&ctx, &access_token).await;

    let challenge_a = two_factor_challenge(&ctx, &email).await;
    let challenge_b = two_factor_challenge(&ctx, &email).await;

    // Same code raced from two sessions; the consume is compare-and-swap,
    // so only one attempt can win.
    let (first, second) = futures::future::join(
        async {
            ctx.server
                .post("/auth/login/2fa")
                .json(&json!({ "two_factor_token": challenge_a, "backup_code": codes[0] }))
                .await
        },
        async {
            ctx.server
                .post("/auth/login/2fa")
                .json(&json!({ "two_factor_token": challenge_b, "backup_code": codes[0] }))
                .await
        },
    )
    .await;

    let statuses = [first.status_code(), second.status_code()];
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "exactly one racer should win: {statuses:?}"
    );
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::UNAUTHORIZED)
            .count(),
        1,
        "the loser should be rejected: {statuses:?}"
    );
}

#[tokio::test]
async fn backup_codes_match_case_insensitively() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    let codes = setup_two_factor(&ctx, &access_token).await;

    let challenge = two_factor_challenge(&ctx, &email).await;
    let response = ctx
        .server
        .post("/auth/login/2fa")
        .json(&json!({
            "two_factor_token": challenge,
            "backup_code": format!("  {}  ", codes[0].to_lowercase())
        }))
        .await;

    response.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn regenerate_replaces_the_full_set() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let user_id = ctx.user_id(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    let old_codes = setup_two_factor(&ctx, &access_token).await;

    let response = ctx
        .server
        .post("/auth/backup-codes/regenerate")
        .authorization_bearer(&access_token)
        .await;
    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    let new_codes: Vec<String> = body["codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect();
    assert_eq!(new_codes.len(), 8);
    assert_eq!(ctx.store.unused_backup_codes(&user_id).await, 8);

    // Old codes are dead, fresh ones work.
    let challenge = two_factor_challenge(&ctx, &email).await;
    ctx.server
        .post("/auth/login/2fa")
        .json(&json!({ "two_factor_token": challenge, "backup_code": old_codes[0] }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let challenge = two_factor_challenge(&ctx, &email).await;
    ctx.server
        .post("/auth/login/2fa")
        .json(&json!({ "two_factor_token": challenge, "backup_code": new_codes[0] }))
        .await
        .assert_status(StatusCode::OK);
}

#[tokio::test]
async fn regenerate_requires_two_factor_enabled() {
    let ctx = TestContext::new().await;
    let (_email, access_token) = ctx.register_and_login().await;

    let response = ctx
        .server
        .post("/auth/backup-codes/regenerate")
        .authorization_bearer(&access_token)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}
