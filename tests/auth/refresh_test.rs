use axum::http::StatusCode;
use chrono::{Duration, Utc};
use lunglife_auth::modules::auth::interface::RefreshTokenRepository;
use lunglife_auth::modules::auth::model::RefreshTokenRecord;
use serde_json::json;

use crate::common::{test_email, test_password, TestContext};

#[tokio::test]
async fn refresh_rotates_the_token_pair() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let refresh_token = login["refresh_token"].as_str().unwrap().to_string();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": &refresh_token }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert!(body.get("access_token").is_some());
    let new_refresh = body["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, refresh_token);
}

#[tokio::test]
async fn consumed_refresh_token_is_rejected() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let refresh_token = login["refresh_token"].as_str().unwrap().to_string();

    ctx.server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": &refresh_token }))
        .await
        .assert_status(StatusCode::OK);

    // Rotation is single-use.
    let replay = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": &refresh_token }))
        .await;
    replay.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_refresh_token_is_rejected() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": "not-a-jwt" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_is_not_accepted_as_refresh_token() {
    let ctx = TestContext::new().await;
    let (_email, access_token) = ctx.register_and_login().await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": access_token }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_presented_refresh_token() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let login = ctx.login(&email, test_password()).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();
    let refresh_token = login["refresh_token"].as_str().unwrap().to_string();

    let response = ctx
        .server
        .post("/auth/logout")
        .authorization_bearer(&access_token)
        .json(&json!({ "refresh_token": &refresh_token }))
        .await;
    response.assert_status(StatusCode::OK);

    let replay = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": &refresh_token }))
        .await;
    replay.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_without_token_revokes_all_sessions() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;

    let first = ctx.login(&email, test_password()).await;
    let second = ctx.login(&email, test_password()).await;
    let access_token = second["access_token"].as_str().unwrap().to_string();

    let response = ctx
        .server
        .post("/auth/logout")
        .authorization_bearer(&access_token)
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::OK);

    for login in [first, second] {
        let refresh_token = login["refresh_token"].as_str().unwrap();
        ctx.server
            .post("/auth/refresh")
            .json(&json!({ "refresh_token": refresh_token }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn expired_records_are_swept_and_live_ones_kept() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register(&email).await;
    let user_id = ctx.user_id(&email).await;
    ctx.login(&email, test_password()).await;

    let stale = RefreshTokenRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id,
        token_hash: "stale-hash".to_string(),
        expires_at: Utc::now() - Duration::hours(1),
        device: None,
        ip: None,
        revoked: false,
        created_at: Utc::now() - Duration::days(8),
    };
    ctx.store.store_refresh_token(&stale).await.unwrap();

    let removed = ctx.store.delete_expired_refresh_tokens().await.unwrap();
    assert_eq!(removed, 1);

    // The live token from the login above survives the sweep.
    assert!(ctx
        .store
        .find_active_refresh_token("stale-hash")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn logout_requires_authentication() {
    let ctx = TestContext::new().await;

    let response = ctx.server.post("/auth/logout").json(&json!({})).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}
