use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::AppState;

use super::audit::AuthEvent;
use super::extractor::AuthUser;
use super::interface::AuthError;
use super::model::{AuditEvent, Credentials, DeviceInfo};
use super::schema::{
    BackupCodesResponse, Disable2faRequest, ForgotPasswordRequest, LoginRequest,
    LoginRequires2faResponse, LoginResponse, LogoutRequest, MessageResponse, RefreshTokenRequest,
    RegisterRequest, RegisterResponse, ResetPasswordRequest, Setup2faResponse,
    TwoFactorLoginRequest, UserResponse, Verify2faRequest, VerifyEmailRequest,
};
use super::service::{LoginResult, RegisterInput};

fn device_from_headers(headers: &HeaderMap) -> DeviceInfo {
    DeviceInfo {
        ip: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

fn token_response(tokens: crate::services::jwt::TokenPair) -> Json<LoginResponse> {
    Json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer",
        expires_in: tokens.expires_in,
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    if !req.accept_terms {
        return Err(AuthError::Validation(
            "Terms of service must be accepted".to_string(),
        ));
    }

    let device = device_from_headers(&headers);
    let user = state
        .auth
        .register(
            RegisterInput {
                email: req.email,
                password: req.password,
                first_name: req.first_name,
                last_name: req.last_name,
            },
            Some(&device),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let credentials = Credentials {
        email: req.email,
        password: req.password,
        remember_me: req.remember_me,
        device: Some(device_from_headers(&headers)),
    };

    match state.auth.login(credentials).await? {
        LoginResult::Success { tokens, .. } => Ok(token_response(tokens).into_response()),
        LoginResult::TwoFactorRequired { two_factor_token } => Ok(Json(LoginRequires2faResponse {
            requires_two_factor: true,
            two_factor_token,
        })
        .into_response()),
    }
}

/// Completes a 2FA login: pending token from step one plus a TOTP or backup
/// code. This is the only path that turns a pending token into a session.
pub async fn login_two_factor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TwoFactorLoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let claims = state
        .auth
        .jwt()
        .verify_two_factor_token(&req.two_factor_token)
        .map_err(|_| AuthError::InvalidToken)?;

    let user = state
        .two_factor
        .verify_login(&claims.sub, req.code.as_deref(), req.backup_code.as_deref())
        .await?;

    let device = device_from_headers(&headers);
    let tokens = state.auth.issue_session(&user, Some(&device)).await?;

    state
        .audit
        .record(
            AuthEvent::new(AuditEvent::LoginSuccess)
                .user_id(&user.id)
                .email(&user.email)
                .device(Some(&device))
                .success(),
        )
        .await;

    Ok(token_response(tokens))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let device = device_from_headers(&headers);
    let tokens = state
        .auth
        .refresh(&req.refresh_token, Some(&device))
        .await?;
    Ok(token_response(tokens))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state
        .auth
        .logout(&user.user_id, req.refresh_token.as_deref())
        .await?;
    Ok(Json(MessageResponse {
        message: "Logged out",
    }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<UserResponse>, AuthError> {
    let user = state.auth.current_user(&user.user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let device = device_from_headers(&headers);
    // The token goes to the mailer collaborator, never into the response;
    // the response shape is identical whether or not the account exists.
    if let Some(token) = state.auth.forgot_password(&req.email, Some(&device)).await? {
        tracing::debug!(token_len = token.len(), "password reset token issued");
    }

    Ok(Json(MessageResponse {
        message: "If the email is registered, a reset link has been sent",
    }))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.reset_password(&req.token, &req.password).await?;
    Ok(Json(MessageResponse {
        message: "Password updated",
    }))
}

pub async fn request_verification(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, AuthError> {
    let token = state.auth.request_email_verification(&user.user_id).await?;
    tracing::debug!(token_len = token.len(), "email verification token issued");

    Ok(Json(MessageResponse {
        message: "Verification email sent",
    }))
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.verify_email(&req.token).await?;
    Ok(Json(MessageResponse {
        message: "Email verified",
    }))
}

pub async fn enable_two_factor(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Setup2faResponse>, AuthError> {
    let setup = state.two_factor.setup(&user.user_id).await?;
    Ok(Json(Setup2faResponse {
        secret: setup.secret,
        otpauth_url: setup.otpauth_url,
        qr_code: setup.qr_code,
        backup_codes: setup.backup_codes,
    }))
}

pub async fn verify_two_factor(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<Verify2faRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state
        .two_factor
        .verify_setup(&user.user_id, &req.code)
        .await?;
    Ok(Json(MessageResponse {
        message: "Two-factor authentication enabled",
    }))
}

pub async fn disable_two_factor(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<Disable2faRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state
        .two_factor
        .disable(&user.user_id, &req.password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Two-factor authentication disabled",
    }))
}

pub async fn regenerate_backup_codes(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<BackupCodesResponse>, AuthError> {
    let codes = state
        .two_factor
        .regenerate_backup_codes(&user.user_id)
        .await?;
    Ok(Json(BackupCodesResponse { codes }))
}
