use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::controller;
use crate::AppState;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(controller::register))
        .route("/login", post(controller::login))
        .route("/login/2fa", post(controller::login_two_factor))
        .route("/refresh", post(controller::refresh))
        .route("/logout", post(controller::logout))
        .route("/me", get(controller::me))
        .route("/forgot-password", post(controller::forgot_password))
        .route("/reset-password", post(controller::reset_password))
        .route("/request-verification", post(controller::request_verification))
        .route("/verify-email", post(controller::verify_email))
        .route("/enable-2fa", post(controller::enable_two_factor))
        .route("/verify-2fa", post(controller::verify_two_factor))
        .route("/disable-2fa", post(controller::disable_two_factor))
        .route(
            "/backup-codes/regenerate",
            post(controller::regenerate_backup_codes),
        )
}
