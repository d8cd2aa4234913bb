pub mod config;
pub mod modules;
pub mod services;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use config::AuthConfig;
use modules::auth::audit::AuditRecorder;
use modules::auth::auth_routes;
use modules::auth::interface::AuthStore;
use modules::auth::lockout::LockoutPolicy;
use modules::auth::service::AuthService;
use modules::auth::two_factor::TwoFactorService;
use services::hashing::PasswordHasher;
use services::jwt::JwtService;
use services::rate_limit::{create_rate_limiter, RateLimitLayer};
use services::security::security_headers;
use services::totp::TotpGenerator;

pub struct AppState {
    pub auth: AuthService,
    pub two_factor: TwoFactorService,
    pub audit: AuditRecorder,
}

pub async fn create_app(store: Arc<dyn AuthStore>, config: &AuthConfig) -> Router {
    let jwt = JwtService::new(config);
    let hasher = PasswordHasher::new(config.argon2_memory_kib, config.argon2_iterations);
    let lockout = LockoutPolicy::new(config.lockout_threshold, config.lockout_duration_secs);
    let totp = TotpGenerator::new(config.jwt_issuer.clone());
    let audit = AuditRecorder::new(store.clone());

    let state = Arc::new(AppState {
        auth: AuthService::new(
            store.clone(),
            jwt,
            hasher.clone(),
            lockout,
            audit.clone(),
        ),
        two_factor: TwoFactorService::new(store, hasher, totp, audit.clone()),
        audit,
    });

    let rate_limiter = create_rate_limiter(config.rate_limit_burst, 60);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/auth", auth_routes())
        .layer(middleware::from_fn(security_headers))
        .layer(RequestBodyLimitLayer::new(1024 * 100)) // 100KB max body
        .layer(RateLimitLayer::new(rate_limiter))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "LungLife Auth API"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
