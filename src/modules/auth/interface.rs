use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{
    AuditLogEntry, BackupCode, EmailVerification, PasswordReset, RefreshTokenRecord, User,
};

pub type Result<T> = std::result::Result<T, AuthError>;

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;
    /// Lookup is case-insensitive; emails are stored lowercased.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn email_exists(&self, email: &str) -> Result<bool>;
    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()>;
    async fn set_email_verified(&self, user_id: &str, verified: bool) -> Result<()>;
    async fn set_two_factor(
        &self,
        user_id: &str,
        enabled: bool,
        secret: Option<&str>,
    ) -> Result<()>;
    /// Persists the updated failure counter and, when the policy tripped,
    /// the lockout deadline. Single-row update.
    async fn record_login_failure(
        &self,
        user_id: &str,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// Clears failure state and stamps last-login bookkeeping atomically.
    async fn record_login_success(
        &self,
        user_id: &str,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> Result<()>;
    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>>;
    /// Revokes the record iff it is still live. Returns false when another
    /// caller already consumed it (rotation race, replay).
    async fn consume_refresh_token(&self, token_hash: &str) -> Result<bool>;
    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64>;
    async fn delete_expired_refresh_tokens(&self) -> Result<u64>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    async fn create_password_reset(&self, reset: &PasswordReset) -> Result<()>;
    async fn find_password_reset(&self, token: &str) -> Result<Option<PasswordReset>>;
    async fn mark_reset_used(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait EmailVerificationRepository: Send + Sync {
    async fn create_email_verification(&self, verification: &EmailVerification) -> Result<()>;
    async fn find_email_verification(&self, token: &str) -> Result<Option<EmailVerification>>;
    async fn delete_email_verification(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait BackupCodeRepository: Send + Sync {
    /// Drops any existing codes for the user and stores the new batch.
    async fn replace_backup_codes(&self, user_id: &str, codes: &[BackupCode]) -> Result<()>;
    /// Marks the matching unused code as used. Compare-and-swap: under
    /// concurrent use of the same code at most one caller gets true.
    async fn consume_backup_code(&self, user_id: &str, code_hash: &str) -> Result<bool>;
    async fn delete_backup_codes(&self, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()>;
    async fn audit_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<AuditLogEntry>>;
    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>>;
    async fn delete_audit_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Everything the auth core needs from persistence, as one object-safe bound.
pub trait AuthStore:
    UserRepository
    + RefreshTokenRepository
    + PasswordResetRepository
    + EmailVerificationRepository
    + BackupCodeRepository
    + AuditLogRepository
{
}

impl<T> AuthStore for T where
    T: UserRepository
        + RefreshTokenRepository
        + PasswordResetRepository
        + EmailVerificationRepository
        + BackupCodeRepository
        + AuditLogRepository
{
}

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email, wrong password, locked or deactivated account. One
    /// variant on purpose: the response must not reveal which check failed.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid 2FA code")]
    InvalidTwoFactorCode,

    #[error("2FA not enabled")]
    TwoFactorNotEnabled,

    #[error("2FA already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("Invalid backup code")]
    InvalidBackupCode,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::EmailAlreadyExists => StatusCode::CONFLICT,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::InvalidTwoFactorCode => StatusCode::UNAUTHORIZED,
            Self::TwoFactorNotEnabled => StatusCode::BAD_REQUEST,
            Self::TwoFactorAlreadyEnabled => StatusCode::BAD_REQUEST,
            Self::InvalidBackupCode => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the client is allowed to see. Infrastructure detail stays in the
    /// server logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Hashing(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        if matches!(self, Self::Database(_) | Self::Hashing(_) | Self::Internal(_)) {
            tracing::error!("auth request failed: {self}");
        }
        let body = axum::Json(super::schema::ErrorResponse::new(self.public_message()));
        (self.status_code(), body).into_response()
    }
}
