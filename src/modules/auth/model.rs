use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub login_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transient login input. Never persisted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
    pub device: Option<DeviceInfo>,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl DeviceInfo {
    /// Compact form carried in token claims and audit rows.
    pub fn label(&self) -> Option<String> {
        self.user_agent.clone().or_else(|| self.ip.clone())
    }
}

/// Server-side record of an issued refresh token, stored hashed. A refresh
/// consumes (revokes) its record; the replacement gets a new row.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub device: Option<String>,
    pub ip: Option<String>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PasswordReset {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EmailVerification {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BackupCode {
    pub id: String,
    pub user_id: String,
    pub code_hash: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// Security-relevant events. Stored as their snake_case string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    LoginSuccess,
    LoginFailed,
    LoginBlocked,
    Logout,
    RegisterSuccess,
    RegisterFailed,
    PasswordResetRequest,
    PasswordResetSuccess,
    PasswordResetFailed,
    TwoFactorSetup,
    TwoFactorEnabled,
    TwoFactorDisabled,
    TwoFactorVerified,
    TwoFactorFailed,
    AccountLocked,
    AccountUnlocked,
    EmailVerified,
    TokenRefresh,
}

impl AuditEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::LoginBlocked => "login_blocked",
            Self::Logout => "logout",
            Self::RegisterSuccess => "register_success",
            Self::RegisterFailed => "register_failed",
            Self::PasswordResetRequest => "password_reset_request",
            Self::PasswordResetSuccess => "password_reset_success",
            Self::PasswordResetFailed => "password_reset_failed",
            Self::TwoFactorSetup => "two_factor_setup",
            Self::TwoFactorEnabled => "two_factor_enabled",
            Self::TwoFactorDisabled => "two_factor_disabled",
            Self::TwoFactorVerified => "two_factor_verified",
            Self::TwoFactorFailed => "two_factor_failed",
            Self::AccountLocked => "account_locked",
            Self::AccountUnlocked => "account_unlocked",
            Self::EmailVerified => "email_verified",
            Self::TokenRefresh => "token_refresh",
        }
    }
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit row. Never mutated; only the retention cleanup deletes.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub event: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
