use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::services::hashing::PasswordHasher;
use crate::services::jwt::{JwtService, TokenPair};
use crate::services::totp::digest_hex;

use super::audit::{AuditRecorder, AuthEvent};
use super::interface::{AuthError, AuthStore, Result};
use super::lockout::{LockoutAction, LockoutPolicy};
use super::model::{
    AuditEvent as Event, Credentials, DeviceInfo, EmailVerification, PasswordReset,
    RefreshTokenRecord, User,
};

const PASSWORD_RESET_TTL_HOURS: i64 = 1;
const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;
const MIN_PASSWORD_LEN: usize = 8;

pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug)]
pub enum LoginResult {
    Success { user: User, tokens: TokenPair },
    /// Password checked out but the account owes a TOTP code. No tokens yet;
    /// the pending token is only good for the second step.
    TwoFactorRequired { two_factor_token: String },
}

/// Orchestrates credential verification, lockout accounting, token issuance
/// and the audit trail.
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    jwt: JwtService,
    hasher: PasswordHasher,
    lockout: LockoutPolicy,
    audit: AuditRecorder,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        jwt: JwtService,
        hasher: PasswordHasher,
        lockout: LockoutPolicy,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            store,
            jwt,
            hasher,
            lockout,
            audit,
        }
    }

    pub fn validate_password_strength(password: &str) -> Result<()> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }

    pub async fn register(
        &self,
        input: RegisterInput,
        device: Option<&DeviceInfo>,
    ) -> Result<User> {
        let email = input.email.trim().to_lowercase();

        match self.register_inner(&email, input, device).await {
            Ok(user) => {
                self.audit
                    .record(
                        AuthEvent::new(Event::RegisterSuccess)
                            .user_id(&user.id)
                            .email(&user.email)
                            .device(device)
                            .success(),
                    )
                    .await;
                Ok(user)
            }
            Err(e) => {
                self.audit
                    .record(
                        AuthEvent::new(Event::RegisterFailed)
                            .email(&email)
                            .device(device)
                            .reason(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn register_inner(
        &self,
        email: &str,
        input: RegisterInput,
        _device: Option<&DeviceInfo>,
    ) -> Result<User> {
        Self::validate_password_strength(&input.password)?;

        if self.store.email_exists(email).await? {
            return Err(AuthError::EmailAlreadyExists);
        }

        // A hashing failure here is fatal; there is no account without a hash.
        let password_hash = self
            .hasher
            .hash_blocking(input.password)
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash,
            first_name: input.first_name,
            last_name: input.last_name,
            email_verified: false,
            two_factor_enabled: false,
            two_factor_secret: None,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            last_login_ip: None,
            login_count: 0,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.create_user(&user).await {
            // Two registrations can race past email_exists; the unique key
            // decides (MySQL error 1062).
            let msg = e.to_string();
            if msg.contains("Duplicate entry") || msg.contains("1062") {
                return Err(AuthError::EmailAlreadyExists);
            }
            return Err(e);
        }
        Ok(user)
    }

    /// The login first step. Every outcome other than success maps to the
    /// same `InvalidCredentials` response; the audit trail keeps the detail.
    pub async fn login(&self, credentials: Credentials) -> Result<LoginResult> {
        let email = credentials.email.trim().to_lowercase();
        let device = credentials.device.as_ref();

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            self.audit
                .record(
                    AuthEvent::new(Event::LoginFailed)
                        .email(&email)
                        .device(device)
                        .reason("user not found"),
                )
                .await;
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active {
            self.audit
                .record(
                    AuthEvent::new(Event::LoginBlocked)
                        .user_id(&user.id)
                        .email(&user.email)
                        .device(device)
                        .reason("account deactivated"),
                )
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        // Fast-reject while locked; don't spend hash time on the account.
        if self.lockout.is_locked(&user) {
            self.audit
                .record(
                    AuthEvent::new(Event::LoginBlocked)
                        .user_id(&user.id)
                        .email(&user.email)
                        .device(device)
                        .reason("account locked"),
                )
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        let verified = self
            .hasher
            .verify_blocking(credentials.password, user.password_hash.clone())
            .await;

        if !verified {
            return Err(self.handle_failed_password(&user, device).await?);
        }

        let now = Utc::now();
        let ip = device.and_then(|d| d.ip.as_deref());
        self.store.record_login_success(&user.id, ip, now).await?;

        // A deadline still on the record here means the lock expired rather
        // than being served out; this success clears it.
        if user.locked_until.is_some() {
            self.audit
                .record(
                    AuthEvent::new(Event::AccountUnlocked)
                        .user_id(&user.id)
                        .email(&user.email)
                        .device(device)
                        .success(),
                )
                .await;
        }

        if user.two_factor_enabled {
            let two_factor_token = self
                .jwt
                .create_two_factor_token(&user.id, &user.email)
                .map_err(|e| AuthError::Internal(e.to_string()))?;
            return Ok(LoginResult::TwoFactorRequired { two_factor_token });
        }

        let tokens = self.issue_session(&user, device).await?;
        self.audit
            .record(
                AuthEvent::new(Event::LoginSuccess)
                    .user_id(&user.id)
                    .email(&user.email)
                    .device(device)
                    .success(),
            )
            .await;

        Ok(LoginResult::Success { user, tokens })
    }

    /// Counts the failure and locks the account when the threshold is hit.
    /// Always resolves to `InvalidCredentials` for the caller.
    async fn handle_failed_password(
        &self,
        user: &User,
        device: Option<&DeviceInfo>,
    ) -> Result<AuthError> {
        let update = self.lockout.record_failure(user);
        self.store
            .record_login_failure(&user.id, update.failed_attempts, update.locked_until)
            .await?;

        match update.action {
            LockoutAction::LockedOut => {
                self.audit
                    .record(
                        AuthEvent::new(Event::AccountLocked)
                            .user_id(&user.id)
                            .email(&user.email)
                            .device(device)
                            .reason(format!(
                                "locked after {} failed attempts",
                                update.failed_attempts
                            )),
                    )
                    .await;
                self.audit
                    .record(
                        AuthEvent::new(Event::LoginBlocked)
                            .user_id(&user.id)
                            .email(&user.email)
                            .device(device)
                            .reason("account locked"),
                    )
                    .await;
            }
            LockoutAction::FailedAttempt => {
                self.audit
                    .record(
                        AuthEvent::new(Event::LoginFailed)
                            .user_id(&user.id)
                            .email(&user.email)
                            .device(device)
                            .reason("invalid password"),
                    )
                    .await;
            }
        }

        Ok(AuthError::InvalidCredentials)
    }

    /// Issues an access/refresh pair and persists the refresh token record
    /// (hashed) so it can be rotated and revoked.
    pub async fn issue_session(
        &self,
        user: &User,
        device: Option<&DeviceInfo>,
    ) -> Result<TokenPair> {
        let device_label = device.and_then(DeviceInfo::label);
        let tokens = self
            .jwt
            .create_token_pair(&user.id, &user.email, device_label.as_deref())
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let record = RefreshTokenRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            token_hash: digest_hex(&tokens.refresh_token),
            expires_at: Utc::now() + Duration::seconds(self.jwt.refresh_token_duration_secs()),
            device: device_label,
            ip: device.and_then(|d| d.ip.clone()),
            revoked: false,
            created_at: Utc::now(),
        };
        self.store.store_refresh_token(&record).await?;

        Ok(tokens)
    }

    /// Rotation: the presented refresh token is consumed and replaced. A
    /// consumed, revoked, unknown or cryptographically invalid token is all
    /// the same `InvalidToken` to the caller.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: Option<&DeviceInfo>,
    ) -> Result<TokenPair> {
        let claims = self
            .jwt
            .verify_refresh_token(refresh_token)
            .map_err(|_| AuthError::InvalidToken)?;

        let token_hash = digest_hex(refresh_token);
        let record = self
            .store
            .find_active_refresh_token(&token_hash)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.user_id != claims.sub || record.expires_at <= Utc::now() {
            return Err(AuthError::InvalidToken);
        }

        // CAS revoke: a replayed token loses here even if it still verifies.
        if !self.store.consume_refresh_token(&token_hash).await? {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidToken)?;

        let tokens = self.issue_session(&user, device).await?;
        self.audit
            .record(
                AuthEvent::new(Event::TokenRefresh)
                    .user_id(&user.id)
                    .email(&user.email)
                    .device(device)
                    .success(),
            )
            .await;

        Ok(tokens)
    }

    /// Revokes the given refresh token, or every token for the user.
    pub async fn logout(&self, user_id: &str, refresh_token: Option<&str>) -> Result<()> {
        match refresh_token {
            Some(token) => {
                let consumed = self.store.consume_refresh_token(&digest_hex(token)).await?;
                if !consumed {
                    tracing::debug!(user_id, "logout for already-revoked refresh token");
                }
            }
            None => {
                self.store.revoke_all_for_user(user_id).await?;
            }
        }

        self.audit
            .record(AuthEvent::new(Event::Logout).user_id(user_id).success())
            .await;
        Ok(())
    }

    pub async fn current_user(&self, user_id: &str) -> Result<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Always succeeds from the caller's point of view so the endpoint can't
    /// be used to probe which emails exist. Returns the reset token for the
    /// mailer collaborator when the account was found.
    pub async fn forgot_password(
        &self,
        email: &str,
        device: Option<&DeviceInfo>,
    ) -> Result<Option<String>> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            self.audit
                .record(
                    AuthEvent::new(Event::PasswordResetRequest)
                        .email(&email)
                        .device(device)
                        .reason("user not found"),
                )
                .await;
            return Ok(None);
        };

        let reset = PasswordReset {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            token: Uuid::new_v4().simple().to_string(),
            expires_at: Utc::now() + Duration::hours(PASSWORD_RESET_TTL_HOURS),
            used: false,
            created_at: Utc::now(),
        };
        self.store.create_password_reset(&reset).await?;

        self.audit
            .record(
                AuthEvent::new(Event::PasswordResetRequest)
                    .user_id(&user.id)
                    .email(&user.email)
                    .device(device)
                    .success(),
            )
            .await;

        Ok(Some(reset.token))
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        match self.reset_password_inner(token, new_password).await {
            Ok(user_id) => {
                self.audit
                    .record(
                        AuthEvent::new(Event::PasswordResetSuccess)
                            .user_id(&user_id)
                            .success(),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                self.audit
                    .record(AuthEvent::new(Event::PasswordResetFailed).reason(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn reset_password_inner(&self, token: &str, new_password: &str) -> Result<String> {
        Self::validate_password_strength(new_password)?;

        let reset = self
            .store
            .find_password_reset(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if reset.used || reset.expires_at <= Utc::now() {
            return Err(AuthError::InvalidToken);
        }

        let password_hash = self
            .hasher
            .hash_blocking(new_password.to_string())
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        self.store
            .update_password(&reset.user_id, &password_hash)
            .await?;
        self.store.mark_reset_used(&reset.id).await?;

        // A fresh password clears failure state and invalidates old sessions.
        self.store
            .record_login_failure(&reset.user_id, 0, None)
            .await?;
        self.store.revoke_all_for_user(&reset.user_id).await?;

        Ok(reset.user_id)
    }

    /// Issues an email-verification token for the mailer collaborator.
    pub async fn request_email_verification(&self, user_id: &str) -> Result<String> {
        let user = self.current_user(user_id).await?;
        if user.email_verified {
            return Err(AuthError::Validation("Email already verified".to_string()));
        }

        let verification = EmailVerification {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            token: Uuid::new_v4().simple().to_string(),
            expires_at: Utc::now() + Duration::hours(EMAIL_VERIFICATION_TTL_HOURS),
            created_at: Utc::now(),
        };
        self.store.create_email_verification(&verification).await?;

        Ok(verification.token)
    }

    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let verification = self
            .store
            .find_email_verification(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if verification.expires_at <= Utc::now() {
            return Err(AuthError::InvalidToken);
        }

        self.store
            .set_email_verified(&verification.user_id, true)
            .await?;
        self.store.delete_email_verification(&verification.id).await?;

        self.audit
            .record(
                AuthEvent::new(Event::EmailVerified)
                    .user_id(&verification.user_id)
                    .success(),
            )
            .await;
        Ok(())
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }
}
