use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use chrono::Utc;
use uuid::Uuid;

use crate::services::hashing::PasswordHasher;
use crate::services::totp::{digest_hex, generate_backup_codes, TotpGenerator};

use super::audit::{AuditRecorder, AuthEvent};
use super::interface::{AuthError, AuthStore, Result};
use super::model::{AuditEvent as Event, BackupCode, User};

/// Everything the client needs to finish enrollment: the manual-entry key,
/// the provisioning URI (raw and base64 for QR rendering), and the one-time
/// backup codes. Codes are shown here and never again.
#[derive(Debug)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_url: String,
    pub qr_code: String,
    pub backup_codes: Vec<String>,
}

/// TOTP enrollment and verification.
///
/// State machine per account: Disabled -> PendingSetup (`setup`) ->
/// Enabled (`verify_setup`); Enabled -> Disabled (`disable`). `verify_login`
/// is only reachable from Enabled.
pub struct TwoFactorService {
    store: Arc<dyn AuthStore>,
    hasher: PasswordHasher,
    totp: TotpGenerator,
    audit: AuditRecorder,
}

impl TwoFactorService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        hasher: PasswordHasher,
        totp: TotpGenerator,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            store,
            hasher,
            totp,
            audit,
        }
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Begins enrollment: a fresh secret and backup codes are stored, but the
    /// account stays in the pending state until `verify_setup` proves the
    /// authenticator has the secret.
    pub async fn setup(&self, user_id: &str) -> Result<TwoFactorSetup> {
        let user = self.require_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let (secret, otpauth_url) = self.totp.generate_secret(&user.email);
        self.store
            .set_two_factor(&user.id, false, Some(&secret))
            .await?;

        let backup_codes = generate_backup_codes();
        let now = Utc::now();
        let hashed: Vec<BackupCode> = backup_codes
            .iter()
            .map(|code| BackupCode {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                code_hash: digest_hex(code),
                used: false,
                created_at: now,
            })
            .collect();
        self.store.replace_backup_codes(&user.id, &hashed).await?;

        self.audit
            .record(
                AuthEvent::new(Event::TwoFactorSetup)
                    .user_id(&user.id)
                    .email(&user.email)
                    .success(),
            )
            .await;

        let qr_code = base64_engine.encode(&otpauth_url);
        Ok(TwoFactorSetup {
            secret,
            otpauth_url,
            qr_code,
            backup_codes,
        })
    }

    /// Confirms enrollment with a live TOTP code. On failure the pending
    /// state is left untouched so the user can retry.
    pub async fn verify_setup(&self, user_id: &str, code: &str) -> Result<()> {
        let user = self.require_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }
        let Some(secret) = user.two_factor_secret.as_deref() else {
            return Err(AuthError::TwoFactorNotEnabled);
        };

        if !self.totp.verify_code(secret, code) {
            self.audit
                .record(
                    AuthEvent::new(Event::TwoFactorFailed)
                        .user_id(&user.id)
                        .email(&user.email)
                        .reason("setup code rejected"),
                )
                .await;
            return Err(AuthError::InvalidTwoFactorCode);
        }

        self.store
            .set_two_factor(&user.id, true, Some(secret))
            .await?;

        self.audit
            .record(
                AuthEvent::new(Event::TwoFactorEnabled)
                    .user_id(&user.id)
                    .email(&user.email)
                    .success(),
            )
            .await;
        Ok(())
    }

    /// The login second step: a live TOTP code, or an unused backup code.
    /// Backup codes are consumed exactly once; a replay loses the
    /// compare-and-swap and is rejected.
    pub async fn verify_login(
        &self,
        user_id: &str,
        code: Option<&str>,
        backup_code: Option<&str>,
    ) -> Result<User> {
        let user = self.require_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        let secret = user
            .two_factor_secret
            .as_deref()
            .ok_or(AuthError::TwoFactorNotEnabled)?;

        let outcome = if let Some(code) = code {
            if self.totp.verify_code(secret, code) {
                Ok(())
            } else {
                Err(AuthError::InvalidTwoFactorCode)
            }
        } else if let Some(backup_code) = backup_code {
            let normalized = backup_code.trim().to_uppercase();
            if self
                .store
                .consume_backup_code(&user.id, &digest_hex(&normalized))
                .await?
            {
                Ok(())
            } else {
                Err(AuthError::InvalidBackupCode)
            }
        } else {
            Err(AuthError::InvalidTwoFactorCode)
        };

        match outcome {
            Ok(()) => {
                self.audit
                    .record(
                        AuthEvent::new(Event::TwoFactorVerified)
                            .user_id(&user.id)
                            .email(&user.email)
                            .success(),
                    )
                    .await;
                Ok(user)
            }
            Err(e) => {
                self.audit
                    .record(
                        AuthEvent::new(Event::TwoFactorFailed)
                            .user_id(&user.id)
                            .email(&user.email)
                            .reason(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Disabling is password-gated; a stolen session alone cannot strip the
    /// second factor.
    pub async fn disable(&self, user_id: &str, password: &str) -> Result<()> {
        let user = self.require_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let verified = self
            .hasher
            .verify_blocking(password.to_string(), user.password_hash.clone())
            .await;
        if !verified {
            return Err(AuthError::InvalidCredentials);
        }

        self.store.set_two_factor(&user.id, false, None).await?;
        self.store.delete_backup_codes(&user.id).await?;

        self.audit
            .record(
                AuthEvent::new(Event::TwoFactorDisabled)
                    .user_id(&user.id)
                    .email(&user.email)
                    .success(),
            )
            .await;
        Ok(())
    }

    /// Replaces every outstanding backup code with a fresh batch.
    pub async fn regenerate_backup_codes(&self, user_id: &str) -> Result<Vec<String>> {
        let user = self.require_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let backup_codes = generate_backup_codes();
        let now = Utc::now();
        let hashed: Vec<BackupCode> = backup_codes
            .iter()
            .map(|code| BackupCode {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                code_hash: digest_hex(code),
                used: false,
                created_at: now,
            })
            .collect();
        self.store.replace_backup_codes(&user.id, &hashed).await?;

        Ok(backup_codes)
    }
}
