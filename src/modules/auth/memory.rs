use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::interface::{
    AuditLogRepository, BackupCodeRepository, EmailVerificationRepository,
    PasswordResetRepository, RefreshTokenRepository, Result, UserRepository,
};
use super::model::{
    AuditLogEntry, BackupCode, EmailVerification, PasswordReset, RefreshTokenRecord, User,
};

/// In-memory store used by the integration tests and local development.
/// Mutations that must be atomic (backup-code consumption, refresh-token
/// rotation) happen under the write lock, giving the same at-most-one-winner
/// guarantee the SQL store gets from affected-row updates.
#[derive(Default)]
pub struct MemoryAuthStore {
    users: RwLock<HashMap<String, User>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
    password_resets: RwLock<Vec<PasswordReset>>,
    email_verifications: RwLock<Vec<EmailVerification>>,
    backup_codes: RwLock<Vec<BackupCode>>,
    audit_log: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Inspection helpers for tests; the SQL-backed deployments query the
    // database directly for the same purposes.
    // ------------------------------------------------------------------

    pub async fn user_by_email(&self, email: &str) -> Option<User> {
        let email = email.to_lowercase();
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    pub async fn latest_password_reset_token(&self, user_id: &str) -> Option<String> {
        self.password_resets
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.user_id == user_id)
            .map(|r| r.token.clone())
    }

    pub async fn latest_email_verification_token(&self, user_id: &str) -> Option<String> {
        self.email_verifications
            .read()
            .await
            .iter()
            .rev()
            .find(|v| v.user_id == user_id)
            .map(|v| v.token.clone())
    }

    pub async fn unused_backup_codes(&self, user_id: &str) -> usize {
        self.backup_codes
            .read()
            .await
            .iter()
            .filter(|c| c.user_id == user_id && !c.used)
            .count()
    }

    pub async fn deactivate_user(&self, user_id: &str) {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.is_active = false;
        }
    }

    pub async fn expire_lockout(&self, user_id: &str) {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.locked_until = Some(Utc::now() - chrono::Duration::seconds(1));
        }
    }

    pub async fn audit_events(&self, user_id: &str) -> Vec<String> {
        self.audit_log
            .read()
            .await
            .iter()
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .map(|e| e.event.clone())
            .collect()
    }
}

#[async_trait]
impl UserRepository for MemoryAuthStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.users
            .write()
            .await
            .insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.user_by_email(email).await)
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self.user_by_email(email).await.is_some())
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_email_verified(&self, user_id: &str, verified: bool) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.email_verified = verified;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: &str,
        enabled: bool,
        secret: Option<&str>,
    ) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.two_factor_enabled = enabled;
            user.two_factor_secret = secret.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: &str,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.failed_login_attempts = failed_attempts;
            user.locked_until = locked_until;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_login_success(
        &self,
        user_id: &str,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login_at = Some(at);
            user.last_login_ip = ip.map(str::to_string);
            user.login_count += 1;
            user.updated_at = at;
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryAuthStore {
    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> Result<()> {
        self.refresh_tokens
            .write()
            .await
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        Ok(self
            .refresh_tokens
            .read()
            .await
            .get(token_hash)
            .filter(|t| !t.revoked)
            .cloned())
    }

    async fn consume_refresh_token(&self, token_hash: &str) -> Result<bool> {
        let mut tokens = self.refresh_tokens.write().await;
        match tokens.get_mut(token_hash) {
            Some(token) if !token.revoked => {
                token.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64> {
        let mut tokens = self.refresh_tokens.write().await;
        let mut revoked = 0;
        for token in tokens.values_mut() {
            if token.user_id == user_id && !token.revoked {
                token.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn delete_expired_refresh_tokens(&self) -> Result<u64> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        let now = Utc::now();
        tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryAuthStore {
    async fn create_password_reset(&self, reset: &PasswordReset) -> Result<()> {
        self.password_resets.write().await.push(reset.clone());
        Ok(())
    }

    async fn find_password_reset(&self, token: &str) -> Result<Option<PasswordReset>> {
        Ok(self
            .password_resets
            .read()
            .await
            .iter()
            .find(|r| r.token == token)
            .cloned())
    }

    async fn mark_reset_used(&self, id: &str) -> Result<()> {
        if let Some(reset) = self
            .password_resets
            .write()
            .await
            .iter_mut()
            .find(|r| r.id == id)
        {
            reset.used = true;
        }
        Ok(())
    }
}

#[async_trait]
impl EmailVerificationRepository for MemoryAuthStore {
    async fn create_email_verification(&self, verification: &EmailVerification) -> Result<()> {
        self.email_verifications
            .write()
            .await
            .push(verification.clone());
        Ok(())
    }

    async fn find_email_verification(&self, token: &str) -> Result<Option<EmailVerification>> {
        Ok(self
            .email_verifications
            .read()
            .await
            .iter()
            .find(|v| v.token == token)
            .cloned())
    }

    async fn delete_email_verification(&self, id: &str) -> Result<()> {
        self.email_verifications.write().await.retain(|v| v.id != id);
        Ok(())
    }
}

#[async_trait]
impl BackupCodeRepository for MemoryAuthStore {
    async fn replace_backup_codes(&self, user_id: &str, codes: &[BackupCode]) -> Result<()> {
        let mut all = self.backup_codes.write().await;
        all.retain(|c| c.user_id != user_id);
        all.extend_from_slice(codes);
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: &str, code_hash: &str) -> Result<bool> {
        let mut all = self.backup_codes.write().await;
        match all
            .iter_mut()
            .find(|c| c.user_id == user_id && c.code_hash == code_hash && !c.used)
        {
            Some(code) => {
                code.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_backup_codes(&self, user_id: &str) -> Result<()> {
        self.backup_codes
            .write()
            .await
            .retain(|c| c.user_id != user_id);
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for MemoryAuthStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.audit_log.write().await.push(entry.clone());
        Ok(())
    }

    async fn audit_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<AuditLogEntry>> {
        Ok(self
            .audit_log
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        Ok(self
            .audit_log
            .read()
            .await
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn delete_audit_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut log = self.audit_log.write().await;
        let before = log.len();
        log.retain(|e| e.created_at >= cutoff);
        Ok((before - log.len()) as u64)
    }
}
