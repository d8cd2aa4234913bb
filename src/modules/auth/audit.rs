use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::interface::{AuthStore, Result};
use super::model::{AuditEvent, AuditLogEntry, DeviceInfo};

/// A security event about to be appended.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub event: AuditEvent,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AuthEvent {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            event,
            user_id: None,
            email: None,
            ip: None,
            user_agent: None,
            success: false,
            error_message: None,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn device(mut self, device: Option<&DeviceInfo>) -> Self {
        if let Some(device) = device {
            self.ip = device.ip.clone();
            self.user_agent = device.user_agent.clone();
        }
        self
    }

    pub fn success(mut self) -> Self {
        self.success = true;
        self
    }

    pub fn reason(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Append-only log of security-relevant events. Recording never fails the
/// operation being audited: a store error is downgraded to a process-log line.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuthStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, event: AuthEvent) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            user_id: event.user_id,
            email: event.email,
            event: event.event.as_str().to_string(),
            ip: event.ip,
            user_agent: event.user_agent,
            success: event.success,
            error_message: event.error_message,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.append_audit(&entry).await {
            tracing::error!(
                event = entry.event,
                user_id = entry.user_id.as_deref(),
                "failed to persist audit entry: {e}"
            );
        }
    }

    pub async fn find_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.store.audit_for_user(user_id, limit).await
    }

    pub async fn find_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.store.recent_audit(limit).await
    }

    /// Retention maintenance, not a hot path.
    pub async fn clean_old_logs(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days.max(0));
        self.store.delete_audit_older_than(cutoff).await
    }
}
