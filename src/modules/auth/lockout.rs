use chrono::{DateTime, Duration, Utc};

use super::model::User;

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutAction {
    FailedAttempt,
    LockedOut,
}

/// New per-account failure state to persist after an attempt.
#[derive(Debug, Clone, Copy)]
pub struct FailureUpdate {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub action: LockoutAction,
}

/// Temporary account lockout after repeated failed logins. Checked before
/// password verification when already locked (no point burning hash cost on
/// a locked account); failures are counted after verification otherwise, so
/// the attempt that crosses the threshold still counts.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    threshold: i32,
    duration: Duration,
}

impl LockoutPolicy {
    pub fn new(threshold: i32, duration_secs: i64) -> Self {
        Self {
            threshold: threshold.max(1),
            duration: Duration::seconds(duration_secs.max(1)),
        }
    }

    pub fn is_locked(&self, user: &User) -> bool {
        self.is_locked_at(user, Utc::now())
    }

    pub fn is_locked_at(&self, user: &User, now: DateTime<Utc>) -> bool {
        matches!(user.locked_until, Some(until) if until > now)
    }

    pub fn record_failure(&self, user: &User) -> FailureUpdate {
        self.record_failure_at(user, Utc::now())
    }

    pub fn record_failure_at(&self, user: &User, now: DateTime<Utc>) -> FailureUpdate {
        let failed_attempts = user.failed_login_attempts.saturating_add(1);
        if failed_attempts >= self.threshold {
            FailureUpdate {
                failed_attempts,
                locked_until: Some(now + self.duration),
                action: LockoutAction::LockedOut,
            }
        } else {
            FailureUpdate {
                failed_attempts,
                locked_until: user.locked_until,
                action: LockoutAction::FailedAttempt,
            }
        }
    }
}
