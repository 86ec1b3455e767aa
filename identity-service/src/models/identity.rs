//! Identity model - a user's credential record and lockout state.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Login state derived from the lock flag and lockout expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Active,
    Locked { until: DateTime<Utc> },
}

/// Brute-force lockout thresholds.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

/// Identity entity. Never hard-deleted.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub first_name: String,
    pub last_name: String,
    pub time_zone: Option<String>,
    pub is_activated: bool,
    pub is_locked: bool,
    pub lockout_expires_utc: Option<DateTime<Utc>>,
    pub failed_password_attempts: i32,
    pub last_logged_in_utc: Option<DateTime<Utc>>,
    pub last_activity_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Identity {
    /// Create a new active identity with zeroed counters.
    pub fn new(
        email: String,
        password_hash: String,
        password_salt: String,
        first_name: String,
        last_name: String,
        time_zone: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            identity_id: Uuid::new_v4(),
            email,
            password_hash,
            password_salt,
            first_name,
            last_name,
            time_zone,
            is_activated: true,
            is_locked: false,
            lockout_expires_utc: None,
            failed_password_attempts: 0,
            last_logged_in_utc: None,
            last_activity_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn lock_state(&self, now: DateTime<Utc>) -> LockState {
        match (self.is_locked, self.lockout_expires_utc) {
            (true, Some(until)) if until > now => LockState::Locked { until },
            _ => LockState::Active,
        }
    }

    /// True when a lock flag is still set but its window has passed.
    pub fn lockout_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_locked && self.lock_state(now) == LockState::Active
    }

    pub fn clear_lockout(&mut self, now: DateTime<Utc>) {
        self.is_locked = false;
        self.lockout_expires_utc = None;
        self.failed_password_attempts = 0;
        self.updated_utc = now;
    }

    pub fn record_successful_login(&mut self, now: DateTime<Utc>) {
        self.clear_lockout(now);
        self.last_logged_in_utc = Some(now);
        self.last_activity_utc = Some(now);
    }

    /// Apply one failed attempt under `policy`. Returns true if this attempt locked the account.
    pub fn record_failed_login(&mut self, policy: &LockoutPolicy, now: DateTime<Utc>) -> bool {
        self.failed_password_attempts += 1;
        self.updated_utc = now;
        if self.failed_password_attempts >= policy.max_failed_attempts {
            self.is_locked = true;
            self.lockout_expires_utc = Some(now + policy.lockout_duration);
            return true;
        }
        false
    }
}
