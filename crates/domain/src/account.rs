//! Registered accounts, as far as the cleanup sweep needs them.

use chrono::{DateTime, Duration, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

/// A registered user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates an account that has not confirmed its email yet.
    pub fn register(
        email: impl Into<String>,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            display_name: display_name.into(),
            email_confirmed: false,
            created_at: now,
        }
    }
}

/// How long a new account may stay unconfirmed.
///
/// Registration and the cleanup sweep share this window so an account that
/// is still allowed to verify is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountPolicy {
    pub confirmation_grace: Duration,
}

impl AccountPolicy {
    pub fn new(confirmation_grace: Duration) -> Self {
        Self { confirmation_grace }
    }

    /// Accounts created before this instant and still unconfirmed are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.confirmation_grace
    }

    /// Returns true if the account missed its confirmation window.
    pub fn is_expired(&self, account: &Account, now: DateTime<Utc>) -> bool {
        !account.email_confirmed && account.created_at < self.cutoff(now)
    }
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
