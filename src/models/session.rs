//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session entity binding an opaque token to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session token
    pub id: String,
    /// Associated user ID
    pub user_id: Uuid,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Issue a new session for `user_id` that lives for `ttl`.
    pub fn issue(user_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against an explicit instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Remaining lifetime, zero once expired
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_sets_expiry_from_ttl() {
        let user_id = Uuid::new_v4();
        let session = Session::issue(user_id, Duration::hours(24));

        assert_eq!(session.user_id, user_id);
        assert_eq!(session.expires_at - session.created_at, Duration::hours(24));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_tokens_are_unique() {
        let user_id = Uuid::new_v4();
        let a = Session::issue(user_id, Duration::hours(1));
        let b = Session::issue(user_id, Duration::hours(1));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_expiry_boundary() {
        let session = Session::issue(Uuid::new_v4(), Duration::hours(1));

        assert!(!session.is_expired_at(session.expires_at - Duration::seconds(1)));
        assert!(session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_remaining_is_zero_after_expiry() {
        let session = Session::issue(Uuid::new_v4(), Duration::seconds(-5));
        assert!(session.is_expired());
        assert_eq!(session.remaining(), Duration::zero());
    }
}
