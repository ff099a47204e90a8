//! Session store
//!
//! Maps opaque tokens to user ids with an expiry. Expired sessions never
//! resolve: they are deleted the first time someone presents them, and the
//! periodic purge removes the ones nobody presents again.

use crate::db::repositories::SessionRepository;
use crate::models::Session;
use anyhow::{Context, Result};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Issues, resolves and revokes session tokens
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_ttl(repo, Duration::hours(DEFAULT_SESSION_TTL_HOURS))
    }

    pub fn with_ttl(repo: Arc<dyn SessionRepository>, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Session lifetime applied to newly issued tokens
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh session for `user_id`
    pub async fn issue(&self, user_id: Uuid) -> Result<Session> {
        let session = Session::issue(user_id, self.ttl);
        self.repo
            .create(&session)
            .await
            .context("Failed to store session")
    }

    /// Resolve a token to its user id.
    ///
    /// Returns `None` for unknown and expired tokens. An expired token is
    /// deleted on the way out.
    pub async fn resolve(&self, token: &str) -> Result<Option<Uuid>> {
        let Some(session) = self
            .repo
            .get_by_id(token)
            .await
            .context("Failed to look up session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            self.repo
                .delete(&session.id)
                .await
                .context("Failed to evict expired session")?;
            return Ok(None);
        }

        Ok(Some(session.user_id))
    }

    /// Remove a token. Unknown tokens are ignored.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.repo.delete(token).await.context("Failed to revoke session")
    }

    /// Drop every expired session, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = self
            .repo
            .delete_expired()
            .await
            .context("Failed to purge expired sessions")?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }
}
