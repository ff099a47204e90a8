//! Redis-backed session storage
//!
//! Sessions are stored as JSON under `session:<token>` with a Redis TTL equal
//! to their remaining lifetime, so Redis evicts them on its own and nothing
//! else has to be cleaned up.

use super::SessionRepository;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};

const SESSION_PREFIX: &str = "session:";

fn session_key(token: &str) -> String {
    format!("{}{}", SESSION_PREFIX, token)
}

/// Session repository on top of a shared multiplexed Redis connection
pub struct RedisSessionRepository {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisSessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionRepository").finish_non_exhaustive()
    }
}

impl RedisSessionRepository {
    /// Connect to Redis at `redis_url` (e.g. "redis://localhost:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl SessionRepository for RedisSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(session).context("Failed to serialize session")?;
        // SET EX rejects zero, so round up to at least one second
        let ttl = session.remaining().num_seconds().max(1) as u64;

        let _: () = conn
            .set_ex(session_key(&session.id), json, ttl)
            .await
            .context("Failed to store session in Redis")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn
            .get(session_key(id))
            .await
            .context("Failed to get session from Redis")?;

        json.map(|json| {
            serde_json::from_str::<Session>(&json).context("Failed to deserialize session")
        })
        .transpose()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(session_key(id))
            .await
            .context("Failed to delete session from Redis")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        // Redis evicts expired keys itself
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn test_key_layout() {
        assert_eq!(session_key("abc"), "session:abc");
    }

    #[tokio::test]
    #[ignore = "Requires Redis server"]
    async fn test_redis_session_roundtrip() {
        let url = std::env::var("REDIS_TEST_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let repo = RedisSessionRepository::new(&url).await.expect("Failed to connect");

        let session = Session::issue(Uuid::new_v4(), Duration::minutes(5));
        repo.create(&session).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, session.user_id);

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());

        // Deleting again is fine
        repo.delete(&session.id).await.unwrap();

        let mut conn = repo.connection.clone();
        let keys: Vec<String> = conn.keys(format!("*{}*", session.user_id)).await.unwrap();
        assert!(keys.is_empty(), "no per-user keys are written: {:?}", keys);
    }
}
