//! Identity service
//!
//! Registration, login, logout and "who am I" on top of the credential store
//! and the [`SessionStore`].
//!
//! Unknown emails and wrong passwords are reported the same way so a caller
//! cannot probe which accounts exist. Plaintext passwords and session tokens
//! are never logged.

use crate::db::is_unique_violation;
use crate::db::repositories::UserRepository;
use crate::models::{Session, User, MAX_EMAIL_LEN, MAX_USERNAME_LEN};
use crate::services::password::{
    hash_password_async, verify_dummy_password_async, verify_password_async,
};
use crate::services::session::SessionStore;
use anyhow::Context;
use std::sync::Arc;

/// Error types for identity operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Username or email already registered
    #[error("{0}")]
    Conflict(String),

    /// Unknown email or wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Missing, unknown or expired token
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Input for registering a user
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Input for logging in
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    sessions: Arc<SessionStore>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, sessions: Arc<SessionStore>) -> Self {
        Self {
            user_repo,
            sessions,
        }
    }

    /// Session store backing this service
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// - `Validation` if a field is empty or the email has no `@`
    /// - `Conflict` if the username or email is taken, including when a
    ///   concurrent registration wins the race
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_registration(&username, &email, &input.password)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password_async(input.password).await?;
        let user = User::new(username, email, password_hash);

        let created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::Conflict(
                    "Username or email is already registered".to_string(),
                ));
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = %created.id, username = %created.username, "User registered");
        Ok(created)
    }

    /// Check credentials and issue a session.
    pub async fn authenticate(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let Some(user) = self
            .user_repo
            .get_by_email(input.email.trim())
            .await
            .context("Failed to look up user")?
        else {
            // Same hashing cost as a wrong password
            let _ = verify_dummy_password_async(input.password).await;
            tracing::info!("Login failed");
            return Err(UserServiceError::InvalidCredentials);
        };

        let valid = verify_password_async(input.password, user.password_hash.clone())
            .await
            .context("Failed to verify password")?;
        if !valid {
            tracing::info!(user_id = %user.id, "Login failed");
            return Err(UserServiceError::InvalidCredentials);
        }

        let session = self.sessions.issue(user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(session)
    }

    /// Invalidate a session token. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.sessions.revoke(token).await?;
        Ok(())
    }

    /// Resolve the user behind a session token.
    pub async fn who_am_i(&self, token: &str) -> Result<User, UserServiceError> {
        let user_id = self
            .sessions
            .resolve(token)
            .await?
            .ok_or(UserServiceError::Unauthorized)?;

        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to load session user")?
            .ok_or(UserServiceError::Unauthorized)
    }
}

fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
) -> Result<(), UserServiceError> {
    let invalid = |message: String| Err(UserServiceError::Validation(message));

    if username.is_empty() {
        return invalid("Username is required".to_string());
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return invalid(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        ));
    }
    if email.is_empty() {
        return invalid("Email is required".to_string());
    }
    if !email.contains('@') {
        return invalid("Email is not valid".to_string());
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return invalid(format!("Email must be at most {} characters", MAX_EMAIL_LEN));
    }
    if password.is_empty() {
        return invalid("Password is required".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use std::time::Instant;

    async fn setup_service() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let sessions = Arc::new(SessionStore::new(SqlxSessionRepository::boxed(pool.clone())));
        UserService::new(SqlxUserRepository::boxed(pool), sessions)
    }

    fn register_input(username: &str, email: &str) -> RegisterInput {
        RegisterInput {
            username: username.to_string(),
            email: email.to_string(),
            password: "s3cret-pass".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_hashes_password() {
        let service = setup_service().await;
        let user = service
            .register(register_input("alice", "alice@example.com"))
            .await
            .expect("Registration should succeed");

        assert_eq!(user.username, "alice");
        assert_ne!(user.password_hash, "s3cret-pass");
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = setup_service().await;

        let cases = [
            register_input("", "a@example.com"),
            register_input("   ", "a@example.com"),
            register_input("alice", ""),
            register_input("alice", "not-an-email"),
            register_input(&"a".repeat(MAX_USERNAME_LEN + 1), "a@example.com"),
            register_input("alice", &format!("{}@example.com", "a".repeat(MAX_EMAIL_LEN))),
            RegisterInput {
                password: String::new(),
                ..register_input("alice", "alice@example.com")
            },
        ];

        for input in cases {
            let result = service.register(input).await;
            assert!(
                matches!(result, Err(UserServiceError::Validation(_))),
                "expected validation error, got {:?}",
                result
            );
        }
    }

    #[tokio::test]
    async fn test_register_accepts_longest_username() {
        let service = setup_service().await;
        let username = "u".repeat(MAX_USERNAME_LEN);
        let user = service
            .register(register_input(&username, "long@example.com"))
            .await
            .expect("Username at the limit should be accepted");
        assert_eq!(user.username, username);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts_and_keeps_first_user() {
        let service = setup_service().await;
        service
            .register(register_input("alice", "shared@example.com"))
            .await
            .unwrap();

        let result = service
            .register(register_input("bob", "shared@example.com"))
            .await;
        assert!(matches!(result, Err(UserServiceError::Conflict(_))));

        let session = service
            .authenticate(LoginInput {
                email: "shared@example.com".to_string(),
                password: "s3cret-pass".to_string(),
            })
            .await
            .expect("First user should still log in");
        let me = service.who_am_i(&session.id).await.unwrap();
        assert_eq!(me.username, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let service = setup_service().await;
        service
            .register(register_input("alice", "alice@example.com"))
            .await
            .unwrap();

        let result = service
            .register(register_input("alice", "other@example.com"))
            .await;
        assert!(matches!(result, Err(UserServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_authenticate_failures_are_uniform() {
        let service = setup_service().await;
        service
            .register(register_input("alice", "alice@example.com"))
            .await
            .unwrap();

        let wrong_password = service
            .authenticate(LoginInput {
                email: "alice@example.com".to_string(),
                password: "nope".to_string(),
            })
            .await;
        let unknown_email = service
            .authenticate(LoginInput {
                email: "ghost@example.com".to_string(),
                password: "s3cret-pass".to_string(),
            })
            .await;

        assert!(matches!(wrong_password, Err(UserServiceError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(UserServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_unknown_email_costs_a_password_verification() {
        let service = setup_service().await;
        service
            .register(register_input("alice", "alice@example.com"))
            .await
            .unwrap();
        let attempt = |email: &str| LoginInput {
            email: email.to_string(),
            password: "wrong".to_string(),
        };

        // Warm up the stand-in hash so neither timing includes computing it
        let _ = service.authenticate(attempt("ghost@example.com")).await;

        let started = Instant::now();
        let _ = service.authenticate(attempt("alice@example.com")).await;
        let wrong_password = started.elapsed();

        let started = Instant::now();
        let _ = service.authenticate(attempt("ghost@example.com")).await;
        let unknown_email = started.elapsed();

        assert!(
            unknown_email * 4 >= wrong_password,
            "unknown email took {:?}, wrong password took {:?}",
            unknown_email,
            wrong_password
        );
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let service = setup_service().await;
        let user = service
            .register(register_input("alice", "alice@example.com"))
            .await
            .unwrap();

        let session = service
            .authenticate(LoginInput {
                email: "alice@example.com".to_string(),
                password: "s3cret-pass".to_string(),
            })
            .await
            .unwrap();

        let me = service.who_am_i(&session.id).await.unwrap();
        assert_eq!(me.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(matches!(
            service.who_am_i(&session.id).await,
            Err(UserServiceError::Unauthorized)
        ));

        // Logging out twice is harmless
        service.logout(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_multiple_sessions_per_user() {
        let service = setup_service().await;
        service
            .register(register_input("alice", "alice@example.com"))
            .await
            .unwrap();
        let login = || LoginInput {
            email: "alice@example.com".to_string(),
            password: "s3cret-pass".to_string(),
        };

        let first = service.authenticate(login()).await.unwrap();
        let second = service.authenticate(login()).await.unwrap();
        assert_ne!(first.id, second.id);

        service.logout(&first.id).await.unwrap();
        assert!(service.who_am_i(&second.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_who_am_i_unknown_token() {
        let service = setup_service().await;
        assert!(matches!(
            service.who_am_i("bogus").await,
            Err(UserServiceError::Unauthorized)
        ));
    }
}
