//! Password hashing
//!
//! Argon2id with the crate's default parameters and a random salt per hash.
//! Hashing is CPU-bound, so async callers go through [`hash_password_async`]
//! and [`verify_password_async`], which run on the blocking thread pool.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

/// Stand-in hash verified when no account matches a login, so unknown emails
/// cost the same argon2 work as wrong passwords.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("taskhive-no-such-account").ok());

/// Hash a password, returning a PHC string (`$argon2id$...`).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

pub async fn hash_password_async(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task panicked")?
}

pub async fn verify_password_async(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task panicked")?
}

/// Run a verification against [`DUMMY_HASH`] on the blocking pool.
///
/// The outcome carries no meaning; callers discard it.
pub async fn verify_dummy_password_async(password: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let hash = DUMMY_HASH
            .as_deref()
            .ok_or_else(|| anyhow!("Dummy password hash is unavailable"))?;
        verify_password(&password, hash)
    })
    .await
    .context("Password verification task panicked")?
}
