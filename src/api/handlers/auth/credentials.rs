//! Credential store: password hashing and signed token issuance.
//!
//! Passwords are hashed with argon2 (salted, PHC string format). Access and
//! refresh tokens are stateless JWTs over a shared secret; each carries a
//! fresh `jti`, so two tokens for the same subject issued in the same instant
//! still differ.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

const MIN_SECRET_LENGTH: usize = 32;

/// Hash a password for storage.
///
/// # Errors
/// Returns an error if the hasher itself fails; never logs the input.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// A malformed stored hash verifies as `false` instead of erroring, so a
/// corrupted row cannot take down the login path.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Claims carried by access and refresh tokens.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account id.
    pub sub: String,
    /// Absolute expiry, unix seconds.
    pub exp: i64,
    /// Unique token id, reserved for future revocation.
    pub jti: String,
}

/// Decode failures, kept distinguishable for future refresh/revocation logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Malformed token")]
    Malformed,
}

pub struct TokenSigner {
    secret: SecretString,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    /// Build a signer from configuration.
    ///
    /// # Errors
    /// Rejects secrets shorter than 32 characters and unknown algorithms.
    pub fn new(
        secret: SecretString,
        algorithm: &str,
        access_ttl_minutes: i64,
        refresh_ttl_days: i64,
    ) -> Result<Self> {
        if secret.expose_secret().len() < MIN_SECRET_LENGTH {
            return Err(anyhow!(
                "token secret must be at least {MIN_SECRET_LENGTH} characters"
            ));
        }
        let algorithm = Algorithm::from_str(algorithm)
            .map_err(|_| anyhow!("unsupported token algorithm: {algorithm}"))?;

        Ok(Self {
            secret,
            algorithm,
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::days(refresh_ttl_days),
        })
    }

    /// Issue a short-lived access token for `subject`.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue_access_token(&self, subject: &str, ttl: Option<Duration>) -> Result<String> {
        self.issue(subject, ttl.unwrap_or(self.access_ttl))
    }

    /// Issue a long-lived refresh token for `subject`.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue_refresh_token(&self, subject: &str, ttl: Option<Duration>) -> Result<String> {
        self.issue(subject, ttl.unwrap_or(self.refresh_ttl))
    }

    fn issue(&self, subject: &str, ttl: Duration) -> Result<String> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(self.algorithm),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|err| anyhow!("failed to sign token: {err}"))
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// # Errors
    /// `Expired`, `InvalidSignature`, or `Malformed`; callers may collapse
    /// all three into "unauthorized".
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        })
    }
}
