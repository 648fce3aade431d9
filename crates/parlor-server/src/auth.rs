//! Login credential verification for `POST /login`.

use std::collections::HashMap;

use parlor_settings::AuthSettings;
use serde::{Deserialize, Serialize};

/// Checks a username/password pair before an OTP is issued.
pub trait CredentialVerifier: Send + Sync {
    /// Whether `password` is correct for `username`.
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// A fixed user table, loaded from settings.
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    /// Build from an explicit `username -> password` table.
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    /// Build from the `auth.users` settings table.
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(settings.users.clone())
    }

    /// Number of configured users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no users are configured (every login fails).
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| constant_time_eq(expected.as_bytes(), password.as_bytes()))
    }
}

/// Constant-time comparison for password checks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `POST /login` request body.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginRequest {
    /// Account name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// `POST /login` success body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// One-time credential for the `otp` query parameter of `/ws`.
    pub otp: String,
}
