use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One-time credential and login settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// How long an issued OTP stays redeemable, in milliseconds.
    pub otp_ttl_ms: u64,
    /// Expiry sweep period in milliseconds. Defaults to the TTL.
    pub otp_sweep_interval_ms: Option<u64>,
    /// Login user table (`username -> password`).
    pub users: HashMap<String, String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            otp_ttl_ms: 5000,
            otp_sweep_interval_ms: None,
            users: HashMap::new(),
        }
    }
}
