// src/types.rs

use serde::{Deserialize, Serialize};

/// Per-request configuration, built once from environment bindings in the
/// fetch entry point and passed by value into the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub prefix: String,
    pub secret_token: String,
    pub verification_enabled: bool,
    pub verification_timeout_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: "public".to_string(),
            secret_token: String::new(),
            verification_enabled: false,
            verification_timeout_days: 7,
        }
    }
}

/// Durable marker of a sender's last successful contact, keyed in KV by
/// `verified_user:<botToken>:<userId>`. Serialized camelCase so records
/// written by earlier deployments stay readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub user_id: String,
    /// Epoch milliseconds of the last accepted message.
    pub last_message_time: i64,
    /// Epoch milliseconds of the first successful verification.
    pub verified_at: i64,
}

/// Result of a verification lookup. `need_reverify` marks a previously
/// verified sender whose last contact is older than the configured timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationStatus {
    pub verified: bool,
    pub need_reverify: bool,
}

impl VerificationStatus {
    /// Fail-open status used when no store is configured or storage errs.
    pub fn pass() -> Self {
        Self {
            verified: true,
            need_reverify: false,
        }
    }
}

/// An arithmetic human-verification challenge. Ephemeral: the question lives
/// only in the outgoing message text, the answer is re-derived from that text
/// when the callback arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathChallenge {
    pub question: String,
    pub answer: i64,
}
