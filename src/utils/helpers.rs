// src/utils/helpers.rs

use serde_json::Value;

/// Checks that a shared secret is strong enough to gate install/uninstall and
/// to serve as the webhook secret header value.
///
/// Valid iff longer than 15 characters and containing at least one uppercase
/// ASCII letter, one lowercase ASCII letter, and one digit.
pub fn validate_secret_token(token: &str) -> bool {
    token.len() > 15
        && token.chars().any(|c| c.is_ascii_uppercase())
        && token.chars().any(|c| c.is_ascii_lowercase())
        && token.chars().any(|c| c.is_ascii_digit())
}

/// Builds a human-readable sender name from a Telegram chat object.
///
/// Prefers `@username`; otherwise joins first and last name, skipping
/// whichever parts are missing. An empty username counts as absent.
pub fn display_name(chat: &Value) -> String {
    if let Some(username) = chat
        .get("username")
        .and_then(|u| u.as_str())
        .filter(|u| !u.is_empty())
    {
        return format!("@{}", username);
    }

    [chat.get("first_name"), chat.get("last_name")]
        .iter()
        .filter_map(|part| part.and_then(|p| p.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}
