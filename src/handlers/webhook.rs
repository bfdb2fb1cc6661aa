// src/handlers/webhook.rs

//! Telegram delivery endpoint: authenticates the webhook, routes callback
//! queries into the verification flow, correlates owner replies back to the
//! original sender, and relays everything else to the owner.

use crate::log_error;
use crate::services::store::VerificationStore;
use crate::services::telegram::{response_ok, BotApiClient};
use crate::services::verification;
use crate::types::Config;
use crate::utils::display_name;
use serde_json::{json, Value};
use worker::{Request, Response, Result};

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Result of processing one authenticated update. Everything Telegram should
/// not re-deliver resolves to `Ok`; only unexpected processing failures
/// surface as a server error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Ok,
    ServerError,
}

/// Telegram's shared-secret header must match the configured value exactly.
pub fn authorized(header: Option<&str>, secret_token: &str) -> bool {
    header == Some(secret_token)
}

/// Entry point for webhook deliveries. Authenticates before touching the
/// body.
pub async fn handle_webhook(
    mut req: Request,
    owner_uid: &str,
    bot_token: &str,
    config: &Config,
    store: Option<&dyn VerificationStore>,
) -> Result<Response> {
    let header = req.headers().get(SECRET_HEADER)?;
    if !authorized(header.as_deref(), &config.secret_token) {
        return Response::error("Unauthorized", 401);
    }

    let update: Value = match req.json().await {
        Ok(update) => update,
        Err(e) => {
            log_error!("Error parsing webhook body", json!({ "error": e.to_string() }));
            return Response::error("Internal Server Error", 500);
        }
    };

    let client = BotApiClient::new(bot_token);
    match process_update(&update, &client, owner_uid, bot_token, config, store).await {
        UpdateOutcome::Ok => Response::ok("OK"),
        UpdateOutcome::ServerError => Response::error("Internal Server Error", 500),
    }
}

/// Handles one authenticated update.
pub async fn process_update(
    update: &Value,
    client: &BotApiClient,
    owner_uid: &str,
    bot_token: &str,
    config: &Config,
    store: Option<&dyn VerificationStore>,
) -> UpdateOutcome {
    // Callback queries belong to the verification flow exclusively.
    if update.get("callback_query").is_some() {
        verification::handle_callback_query(update, client, store, bot_token).await;
        return UpdateOutcome::Ok;
    }

    let message = match update.get("message") {
        Some(message) => message,
        None => return UpdateOutcome::Ok,
    };

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(|id| id.as_i64())
        .unwrap_or(0);
    let message_id = message
        .get("message_id")
        .and_then(|id| id.as_i64())
        .unwrap_or(0);

    // Owner replying to a relayed message: route it back to the sender whose
    // id is embedded in the relayed message's keyboard.
    if let Some(reply) = message.get("reply_to_message") {
        if chat_id.to_string() == owner_uid {
            if let Some(sender_uid) = extract_sender_uid(reply) {
                if let Ok(sender_chat) = sender_uid.parse::<i64>() {
                    if let Err(e) = client.copy_message(sender_chat, chat_id, message_id, None).await
                    {
                        log_error!(
                            "Error relaying owner reply",
                            json!({ "error": e.to_string() })
                        );
                        return UpdateOutcome::ServerError;
                    }
                }
            }

            return UpdateOutcome::Ok;
        }
    }

    if message.get("text").and_then(|t| t.as_str()) == Some("/start") {
        return UpdateOutcome::Ok;
    }

    let sender = message.get("chat").cloned().unwrap_or_else(|| json!({}));
    let sender_uid = chat_id.to_string();
    let sender_name = display_name(&sender);

    // Verification gate: challenge unverified or stale senders instead of
    // relaying this message.
    if config.verification_enabled && store.is_some() {
        let status = verification::check_verification(
            store,
            bot_token,
            &sender_uid,
            config.verification_timeout_days,
        )
        .await;

        if !status.verified || status.need_reverify {
            verification::send_verification_message(client, chat_id, &sender_uid).await;
            return UpdateOutcome::Ok;
        }

        verification::update_verification(store, bot_token, &sender_uid).await;
    }

    let owner_chat = match owner_uid.parse::<i64>() {
        Ok(owner_chat) => owner_chat,
        Err(_) => {
            log_error!("Owner uid is not numeric", json!({ "owner_uid": owner_uid }));
            return UpdateOutcome::Ok;
        }
    };

    // Relay to the owner with the sender id embedded as a deep link; if that
    // is rejected, retry once with the id as plain callback data. Old
    // messages in either format stay replyable.
    let primary = client
        .copy_message(
            owner_chat,
            chat_id,
            message_id,
            Some(relay_keyboard(&sender_name, &sender_uid, true)),
        )
        .await;

    match primary {
        Ok(body) if response_ok(&body) => {}
        Ok(_) => {
            if let Err(e) = client
                .copy_message(
                    owner_chat,
                    chat_id,
                    message_id,
                    Some(relay_keyboard(&sender_name, &sender_uid, false)),
                )
                .await
            {
                log_error!("Error relaying to owner", json!({ "error": e.to_string() }));
                return UpdateOutcome::ServerError;
            }
        }
        Err(e) => {
            log_error!("Error relaying to owner", json!({ "error": e.to_string() }));
            return UpdateOutcome::ServerError;
        }
    }

    UpdateOutcome::Ok
}

/// Reads the original sender's id out of a relayed message's inline keyboard.
/// Prefers the button's raw callback data; falls back to the id encoded in a
/// `tg://user?id=` deep link.
pub fn extract_sender_uid(reply: &Value) -> Option<String> {
    let button = reply
        .get("reply_markup")?
        .get("inline_keyboard")?
        .as_array()?
        .first()?
        .as_array()?
        .first()?;

    if let Some(data) = button
        .get("callback_data")
        .and_then(|d| d.as_str())
        .filter(|d| !d.is_empty())
    {
        return Some(data.to_string());
    }

    button
        .get("url")?
        .as_str()?
        .strip_prefix("tg://user?id=")
        .map(String::from)
}

/// One-button keyboard tagging a relayed message with its sender. The
/// deep-link variant is the primary format; the plain callback-data variant
/// is the degraded retry.
pub fn relay_keyboard(sender_name: &str, sender_uid: &str, with_url: bool) -> Value {
    let mut button = json!({
        "text": format!("🔏 From: {} ({})", sender_name, sender_uid),
        "callback_data": sender_uid,
    });

    if with_url {
        button["text"] = json!(format!("🔓 From: {} ({})", sender_name, sender_uid));
        button["url"] = json!(format!("tg://user?id={}", sender_uid));
    }

    json!({ "inline_keyboard": [[button]] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorized_requires_exact_match() {
        assert!(authorized(Some("S3cretS3cretS3cret"), "S3cretS3cretS3cret"));
        assert!(!authorized(Some("wrong"), "S3cretS3cretS3cret"));
        assert!(!authorized(None, "S3cretS3cretS3cret"));
        assert!(!authorized(None, ""));
    }

    #[test]
    fn test_extract_sender_uid_prefers_callback_data() {
        let reply = json!({
            "reply_markup": { "inline_keyboard": [[{
                "text": "🔏 From: alice (555)",
                "callback_data": "555"
            }]] }
        });
        assert_eq!(extract_sender_uid(&reply), Some("555".to_string()));
    }

    #[test]
    fn test_extract_sender_uid_falls_back_to_deep_link() {
        let reply = json!({
            "reply_markup": { "inline_keyboard": [[{
                "text": "🔓 From: bob (777)",
                "url": "tg://user?id=777"
            }]] }
        });
        assert_eq!(extract_sender_uid(&reply), Some("777".to_string()));
    }

    #[test]
    fn test_extract_sender_uid_unexpected_shapes() {
        assert_eq!(extract_sender_uid(&json!({})), None);
        assert_eq!(
            extract_sender_uid(&json!({"reply_markup": {"inline_keyboard": []}})),
            None
        );
        // empty callback_data behaves as absent
        let reply = json!({
            "reply_markup": { "inline_keyboard": [[{
                "text": "x",
                "callback_data": "",
                "url": "tg://user?id=9"
            }]] }
        });
        assert_eq!(extract_sender_uid(&reply), Some("9".to_string()));
    }

    #[test]
    fn test_relay_keyboard_variants() {
        let primary = relay_keyboard("@alice", "555", true);
        let button = &primary["inline_keyboard"][0][0];
        assert_eq!(button["text"], "🔓 From: @alice (555)");
        assert_eq!(button["url"], "tg://user?id=555");
        assert_eq!(button["callback_data"], "555");

        let degraded = relay_keyboard("@alice", "555", false);
        let button = &degraded["inline_keyboard"][0][0];
        assert_eq!(button["text"], "🔏 From: @alice (555)");
        assert_eq!(button["callback_data"], "555");
        assert!(button.get("url").is_none());
    }

    #[test]
    fn test_relay_roundtrip_both_formats() {
        for with_url in [true, false] {
            let relayed = json!({ "reply_markup": relay_keyboard("@alice", "555", with_url) });
            assert_eq!(extract_sender_uid(&relayed), Some("555".to_string()));
        }
    }
}
