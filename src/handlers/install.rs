// src/handlers/install.rs

//! Webhook registration endpoints.

use crate::responses::{json_status, StatusResponse};
use crate::services::telegram::{response_description, response_ok, BotApiClient};
use crate::utils::validate_secret_token;
use url::Url;
use worker::{Request, Response, Result};

const SECRET_REQUIREMENTS: &str =
    "Secret token must be at least 16 characters and contain uppercase letters, lowercase letters, and numbers.";

/// The URL Telegram will deliver updates to, derived from the scheme and host
/// of the request that installed the bot.
pub fn webhook_url(request_url: &Url, prefix: &str, owner_uid: &str, bot_token: &str) -> String {
    let base = format!(
        "{}://{}",
        request_url.scheme(),
        request_url.host_str().unwrap_or_default()
    );
    format!("{}/{}/webhook/{}/{}", base, prefix, owner_uid, bot_token)
}

/// Registers this worker as the bot's webhook, requesting message and
/// callback-query updates guarded by the shared secret.
pub async fn handle_install(
    req: &Request,
    owner_uid: &str,
    bot_token: &str,
    prefix: &str,
    secret_token: &str,
) -> Result<Response> {
    if !validate_secret_token(secret_token) {
        return json_status(&StatusResponse::failure(SECRET_REQUIREMENTS), 400);
    }

    let url = webhook_url(&req.url()?, prefix, owner_uid, bot_token);

    let client = BotApiClient::new(bot_token);
    match client.set_webhook(&url, secret_token).await {
        Ok(body) if response_ok(&body) => json_status(
            &StatusResponse::success("Webhook successfully installed."),
            200,
        ),
        Ok(body) => json_status(
            &StatusResponse::failure(format!(
                "Failed to install webhook: {}",
                response_description(&body)
            )),
            400,
        ),
        Err(e) => json_status(
            &StatusResponse::failure(format!("Error installing webhook: {}", e)),
            500,
        ),
    }
}

/// Removes the bot's webhook registration.
pub async fn handle_uninstall(bot_token: &str, secret_token: &str) -> Result<Response> {
    if !validate_secret_token(secret_token) {
        return json_status(&StatusResponse::failure(SECRET_REQUIREMENTS), 400);
    }

    let client = BotApiClient::new(bot_token);
    match client.delete_webhook().await {
        Ok(body) if response_ok(&body) => json_status(
            &StatusResponse::success("Webhook successfully uninstalled."),
            200,
        ),
        Ok(body) => json_status(
            &StatusResponse::failure(format!(
                "Failed to uninstall webhook: {}",
                response_description(&body)
            )),
            400,
        ),
        Err(e) => json_status(
            &StatusResponse::failure(format!("Error uninstalling webhook: {}", e)),
            500,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_url_from_request() {
        let url = Url::parse("https://relay.example.workers.dev/public/install/42/ABC").unwrap();
        assert_eq!(
            webhook_url(&url, "public", "42", "ABC"),
            "https://relay.example.workers.dev/public/webhook/42/ABC"
        );
    }

    #[test]
    fn test_webhook_url_drops_port_and_path() {
        let url = Url::parse("http://localhost:8787/p/install/1/T?x=1").unwrap();
        assert_eq!(webhook_url(&url, "p", "1", "T"), "http://localhost/p/webhook/1/T");
    }
}
