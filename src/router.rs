// src/router.rs

//! Path routing. Three patterns, parameterized by the configured prefix:
//! install, uninstall, and the Telegram delivery endpoint. No HTTP verb
//! filtering beyond what the handlers themselves require.

use crate::handlers::{handle_install, handle_uninstall, handle_webhook};
use crate::services::store::VerificationStore;
use crate::types::Config;
use regex::Regex;
use worker::{Request, Response, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Install { owner_uid: String, bot_token: String },
    Uninstall { bot_token: String },
    Webhook { owner_uid: String, bot_token: String },
}

/// Matches a request path against the three prefix-parameterized patterns.
pub fn route(prefix: &str, path: &str) -> Option<Route> {
    let prefix = regex::escape(prefix);

    let install = Regex::new(&format!("^/{}/install/([^/]+)/([^/]+)$", prefix)).ok()?;
    if let Some(caps) = install.captures(path) {
        return Some(Route::Install {
            owner_uid: caps[1].to_string(),
            bot_token: caps[2].to_string(),
        });
    }

    let uninstall = Regex::new(&format!("^/{}/uninstall/([^/]+)$", prefix)).ok()?;
    if let Some(caps) = uninstall.captures(path) {
        return Some(Route::Uninstall {
            bot_token: caps[1].to_string(),
        });
    }

    let webhook = Regex::new(&format!("^/{}/webhook/([^/]+)/([^/]+)$", prefix)).ok()?;
    if let Some(caps) = webhook.captures(path) {
        return Some(Route::Webhook {
            owner_uid: caps[1].to_string(),
            bot_token: caps[2].to_string(),
        });
    }

    None
}

/// Dispatches one request to its handler; unmatched paths are 404.
pub async fn handle_request(
    req: Request,
    config: &Config,
    store: Option<&dyn VerificationStore>,
) -> Result<Response> {
    let url = req.url()?;

    match route(&config.prefix, url.path()) {
        Some(Route::Install {
            owner_uid,
            bot_token,
        }) => {
            handle_install(
                &req,
                &owner_uid,
                &bot_token,
                &config.prefix,
                &config.secret_token,
            )
            .await
        }
        Some(Route::Uninstall { bot_token }) => {
            handle_uninstall(&bot_token, &config.secret_token).await
        }
        Some(Route::Webhook {
            owner_uid,
            bot_token,
        }) => handle_webhook(req, &owner_uid, &bot_token, config, store).await,
        None => Response::error("Not Found", 404),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_route_captures_segments() {
        assert_eq!(
            route("public", "/public/webhook/42/ABC"),
            Some(Route::Webhook {
                owner_uid: "42".to_string(),
                bot_token: "ABC".to_string(),
            })
        );
    }

    #[test]
    fn test_install_and_uninstall_routes() {
        assert_eq!(
            route("public", "/public/install/42/123:ABC-def"),
            Some(Route::Install {
                owner_uid: "42".to_string(),
                bot_token: "123:ABC-def".to_string(),
            })
        );
        assert_eq!(
            route("public", "/public/uninstall/123:ABC-def"),
            Some(Route::Uninstall {
                bot_token: "123:ABC-def".to_string(),
            })
        );
    }

    #[test]
    fn test_unmatched_paths() {
        assert_eq!(route("public", "/"), None);
        assert_eq!(route("public", "/public/webhook/42"), None);
        assert_eq!(route("public", "/other/webhook/42/ABC"), None);
        assert_eq!(route("public", "/public/webhook/42/ABC/extra"), None);
        assert_eq!(route("public", "/public/install/42"), None);
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(
            route("my-bots", "/my-bots/uninstall/T"),
            Some(Route::Uninstall {
                bot_token: "T".to_string(),
            })
        );
        assert_eq!(route("my-bots", "/public/uninstall/T"), None);
    }
}
