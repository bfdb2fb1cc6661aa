use worker::*;

// Module declarations
pub mod handlers;
pub mod responses;
pub mod router;
pub mod services;
pub mod types;
pub mod utils;

use services::store::VerificationStore;
use types::Config;

/// Builds the per-request configuration from environment bindings.
fn config_from_env(env: &Env) -> Config {
    Config {
        prefix: env
            .var("PREFIX")
            .map(|v| v.to_string())
            .unwrap_or_else(|_| "public".to_string()),
        secret_token: env
            .var("SECRET_TOKEN")
            .map(|v| v.to_string())
            .unwrap_or_default(),
        verification_enabled: env
            .var("VERIFICATION_ENABLED")
            .map(|v| v.to_string())
            .unwrap_or_default()
            == "true",
        verification_timeout_days: env
            .var("VERIFICATION_TIMEOUT_DAYS")
            .map(|v| v.to_string())
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7),
    }
}

#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    utils::logger::set_panic_hook();

    let config = config_from_env(&env);

    // The KV binding is optional; without it verification is disabled
    // entirely and every sender passes.
    #[cfg(target_arch = "wasm32")]
    let store = env
        .kv("VERIFICATION_KV")
        .ok()
        .map(services::store::KvVerificationStore::new);
    #[cfg(target_arch = "wasm32")]
    let store_ref = store.as_ref().map(|s| s as &dyn VerificationStore);

    #[cfg(not(target_arch = "wasm32"))]
    let store_ref: Option<&dyn VerificationStore> = None;

    router::handle_request(req, &config, store_ref).await
}
