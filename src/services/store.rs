// src/services/store.rs

//! Verification store adapter.
//!
//! The relay's only durable state is one record per `(botToken, userId)`.
//! The store binding is optional; its absence disables verification entirely
//! (fail-open), which callers model as `Option<&dyn VerificationStore>`.

use crate::utils::RelayResult;
use async_trait::async_trait;

/// Plain get/put string storage. Last writer wins; no transactions.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait VerificationStore {
    async fn get(&self, key: &str) -> RelayResult<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> RelayResult<()>;
}

/// KV key for a sender's verification record.
pub fn verification_key(bot_token: &str, user_id: &str) -> String {
    format!("verified_user:{}:{}", bot_token, user_id)
}

/// Cloudflare KV-backed store.
#[cfg(target_arch = "wasm32")]
pub struct KvVerificationStore {
    kv_store: worker::kv::KvStore,
}

#[cfg(target_arch = "wasm32")]
impl KvVerificationStore {
    pub fn new(kv_store: worker::kv::KvStore) -> Self {
        Self { kv_store }
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl VerificationStore for KvVerificationStore {
    async fn get(&self, key: &str) -> RelayResult<Option<String>> {
        use crate::utils::RelayError;

        self.kv_store
            .get(key)
            .text()
            .await
            .map_err(|e| RelayError::storage_error(format!("KV get failed: {:?}", e)))
    }

    async fn put(&self, key: &str, value: &str) -> RelayResult<()> {
        use crate::utils::RelayError;

        self.kv_store
            .put(key, value)
            .map_err(|e| RelayError::storage_error(format!("KV put failed: {:?}", e)))?
            .execute()
            .await
            .map_err(|e| RelayError::storage_error(format!("KV put execute failed: {:?}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_key_layout() {
        assert_eq!(
            verification_key("123:ABC", "42"),
            "verified_user:123:ABC:42"
        );
    }
}
