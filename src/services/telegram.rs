// src/services/telegram.rs

//! Telegram Bot API client.
//!
//! One JSON POST per Bot API method. The parsed response body is returned as
//! is, including Telegram-level `ok: false` bodies, so callers can branch on
//! the API's own verdict; only transport and decode failures become errors.

use crate::utils::{RelayError, RelayResult};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

const API_BASE: &str = "https://api.telegram.org";

pub struct BotApiClient {
    token: String,
    http_client: Client,
    test_mode: bool,
    canned_responses: Mutex<VecDeque<Value>>,
    recorded_calls: Mutex<Vec<(String, Value)>>,
}

impl BotApiClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http_client: Client::new(),
            test_mode: false,
            canned_responses: Mutex::new(VecDeque::new()),
            recorded_calls: Mutex::new(Vec::new()),
        }
    }

    /// Test-mode clients answer every call with a canned success body and
    /// never touch the network.
    pub fn with_test_mode(mut self) -> Self {
        self.test_mode = true;
        self
    }

    /// Test mode with scripted bodies: each call consumes the next queued
    /// body, then falls back to the default success body once the queue is
    /// drained.
    pub fn with_test_responses(mut self, responses: Vec<Value>) -> Self {
        self.test_mode = true;
        self.canned_responses = Mutex::new(responses.into());
        self
    }

    /// Method/payload pairs issued so far. Only test-mode clients record.
    pub fn recorded_calls(&self) -> Vec<(String, Value)> {
        self.recorded_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// POST a Bot API method. Returns the parsed JSON body whatever its
    /// `ok` field says; errs only on transport or decode failure.
    pub async fn call(&self, method: &str, payload: Value) -> RelayResult<Value> {
        if self.test_mode {
            if let Ok(mut calls) = self.recorded_calls.lock() {
                calls.push((method.to_string(), payload.clone()));
            }

            let canned = self
                .canned_responses
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front());
            return Ok(canned.unwrap_or_else(|| json!({"ok": true, "result": {"message_id": 12345}})));
        }

        let url = format!("{}/bot{}/{}", API_BASE, self.token, method);

        let response = self
            .http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::network_error(format!("HTTP request failed: {}", e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::network_error(format!("Failed to read response: {}", e)))?;

        serde_json::from_str(&body).map_err(|e| {
            RelayError::telegram_error(format!("Failed to parse Telegram response: {}", e))
        })
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> RelayResult<Value> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });

        if let Some(markup) = reply_markup {
            payload["reply_markup"] = markup;
        }

        self.call("sendMessage", payload).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> RelayResult<Value> {
        self.call(
            "editMessageText",
            json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
            }),
        )
        .await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> RelayResult<Value> {
        self.call(
            "answerCallbackQuery",
            json!({
                "callback_query_id": callback_query_id,
                "text": text,
            }),
        )
        .await
    }

    /// Copies a message verbatim into another chat, optionally attaching an
    /// inline keyboard.
    pub async fn copy_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        reply_markup: Option<Value>,
    ) -> RelayResult<Value> {
        let mut payload = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat_id,
            "message_id": message_id,
        });

        if let Some(markup) = reply_markup {
            payload["reply_markup"] = markup;
        }

        self.call("copyMessage", payload).await
    }

    /// Registers the webhook, requesting message and callback-query updates
    /// and arming Telegram's shared-secret header.
    pub async fn set_webhook(&self, webhook_url: &str, secret_token: &str) -> RelayResult<Value> {
        self.call(
            "setWebhook",
            json!({
                "url": webhook_url,
                "allowed_updates": ["message", "callback_query"],
                "secret_token": secret_token,
            }),
        )
        .await
    }

    pub async fn delete_webhook(&self) -> RelayResult<Value> {
        self.call("deleteWebhook", json!({})).await
    }
}

/// Reads the Bot API's own verdict out of a response body.
pub fn response_ok(body: &Value) -> bool {
    body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Extracts Telegram's error description, for surfacing in envelopes.
pub fn response_description(body: &Value) -> String {
    body.get("description")
        .and_then(|d| d.as_str())
        .unwrap_or("unknown error")
        .to_string()
}
