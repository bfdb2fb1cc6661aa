// src/services/verification.rs

//! Human-verification engine.
//!
//! First contact (and contact after a long silence) is gated behind a small
//! arithmetic challenge delivered as an inline keyboard. Challenges are
//! stateless: the correct answer is re-derived from the challenge message's
//! own text when the callback arrives, so in-flight challenges survive
//! process restarts. The only stored state is the per-sender
//! `VerificationRecord`.

use crate::services::store::{verification_key, VerificationStore};
use crate::services::telegram::BotApiClient;
use crate::types::{MathChallenge, VerificationRecord, VerificationStatus};
use crate::{log_error, log_warn};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde_json::{json, Value};

const QUESTION_PATTERN: &str = r"(\d+)\s*([+\-×])\s*(\d+)\s*=\s*\?";

/// Generates a challenge with operands in [1, 20] and an operator drawn from
/// {+, -, ×}. Subtraction orders the operands so the answer is never
/// negative, and the question text shows the order actually used.
pub fn generate_math_challenge() -> MathChallenge {
    let mut rng = rand::thread_rng();
    let num1: i64 = rng.gen_range(1..=20);
    let num2: i64 = rng.gen_range(1..=20);

    match rng.gen_range(0..3) {
        0 => MathChallenge {
            question: format!("{} + {} = ?", num1, num2),
            answer: num1 + num2,
        },
        1 => {
            let (minuend, subtrahend) = if num1 >= num2 {
                (num1, num2)
            } else {
                (num2, num1)
            };
            MathChallenge {
                question: format!("{} - {} = ?", minuend, subtrahend),
                answer: minuend - subtrahend,
            }
        }
        _ => MathChallenge {
            question: format!("{} × {} = ?", num1, num2),
            answer: num1 * num2,
        },
    }
}

/// Synthesizes exactly three distinct wrong answers near the correct one,
/// retrying offsets in [-5, +4] until three non-negative candidates that
/// differ from the answer (and each other) are collected.
pub fn wrong_answers(correct: i64) -> Vec<i64> {
    let mut rng = rand::thread_rng();
    let mut wrongs: Vec<i64> = Vec::with_capacity(3);

    while wrongs.len() < 3 {
        let candidate = correct + rng.gen_range(-5..5);
        if candidate != correct && candidate >= 0 && !wrongs.contains(&candidate) {
            wrongs.push(candidate);
        }
    }

    wrongs
}

/// Inline keyboard with one single-button row per candidate answer.
pub fn answer_keyboard(user_id: &str, answers: &[i64]) -> Value {
    let rows: Vec<Value> = answers
        .iter()
        .map(|ans| {
            json!([{
                "text": ans.to_string(),
                "callback_data": format!("verify:{}:{}", user_id, ans),
            }])
        })
        .collect();

    json!({ "inline_keyboard": rows })
}

/// Splits `verify:<userId>:<answer>` callback data. Wrong prefix or part
/// count is `None`; a non-numeric answer part parses as `(userId, None)`,
/// which the caller scores as a wrong answer.
pub fn parse_callback_payload(data: &str) -> Option<(String, Option<i64>)> {
    if !data.starts_with("verify:") {
        return None;
    }

    let parts: Vec<&str> = data.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    Some((parts[1].to_string(), parts[2].parse::<i64>().ok()))
}

/// Recovers the challenge expression out of a message's text.
pub fn parse_question(text: &str) -> Option<(i64, char, i64)> {
    let re = Regex::new(QUESTION_PATTERN).ok()?;
    let caps = re.captures(text)?;

    let num1 = caps.get(1)?.as_str().parse::<i64>().ok()?;
    let operator = caps.get(2)?.as_str().chars().next()?;
    let num2 = caps.get(3)?.as_str().parse::<i64>().ok()?;

    Some((num1, operator, num2))
}

/// Recomputes an answer from a reparsed expression. Subtraction uses the
/// literal parsed order here (num1 - num2, possibly negative), unlike the
/// generator which reorders; the reparsed text always comes from the
/// generator, so the two never actually diverge.
pub fn compute_answer(num1: i64, operator: char, num2: i64) -> Option<i64> {
    match operator {
        '+' => Some(num1 + num2),
        '-' => Some(num1 - num2),
        '×' => Some(num1 * num2),
        _ => None,
    }
}

/// Pure freshness check against a record's last-contact time.
pub fn freshness(record: &VerificationRecord, timeout_days: i64, now_ms: i64) -> VerificationStatus {
    let timeout_ms = timeout_days * 24 * 60 * 60 * 1000;

    VerificationStatus {
        verified: true,
        need_reverify: now_ms - record.last_message_time > timeout_ms,
    }
}

/// Looks up a sender's verification state. No store, or any storage error,
/// fails open: verified with no re-challenge.
pub async fn check_verification(
    store: Option<&dyn VerificationStore>,
    bot_token: &str,
    user_id: &str,
    timeout_days: i64,
) -> VerificationStatus {
    let store = match store {
        Some(store) => store,
        None => return VerificationStatus::pass(),
    };

    let key = verification_key(bot_token, user_id);
    let data = match store.get(&key).await {
        Ok(data) => data,
        Err(e) => {
            log_error!("Error checking verification", json!({ "error": e.to_string() }));
            return VerificationStatus::pass();
        }
    };

    let raw = match data {
        Some(raw) => raw,
        None => {
            return VerificationStatus {
                verified: false,
                need_reverify: false,
            }
        }
    };

    match serde_json::from_str::<VerificationRecord>(&raw) {
        Ok(record) => freshness(&record, timeout_days, chrono::Utc::now().timestamp_millis()),
        Err(e) => {
            log_error!("Error checking verification", json!({ "error": e.to_string() }));
            VerificationStatus::pass()
        }
    }
}

/// Records a successful contact: bumps `last_message_time` on an existing
/// record, or creates a fresh record. Best-effort; storage errors are logged
/// and swallowed so a flaky store never blocks the relay.
pub async fn update_verification(
    store: Option<&dyn VerificationStore>,
    bot_token: &str,
    user_id: &str,
) {
    let store = match store {
        Some(store) => store,
        None => return,
    };

    let key = verification_key(bot_token, user_id);
    let now = chrono::Utc::now().timestamp_millis();

    let record = match store.get(&key).await {
        Ok(Some(raw)) => match serde_json::from_str::<VerificationRecord>(&raw) {
            Ok(mut record) => {
                record.last_message_time = now;
                record
            }
            Err(_) => new_record(user_id, now),
        },
        Ok(None) => new_record(user_id, now),
        Err(e) => {
            log_error!("Error updating verification", json!({ "error": e.to_string() }));
            return;
        }
    };

    let serialized = match serde_json::to_string(&record) {
        Ok(serialized) => serialized,
        Err(e) => {
            log_error!("Error updating verification", json!({ "error": e.to_string() }));
            return;
        }
    };

    if let Err(e) = store.put(&key, &serialized).await {
        log_error!("Error updating verification", json!({ "error": e.to_string() }));
    }
}

fn new_record(user_id: &str, now: i64) -> VerificationRecord {
    VerificationRecord {
        user_id: user_id.to_string(),
        last_message_time: now,
        verified_at: now,
    }
}

/// Sends a fresh challenge to a chat. Send failures are logged and swallowed.
pub async fn send_verification_message(client: &BotApiClient, chat_id: i64, user_id: &str) {
    let challenge = generate_math_challenge();

    let mut candidates = vec![challenge.answer];
    candidates.extend(wrong_answers(challenge.answer));
    candidates.shuffle(&mut rand::thread_rng());

    let text = format!(
        "🤖 Please complete verification to continue:\n\n{}\n\nPick the correct answer:",
        challenge.question
    );

    if let Err(e) = client
        .send_message(chat_id, &text, Some(answer_keyboard(user_id, &candidates)))
        .await
    {
        log_error!(
            "Error sending verification message",
            json!({ "error": e.to_string() })
        );
    }
}

/// Resolves an answer-button press. The caller always acknowledges the
/// delivery with HTTP 200, whatever happens in here, so Telegram never
/// re-delivers the callback; malformed payloads are silently dropped.
pub async fn handle_callback_query(
    update: &Value,
    client: &BotApiClient,
    store: Option<&dyn VerificationStore>,
    bot_token: &str,
) {
    let callback_query = match update.get("callback_query") {
        Some(cq) => cq,
        None => return,
    };

    let data = callback_query
        .get("data")
        .and_then(|d| d.as_str())
        .unwrap_or("");

    let (user_id, user_answer) = match parse_callback_payload(data) {
        Some(parsed) => parsed,
        None => return,
    };

    let message = match callback_query.get("message") {
        Some(message) => message,
        None => return,
    };

    let text = message.get("text").and_then(|t| t.as_str()).unwrap_or("");
    let correct = match parse_question(text).and_then(|(a, op, b)| compute_answer(a, op, b)) {
        Some(correct) => correct,
        None => return,
    };

    let query_id = callback_query
        .get("id")
        .and_then(|id| id.as_str())
        .unwrap_or("");
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(|id| id.as_i64())
        .unwrap_or(0);
    let message_id = message
        .get("message_id")
        .and_then(|id| id.as_i64())
        .unwrap_or(0);

    if user_answer == Some(correct) {
        update_verification(store, bot_token, &user_id).await;

        if let Err(e) = client
            .answer_callback_query(query_id, "✅ Verification passed!")
            .await
        {
            log_warn!("Error answering callback", json!({ "error": e.to_string() }));
        }

        if let Err(e) = client
            .edit_message_text(
                chat_id,
                message_id,
                "✅ Verification passed. You can send messages now.",
            )
            .await
        {
            log_warn!("Error editing challenge message", json!({ "error": e.to_string() }));
        }
    } else {
        if let Err(e) = client
            .answer_callback_query(query_id, "❌ Wrong answer, please try again")
            .await
        {
            log_warn!("Error answering callback", json!({ "error": e.to_string() }));
        }

        send_verification_message(client, chat_id, &user_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::RelayResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl VerificationStore for MemoryStore {
        async fn get(&self, key: &str) -> RelayResult<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, value: &str) -> RelayResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_generated_answers_never_negative() {
        for _ in 0..1000 {
            let challenge = generate_math_challenge();
            assert!(challenge.answer >= 0, "got {:?}", challenge);

            if let Some((a, op, b)) = parse_question(&challenge.question) {
                if op == '-' {
                    assert!(a >= b, "minuend < subtrahend in {:?}", challenge);
                }
            } else {
                panic!("question does not reparse: {:?}", challenge);
            }
        }
    }

    #[test]
    fn test_generated_question_recomputes_to_answer() {
        for _ in 0..1000 {
            let challenge = generate_math_challenge();
            let (a, op, b) = parse_question(&challenge.question).unwrap();
            assert_eq!(compute_answer(a, op, b), Some(challenge.answer));
        }
    }

    #[test]
    fn test_wrong_answers_distinct_and_valid() {
        for correct in [0, 1, 7, 40, 400] {
            for _ in 0..200 {
                let wrongs = wrong_answers(correct);
                assert_eq!(wrongs.len(), 3);
                for (i, w) in wrongs.iter().enumerate() {
                    assert!(*w >= 0);
                    assert_ne!(*w, correct);
                    assert!(!wrongs[i + 1..].contains(w));
                }
            }
        }
    }

    #[test]
    fn test_parse_callback_payload() {
        assert_eq!(
            parse_callback_payload("verify:12345:7"),
            Some(("12345".to_string(), Some(7)))
        );
        assert_eq!(parse_callback_payload("verify:bad"), None);
        assert_eq!(parse_callback_payload("other:12345:7"), None);
        assert_eq!(parse_callback_payload("verify:1:2:3"), None);
        // non-numeric answers stay scorable (as wrong)
        assert_eq!(
            parse_callback_payload("verify:12345:x"),
            Some(("12345".to_string(), None))
        );
    }

    #[test]
    fn test_parse_question_from_prompt_text() {
        let text = "🤖 Please complete verification to continue:\n\n3 + 4 = ?\n\nPick the correct answer:";
        assert_eq!(parse_question(text), Some((3, '+', 4)));
        assert_eq!(parse_question("12 × 5 = ?"), Some((12, '×', 5)));
        assert_eq!(parse_question("no question here"), None);
    }

    #[test]
    fn test_compute_answer_uses_literal_order() {
        assert_eq!(compute_answer(3, '+', 4), Some(7));
        assert_eq!(compute_answer(9, '-', 4), Some(5));
        // literal order, not reordered like the generator
        assert_eq!(compute_answer(4, '-', 9), Some(-5));
        assert_eq!(compute_answer(3, '×', 4), Some(12));
        assert_eq!(compute_answer(3, '/', 4), None);
    }

    #[test]
    fn test_answer_keyboard_shape() {
        let keyboard = answer_keyboard("42", &[7, 8, 9, 10]);
        let rows = keyboard["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 4);
        for row in rows {
            assert_eq!(row.as_array().unwrap().len(), 1);
        }
        assert_eq!(rows[0][0]["callback_data"], "verify:42:7");
    }

    #[test]
    fn test_freshness_boundaries() {
        let now = 1_700_000_000_000;
        let timeout_days = 7;
        let timeout_ms = timeout_days * 86_400_000;

        let stale = VerificationRecord {
            user_id: "1".into(),
            last_message_time: now - timeout_ms - 1,
            verified_at: 0,
        };
        assert_eq!(
            freshness(&stale, timeout_days, now),
            VerificationStatus {
                verified: true,
                need_reverify: true
            }
        );

        let fresh = VerificationRecord {
            user_id: "1".into(),
            last_message_time: now - 1,
            verified_at: 0,
        };
        assert_eq!(
            freshness(&fresh, timeout_days, now),
            VerificationStatus {
                verified: true,
                need_reverify: false
            }
        );
    }

    #[tokio::test]
    async fn test_check_verification_fails_open_without_store() {
        let status = check_verification(None, "TOKEN", "42", 7).await;
        assert_eq!(status, VerificationStatus::pass());
    }

    #[tokio::test]
    async fn test_check_verification_unverified_when_absent() {
        let store = MemoryStore::default();
        let status = check_verification(Some(&store), "TOKEN", "42", 7).await;
        assert!(!status.verified);
        assert!(!status.need_reverify);
    }

    #[tokio::test]
    async fn test_update_then_check_roundtrip() {
        let store = MemoryStore::default();
        update_verification(Some(&store), "TOKEN", "42").await;

        let raw = store
            .get(&verification_key("TOKEN", "42"))
            .await
            .unwrap()
            .unwrap();
        let record: VerificationRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.user_id, "42");
        assert_eq!(record.verified_at, record.last_message_time);

        let status = check_verification(Some(&store), "TOKEN", "42", 7).await;
        assert!(status.verified);
        assert!(!status.need_reverify);
    }

    #[tokio::test]
    async fn test_update_existing_keeps_verified_at() {
        let store = MemoryStore::default();
        let original = VerificationRecord {
            user_id: "42".into(),
            last_message_time: 1,
            verified_at: 1,
        };
        store
            .put(
                &verification_key("TOKEN", "42"),
                &serde_json::to_string(&original).unwrap(),
            )
            .await
            .unwrap();

        update_verification(Some(&store), "TOKEN", "42").await;

        let raw = store
            .get(&verification_key("TOKEN", "42"))
            .await
            .unwrap()
            .unwrap();
        let record: VerificationRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.verified_at, 1);
        assert!(record.last_message_time > 1);
    }

    #[tokio::test]
    async fn test_record_wire_format_is_camel_case() {
        let store = MemoryStore::default();
        update_verification(Some(&store), "TOKEN", "42").await;

        let raw = store
            .get(&verification_key("TOKEN", "42"))
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("userId").is_some());
        assert!(value.get("lastMessageTime").is_some());
        assert!(value.get("verifiedAt").is_some());
    }

    #[tokio::test]
    async fn test_callback_success_persists_verification() {
        let store = MemoryStore::default();
        let client = BotApiClient::new("TOKEN").with_test_mode();
        let update = json!({
            "callback_query": {
                "id": "cb1",
                "data": "verify:12345:7",
                "message": {
                    "message_id": 9,
                    "chat": { "id": 12345 },
                    "text": "🤖 Please complete verification to continue:\n\n3 + 4 = ?\n\nPick the correct answer:"
                }
            }
        });

        handle_callback_query(&update, &client, Some(&store), "TOKEN").await;
        assert!(store
            .get(&verification_key("TOKEN", "12345"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_callback_wrong_answer_leaves_no_record() {
        let store = MemoryStore::default();
        let client = BotApiClient::new("TOKEN").with_test_mode();
        let update = json!({
            "callback_query": {
                "id": "cb1",
                "data": "verify:12345:8",
                "message": {
                    "message_id": 9,
                    "chat": { "id": 12345 },
                    "text": "3 + 4 = ?"
                }
            }
        });

        handle_callback_query(&update, &client, Some(&store), "TOKEN").await;
        assert!(store
            .get(&verification_key("TOKEN", "12345"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_callback_non_numeric_answer_rechallenges() {
        let store = MemoryStore::default();
        let client = BotApiClient::new("TOKEN").with_test_mode();
        let update = json!({
            "callback_query": {
                "id": "cb1",
                "data": "verify:12345:x",
                "message": { "message_id": 9, "chat": { "id": 12345 }, "text": "3 + 4 = ?" }
            }
        });

        handle_callback_query(&update, &client, Some(&store), "TOKEN").await;

        assert!(store
            .get(&verification_key("TOKEN", "12345"))
            .await
            .unwrap()
            .is_none());

        // scored as a wrong answer: failure toast plus a fresh challenge
        let methods: Vec<String> = client
            .recorded_calls()
            .into_iter()
            .map(|(method, _)| method)
            .collect();
        assert!(methods.contains(&"answerCallbackQuery".to_string()));
        assert!(methods.contains(&"sendMessage".to_string()));
    }

    #[tokio::test]
    async fn test_callback_malformed_payload_is_ignored() {
        let store = MemoryStore::default();
        let client = BotApiClient::new("TOKEN").with_test_mode();
        let update = json!({
            "callback_query": {
                "id": "cb1",
                "data": "verify:bad",
                "message": { "message_id": 9, "chat": { "id": 1 }, "text": "3 + 4 = ?" }
            }
        });

        handle_callback_query(&update, &client, Some(&store), "TOKEN").await;
        assert!(store.entries.lock().unwrap().is_empty());
    }
}
