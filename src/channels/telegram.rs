//! Telegram Bot API gateway — long-polls for updates and delivers
//! outbound payloads.
//!
//! Raw HTTPS against the Bot API via reqwest; no bot framework. This
//! is the platform collaborator: it does I/O and classifies failures
//! into `SendError`, and nothing else; retry policy lives in the
//! pipeline's sender.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ChannelError, SendError};
use crate::pipeline::types::{
    ChatId, ChatKind, ForwardPayload, InboundMessage, MessageGateway, MessageStream,
};

/// Maximum text length for the sendMessage API.
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before trying again.
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Cooldown assumed when the platform rate-limits without naming one.
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Telegram gateway, one per process, shared across all fan-out tasks.
pub struct TelegramGateway {
    token: SecretString,
    client: reqwest::Client,
}

impl TelegramGateway {
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.token.expose_secret()
        )
    }

    /// Startup probe: verify the token and report the bot's username.
    pub async fn get_me(&self) -> Result<String, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::AuthFailed {
                name: "telegram".into(),
                reason: "bot token rejected".into(),
            });
        }
        if !resp.status().is_success() {
            return Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            });
        }

        let data: Value = resp.json().await.map_err(|e| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason: format!("getMe parse error: {e}"),
        })?;
        Ok(data
            .pointer("/result/username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Start the long-poll loop and return the inbound message stream.
    ///
    /// Poll errors are logged and retried after a short pause; the loop
    /// only ends when the receiving side is dropped.
    pub fn listen(&self) -> MessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.api_url("getUpdates");

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            info!("listening for platform updates");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "channel_post"],
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("update poll error: {e}");
                        tokio::time::sleep(POLL_ERROR_PAUSE).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("update parse error: {e}");
                        tokio::time::sleep(POLL_ERROR_PAUSE).await;
                        continue;
                    }
                };

                if let Some(updates) = data.get("result").and_then(Value::as_array) {
                    for update in updates {
                        if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                            offset = uid + 1;
                        }
                        let Some(message) = parse_update(update) else {
                            continue;
                        };
                        if tx.send(message).is_err() {
                            info!("update listener closed");
                            return;
                        }
                    }
                }
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        }))
    }

    /// POST one API method and classify any failure.
    async fn execute(&self, method: &str, body: Value) -> Result<(), SendError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::Transient(format!("{method} request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.json().await.unwrap_or(Value::Null);
        Err(classify_failure(status, &body))
    }

    /// Send a plain text message, split at the platform's length limit.
    async fn send_text(&self, destination: &ChatId, text: &str) -> Result<(), SendError> {
        for chunk in split_message(text, MAX_MESSAGE_LENGTH) {
            self.execute(
                "sendMessage",
                serde_json::json!({
                    "chat_id": destination,
                    "text": chunk,
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for TelegramGateway {
    async fn deliver(
        &self,
        destination: &ChatId,
        payload: &ForwardPayload,
    ) -> Result<(), SendError> {
        match payload {
            ForwardPayload::ExtractedText(text) => self.send_text(destination, text).await,
            ForwardPayload::OriginalMessage { source, message_id } => {
                self.execute(
                    "forwardMessage",
                    serde_json::json!({
                        "chat_id": destination,
                        "from_chat_id": source,
                        "message_id": message_id,
                    }),
                )
                .await
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a Bot API failure onto the sender's error classes.
///
/// 429 (or an explicit `parameters.retry_after`) is a mandatory
/// cooldown; 400/403/404 mean the destination itself is wrong (bad
/// chat, kicked bot) and retrying cannot help; everything else is
/// worth a bounded retry.
fn classify_failure(status: reqwest::StatusCode, body: &Value) -> SendError {
    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("no description")
        .to_string();

    if let Some(wait) = body.pointer("/parameters/retry_after").and_then(Value::as_u64) {
        return SendError::RateLimited {
            retry_after: Duration::from_secs(wait),
        };
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return SendError::RateLimited {
            retry_after: FALLBACK_RETRY_AFTER,
        };
    }

    match status.as_u16() {
        400 | 403 | 404 => SendError::Permanent(description),
        _ => SendError::Transient(format!("HTTP {status}: {description}")),
    }
}

/// Build an `InboundMessage` from one getUpdates entry.
///
/// Accepts group/channel posts carrying text or a caption; anything
/// else (stickers, joins, unknown chat kinds) is skipped.
fn parse_update(update: &Value) -> Option<InboundMessage> {
    let message = update.get("message").or_else(|| update.get("channel_post"))?;
    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)?;

    let chat = message.get("chat")?;
    let chat_id = chat.get("id").and_then(Value::as_i64)?;
    let origin_kind = chat
        .get("type")
        .and_then(Value::as_str)
        .and_then(ChatKind::parse)?;
    let origin_handle = chat
        .get("username")
        .and_then(Value::as_str)
        .map(|u| format!("@{u}"));
    let message_id = message.get("message_id").and_then(Value::as_i64)?;
    let received_at = message
        .get("date")
        .and_then(Value::as_i64)
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    Some(InboundMessage {
        origin: ChatId::Id(chat_id),
        origin_handle,
        origin_kind,
        message_id,
        text: text.to_string(),
        received_at,
    })
}

/// Split a message into chunks that fit the platform's length limit,
/// preferring newline then space boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }
        let window = &remaining[..max_len];
        let mut split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .unwrap_or(max_len);
        if split_at == 0 {
            split_at = max_len;
        }
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> reqwest::StatusCode {
        reqwest::StatusCode::from_u16(code).unwrap()
    }

    // ── Failure classification ──────────────────────────────────────

    #[test]
    fn classifies_rate_limits_with_retry_after() {
        let body = serde_json::json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 23",
            "parameters": { "retry_after": 23 },
        });
        match classify_failure(status(429), &body) {
            SendError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(23));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_without_duration_gets_a_fallback_cooldown() {
        match classify_failure(status(429), &Value::Null) {
            SendError::RateLimited { retry_after } => {
                assert_eq!(retry_after, FALLBACK_RETRY_AFTER);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn classifies_bad_destinations_as_permanent() {
        let body = serde_json::json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found",
        });
        match classify_failure(status(400), &body) {
            SendError::Permanent(reason) => assert!(reason.contains("chat not found")),
            other => panic!("expected permanent, got {other:?}"),
        }
        assert!(matches!(
            classify_failure(status(403), &Value::Null),
            SendError::Permanent(_)
        ));
    }

    #[test]
    fn classifies_server_errors_as_transient() {
        assert!(matches!(
            classify_failure(status(502), &Value::Null),
            SendError::Transient(_)
        ));
    }

    // ── Update parsing ──────────────────────────────────────────────

    fn group_update(text: &str) -> Value {
        serde_json::json!({
            "update_id": 100,
            "message": {
                "message_id": 5,
                "date": 1700000000,
                "chat": { "id": -100123, "type": "supergroup", "username": "pool" },
                "text": text,
            },
        })
    }

    #[test]
    fn parses_a_group_message() {
        let msg = parse_update(&group_update("vmess://abc")).unwrap();
        assert_eq!(msg.origin, ChatId::Id(-100123));
        assert_eq!(msg.origin_handle.as_deref(), Some("@pool"));
        assert_eq!(msg.origin_kind, ChatKind::Supergroup);
        assert_eq!(msg.message_id, 5);
        assert_eq!(msg.text, "vmess://abc");
        assert_eq!(msg.received_at.timestamp(), 1700000000);
    }

    #[test]
    fn parses_a_channel_post_caption() {
        let update = serde_json::json!({
            "update_id": 101,
            "channel_post": {
                "message_id": 9,
                "date": 1700000001,
                "chat": { "id": -100456, "type": "channel" },
                "caption": "today's batch ss://xyz",
                "photo": [{}],
            },
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.origin_kind, ChatKind::Channel);
        assert_eq!(msg.origin_handle, None);
        assert_eq!(msg.text, "today's batch ss://xyz");
    }

    #[test]
    fn skips_textless_updates() {
        let update = serde_json::json!({
            "update_id": 102,
            "message": {
                "message_id": 10,
                "date": 1700000002,
                "chat": { "id": -1, "type": "group" },
                "sticker": {},
            },
        });
        assert!(parse_update(&update).is_none());
    }

    #[test]
    fn skips_unknown_chat_kinds() {
        let update = serde_json::json!({
            "update_id": 103,
            "message": {
                "message_id": 11,
                "date": 1700000003,
                "chat": { "id": -1, "type": "sender" },
                "text": "vmess://abc",
            },
        });
        assert!(parse_update(&update).is_none());
    }

    // ── URL construction ────────────────────────────────────────────

    #[test]
    fn api_url_embeds_method_and_token() {
        let gw = TelegramGateway::new(SecretString::from("123:ABC"));
        assert_eq!(
            gw.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    // ── Message splitting ───────────────────────────────────────────

    #[test]
    fn split_message_short_passthrough() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
    }

    #[test]
    fn split_message_prefers_newline_boundaries() {
        let text = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));
        let chunks = split_message(&text, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(3000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_hard_cuts_unbroken_runs() {
        let text = "a".repeat(5000);
        let chunks = split_message(&text, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }
}
