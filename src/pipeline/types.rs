//! Shared types for the forwarding pipeline.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Serialize, Serializer};

use crate::error::SendError;

// ── Chat addressing ─────────────────────────────────────────────────

/// A chat identifier: either a numeric platform ID or a textual handle.
///
/// The pipeline treats both forms as opaque tokens; resolution to
/// platform-internal addressing is the gateway's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatId {
    Id(i64),
    Handle(String),
}

impl ChatId {
    /// Parse a chat identifier from its textual form.
    ///
    /// An integer token becomes `Id`; anything else becomes `Handle`
    /// with a guaranteed leading `@`. Empty input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::Id(id));
        }
        if let Some(handle) = raw.strip_prefix('@') {
            if handle.is_empty() {
                return None;
            }
            Some(Self::Handle(format!("@{handle}")))
        } else {
            Some(Self::Handle(format!("@{raw}")))
        }
    }

    /// Case-insensitive equality for handles, exact for numeric IDs.
    ///
    /// Platform usernames are case-insensitive; numeric IDs are not.
    pub fn matches(&self, other: &ChatId) -> bool {
        match (self, other) {
            (Self::Id(a), Self::Id(b)) => a == b,
            (Self::Handle(a), Self::Handle(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Handle(handle) => write!(f, "{handle}"),
        }
    }
}

// Serializes as the Bot API expects: a JSON number or an "@handle" string.
impl Serialize for ChatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Id(id) => serializer.serialize_i64(*id),
            Self::Handle(handle) => serializer.serialize_str(handle),
        }
    }
}

/// Kind of chat a message originated from, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Parse the platform's `chat.type` string. Unknown kinds yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            "supergroup" => Some(Self::Supergroup),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

// ── Inbound message ─────────────────────────────────────────────────

/// A message received from a monitored chat. Immutable once constructed;
/// owned by the pipeline invocation that receives it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Chat the message arrived in (canonical numeric form).
    pub origin: ChatId,
    /// Public `@handle` of the origin chat, when it has one, letting
    /// handle-configured sources match numeric-origin messages.
    pub origin_handle: Option<String>,
    /// Kind of the origin chat (drives auto-mode source filtering).
    pub origin_kind: ChatKind,
    /// Platform message ID, needed to relay the original verbatim.
    pub message_id: i64,
    /// Message text, or the caption for media messages.
    pub text: String,
    /// When the message arrived.
    pub received_at: DateTime<Utc>,
}

// ── Node links ──────────────────────────────────────────────────────

/// Recognized proxy-node protocols. Adding one is a table update here
/// plus a `scheme()` arm; the extractor is parameterized by `ALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeProtocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    ShadowsocksR,
    Hysteria,
    Hysteria2,
    Tuic,
    Wireguard,
}

impl NodeProtocol {
    pub const ALL: [NodeProtocol; 9] = [
        Self::Vmess,
        Self::Vless,
        Self::Trojan,
        Self::Shadowsocks,
        Self::ShadowsocksR,
        Self::Hysteria,
        Self::Hysteria2,
        Self::Tuic,
        Self::Wireguard,
    ];

    /// The URI scheme prefix this protocol is recognized by.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Vmess => "vmess://",
            Self::Vless => "vless://",
            Self::Trojan => "trojan://",
            Self::Shadowsocks => "ss://",
            Self::ShadowsocksR => "ssr://",
            Self::Hysteria => "hysteria://",
            Self::Hysteria2 => "hy2://",
            Self::Tuic => "tuic://",
            Self::Wireguard => "wireguard://",
        }
    }
}

impl std::fmt::Display for NodeProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme().trim_end_matches("://"))
    }
}

/// One extracted node link: the protocol tag plus the raw URI exactly
/// as it appeared in the source text. Value object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink {
    pub protocol: NodeProtocol,
    pub uri: String,
}

// ── Forward payload ─────────────────────────────────────────────────

/// How passing messages are republished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Republish only the extracted node links.
    #[default]
    Extract,
    /// Relay the original message verbatim.
    Forward,
}

impl std::fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Extract => "extract",
            Self::Forward => "forward",
        })
    }
}

/// The single outbound payload derived from one inbound message,
/// fanned out identically to every destination.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardPayload {
    /// Newline-joined extracted link URIs, or the original message
    /// text when extraction found nothing (an empty body is never sent).
    ExtractedText(String),
    /// Relay the platform message verbatim, media included. The gateway
    /// needs the origin chat and message ID to do so.
    OriginalMessage { source: ChatId, message_id: i64 },
}

// ── Delivery outcomes ───────────────────────────────────────────────

/// Per-destination result of one fan-out. Ephemeral: logged, not stored.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Skipped { reason: String },
    Failed { error: SendError, attempts: u32 },
}

impl DeliveryOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Aggregated fan-out result, ordered like the configured destinations.
#[derive(Debug)]
pub struct DeliveryReport {
    pub outcomes: Vec<(ChatId, DeliveryOutcome)>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Delivered { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&DeliveryOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

// ── Gateway trait ───────────────────────────────────────────────────

/// Stream of inbound messages produced by a platform listener.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// The platform send capability the sender drives: pure I/O, no retry
/// logic. Implementations classify failures into `SendError` so the
/// sender can pick the right recovery.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Deliver one payload to one destination. Rate-limit handling and
    /// retries live in the caller, never here.
    async fn deliver(
        &self,
        destination: &ChatId,
        payload: &ForwardPayload,
    ) -> Result<(), SendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ChatId parsing ──────────────────────────────────────────────

    #[test]
    fn chat_id_parses_numeric() {
        assert_eq!(ChatId::parse("-1001234567890"), Some(ChatId::Id(-1001234567890)));
        assert_eq!(ChatId::parse("42"), Some(ChatId::Id(42)));
    }

    #[test]
    fn chat_id_parses_handle() {
        assert_eq!(
            ChatId::parse("@proxy_pool"),
            Some(ChatId::Handle("@proxy_pool".into()))
        );
    }

    #[test]
    fn chat_id_bare_handle_gets_at_prefix() {
        assert_eq!(
            ChatId::parse("proxy_pool"),
            Some(ChatId::Handle("@proxy_pool".into()))
        );
    }

    #[test]
    fn chat_id_empty_is_none() {
        assert_eq!(ChatId::parse(""), None);
        assert_eq!(ChatId::parse("   "), None);
        assert_eq!(ChatId::parse("@"), None);
    }

    #[test]
    fn chat_id_display_round_trips() {
        for raw in ["-100123", "@nodes"] {
            let id = ChatId::parse(raw).unwrap();
            assert_eq!(id.to_string(), raw);
        }
    }

    #[test]
    fn chat_id_handle_match_is_case_insensitive() {
        let a = ChatId::parse("@Nodes").unwrap();
        let b = ChatId::parse("@nodes").unwrap();
        assert!(a.matches(&b));
        assert!(!ChatId::Id(1).matches(&ChatId::Id(2)));
        assert!(!ChatId::Id(1).matches(&b));
    }

    #[test]
    fn chat_id_serializes_for_the_bot_api() {
        assert_eq!(
            serde_json::to_value(ChatId::Id(-100123)).unwrap(),
            serde_json::json!(-100123)
        );
        assert_eq!(
            serde_json::to_value(ChatId::Handle("@nodes".into())).unwrap(),
            serde_json::json!("@nodes")
        );
    }

    // ── ChatKind ────────────────────────────────────────────────────

    #[test]
    fn chat_kind_parses_known_kinds() {
        assert_eq!(ChatKind::parse("private"), Some(ChatKind::Private));
        assert_eq!(ChatKind::parse("supergroup"), Some(ChatKind::Supergroup));
        assert_eq!(ChatKind::parse("bogus"), None);
    }

    // ── Protocol table ──────────────────────────────────────────────

    #[test]
    fn protocol_table_has_nine_distinct_schemes() {
        let schemes: Vec<&str> = NodeProtocol::ALL.iter().map(|p| p.scheme()).collect();
        assert_eq!(schemes.len(), 9);
        for s in &schemes {
            assert!(s.ends_with("://"), "scheme {s} missing :// suffix");
        }
        let mut dedup = schemes.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), 9, "duplicate scheme in table");
    }

    #[test]
    fn forward_mode_parses_lowercase() {
        let mode: ForwardMode = serde_json::from_str("\"forward\"").unwrap();
        assert_eq!(mode, ForwardMode::Forward);
        assert_eq!(ForwardMode::default(), ForwardMode::Extract);
    }

    // ── Delivery report ─────────────────────────────────────────────

    #[test]
    fn delivery_report_counts() {
        let report = DeliveryReport {
            outcomes: vec![
                (ChatId::Id(1), DeliveryOutcome::Delivered { attempts: 1 }),
                (
                    ChatId::Id(2),
                    DeliveryOutcome::Failed {
                        error: crate::error::SendError::Permanent("chat not found".into()),
                        attempts: 1,
                    },
                ),
                (
                    ChatId::Id(3),
                    DeliveryOutcome::Skipped {
                        reason: "shutdown".into(),
                    },
                ),
            ],
        };
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
    }
}
