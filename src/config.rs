//! Configuration — read once from the environment at startup.
//!
//! File formats are deliberately out of scope; the deployment wraps
//! the process in an env file or unit file. Values are validated here
//! so a bad deployment fails fast with an actionable hint.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::filter::FilterPolicy;
use crate::pipeline::processor::SourceSelector;
use crate::pipeline::sender::SenderSettings;
use crate::pipeline::types::{ChatId, ChatKind, ForwardMode};

const ENV_BOT_TOKEN: &str = "RELAY_BOT_TOKEN";
const ENV_MONITOR_MODE: &str = "RELAY_MONITOR_MODE";
const ENV_SOURCE_CHATS: &str = "RELAY_SOURCE_CHATS";
const ENV_MONITOR_KINDS: &str = "RELAY_MONITOR_KINDS";
const ENV_EXCLUDE_CHATS: &str = "RELAY_EXCLUDE_CHATS";
const ENV_TARGET_CHATS: &str = "RELAY_TARGET_CHATS";
const ENV_FORWARD_MODE: &str = "RELAY_FORWARD_MODE";
const ENV_NODES_ONLY: &str = "RELAY_NODES_ONLY";
const ENV_KEYWORDS: &str = "RELAY_KEYWORDS";
const ENV_EXCLUDE_KEYWORDS: &str = "RELAY_EXCLUDE_KEYWORDS";
const ENV_MAX_FLOOD_WAIT: &str = "RELAY_MAX_FLOOD_WAIT_SECS";
const ENV_SEND_ATTEMPTS: &str = "RELAY_SEND_ATTEMPTS";

/// Complete runtime configuration. Immutable after startup; shared
/// read-only across the pipeline's tasks.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: SecretString,
    pub sources: SourceSelector,
    pub destinations: Vec<ChatId>,
    pub forward_mode: ForwardMode,
    pub policy: FilterPolicy,
    pub sender: SenderSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = get(ENV_BOT_TOKEN)
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingRequired {
                key: ENV_BOT_TOKEN.into(),
                hint: "set it to the bot token from @BotFather".into(),
            })?;

        let sources = match get(ENV_MONITOR_MODE).as_deref().unwrap_or("custom") {
            "custom" => {
                let chats = parse_chat_list(get(ENV_SOURCE_CHATS).as_deref().unwrap_or(""));
                if chats.is_empty() {
                    return Err(ConfigError::MissingRequired {
                        key: ENV_SOURCE_CHATS.into(),
                        hint: "custom monitor mode needs a comma-separated chat list \
                               (numeric IDs or @handles)"
                            .into(),
                    });
                }
                SourceSelector::Custom { chats }
            }
            "auto" => SourceSelector::Auto {
                kinds: parse_chat_kinds(get(ENV_MONITOR_KINDS).as_deref())?,
                exclude: parse_chat_list(get(ENV_EXCLUDE_CHATS).as_deref().unwrap_or("")),
            },
            other => {
                return Err(ConfigError::InvalidValue {
                    key: ENV_MONITOR_MODE.into(),
                    message: format!("expected 'auto' or 'custom', got {other:?}"),
                });
            }
        };

        let destinations = parse_chat_list(get(ENV_TARGET_CHATS).as_deref().unwrap_or(""));
        if destinations.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: ENV_TARGET_CHATS.into(),
                hint: "comma-separated destination chats (numeric IDs or @handles)".into(),
            });
        }

        let forward_mode = match get(ENV_FORWARD_MODE).as_deref().unwrap_or("extract") {
            "extract" => ForwardMode::Extract,
            "forward" => ForwardMode::Forward,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: ENV_FORWARD_MODE.into(),
                    message: format!("expected 'extract' or 'forward', got {other:?}"),
                });
            }
        };

        let policy = FilterPolicy {
            nodes_only: match get(ENV_NODES_ONLY) {
                Some(raw) => parse_bool(ENV_NODES_ONLY, &raw)?,
                None => true,
            },
            required_keywords: parse_keyword_list(get(ENV_KEYWORDS).as_deref().unwrap_or("")),
            excluded_keywords: parse_keyword_list(
                get(ENV_EXCLUDE_KEYWORDS).as_deref().unwrap_or(""),
            ),
        };

        let mut sender = SenderSettings::default();
        if let Some(raw) = get(ENV_MAX_FLOOD_WAIT) {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_MAX_FLOOD_WAIT.into(),
                message: format!("expected seconds as an integer, got {raw:?}"),
            })?;
            sender.max_flood_wait = Duration::from_secs(secs);
        }
        if let Some(raw) = get(ENV_SEND_ATTEMPTS) {
            let attempts: u32 = raw
                .parse()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_SEND_ATTEMPTS.into(),
                    message: format!("expected a positive integer, got {raw:?}"),
                })?;
            sender.max_attempts = attempts;
        }

        Ok(Self {
            bot_token,
            sources,
            destinations,
            forward_mode,
            policy,
            sender,
        })
    }

    /// One-line monitor description for logs and `/status`.
    pub fn monitor_description(&self) -> String {
        match &self.sources {
            SourceSelector::Custom { chats } => format!("custom ({} chats)", chats.len()),
            SourceSelector::Auto { kinds, exclude } => {
                let kinds: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
                format!("auto ({}; {} excluded)", kinds.join(","), exclude.len())
            }
        }
    }
}

/// Split a comma-separated chat list. Blank entries are skipped; bare
/// handles gain their `@` prefix.
fn parse_chat_list(raw: &str) -> Vec<ChatId> {
    raw.split(',').filter_map(ChatId::parse).collect()
}

fn parse_chat_kinds(raw: Option<&str>) -> Result<Vec<ChatKind>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(vec![ChatKind::Group, ChatKind::Supergroup, ChatKind::Channel]);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ChatKind::parse(s).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_MONITOR_KINDS.into(),
                message: format!("unknown chat kind {s:?}"),
            })
        })
        .collect()
}

fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got {raw:?}"),
        }),
    }
}
