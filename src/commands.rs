//! Control commands — textual replies for `/start`, `/status` and
//! `/help` sent to the bot in a private chat.
//!
//! Pure: the caller routes private-chat messages here and sends the
//! returned text back through the gateway. Command traffic never
//! enters the forwarding pipeline.

use crate::pipeline::types::ForwardMode;

/// Read-only view of the running configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Human-readable monitor description, e.g. `custom (3 chats)`.
    pub monitor: String,
    pub destinations: usize,
    pub forward_mode: ForwardMode,
    pub nodes_only: bool,
}

/// Reply to a control command, or `None` for anything that is not a
/// known command (unknown `/commands` are ignored, not answered).
pub fn respond(text: &str, status: &StatusSnapshot) -> Option<String> {
    let command = text.trim().split_whitespace().next()?;
    // Commands may arrive suffixed with the bot's name: /status@relay_bot
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" => Some(
            "Node relay online. I watch the configured source chats, pick out \
             proxy node links, and republish them to the configured destinations.\n\n\
             Recognized link types: vmess, vless, trojan, ss, ssr, hysteria, \
             hy2, tuic, wireguard.\n\n\
             /status - current configuration\n\
             /help - command list"
                .to_string(),
        ),
        "/status" => Some(format!(
            "Relay status\n\
             monitor: {}\n\
             destinations: {}\n\
             forward mode: {}\n\
             nodes only: {}",
            status.monitor,
            status.destinations,
            status.forward_mode,
            if status.nodes_only { "yes" } else { "no" },
        )),
        "/help" => Some(
            "/start - what this relay does\n\
             /status - current configuration\n\
             /help - this list"
                .to_string(),
        ),
        _ => None,
    }
}
