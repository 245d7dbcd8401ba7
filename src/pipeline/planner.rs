//! Delivery planning — builds the single outbound payload for a
//! passing message. Pure transform, no I/O and no retry.

use crate::pipeline::types::{ForwardMode, ForwardPayload, InboundMessage, NodeLink};

/// Build the payload fanned out to every destination.
///
/// In `Extract` mode the payload is the newline-joined link URIs in
/// extraction order. A message can reach the planner with zero links
/// (it passed the filter with `nodes_only` off); the payload is then
/// the original text; an empty body is never produced.
pub fn plan(message: &InboundMessage, links: &[NodeLink], mode: ForwardMode) -> ForwardPayload {
    match mode {
        ForwardMode::Extract => {
            if links.is_empty() {
                ForwardPayload::ExtractedText(message.text.clone())
            } else {
                let joined = links
                    .iter()
                    .map(|l| l.uri.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                ForwardPayload::ExtractedText(joined)
            }
        }
        ForwardMode::Forward => ForwardPayload::OriginalMessage {
            source: message.origin.clone(),
            message_id: message.message_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extractor::extract_nodes;
    use crate::pipeline::types::{ChatId, ChatKind};

    fn message(text: &str) -> InboundMessage {
        InboundMessage {
            origin: ChatId::Id(-100777),
            origin_handle: None,
            origin_kind: ChatKind::Supergroup,
            message_id: 42,
            text: text.into(),
            received_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn extract_joins_links_in_order() {
        let msg = message("free node: vless://abc123@host:443?x=1 more text trojan://def456@host2:443");
        let links = extract_nodes(&msg.text);
        let payload = plan(&msg, &links, ForwardMode::Extract);
        assert_eq!(
            payload,
            ForwardPayload::ExtractedText(
                "vless://abc123@host:443?x=1\ntrojan://def456@host2:443".into()
            )
        );
    }

    #[test]
    fn extract_with_no_links_falls_back_to_original_text() {
        let msg = message("status update, nothing attached");
        let payload = plan(&msg, &[], ForwardMode::Extract);
        assert_eq!(
            payload,
            ForwardPayload::ExtractedText("status update, nothing attached".into())
        );
    }

    #[test]
    fn extract_never_produces_an_empty_body_for_nonempty_text() {
        let msg = message("x");
        match plan(&msg, &[], ForwardMode::Extract) {
            ForwardPayload::ExtractedText(body) => assert!(!body.is_empty()),
            other => panic!("expected text payload, got {other:?}"),
        }
    }

    #[test]
    fn extract_keeps_duplicate_links() {
        let msg = message("vmess://same vmess://same");
        let links = extract_nodes(&msg.text);
        let payload = plan(&msg, &links, ForwardMode::Extract);
        assert_eq!(
            payload,
            ForwardPayload::ExtractedText("vmess://same\nvmess://same".into())
        );
    }

    #[test]
    fn forward_mode_references_the_original_message() {
        let msg = message("anything, even with vmess://abc inside");
        let links = extract_nodes(&msg.text);
        let payload = plan(&msg, &links, ForwardMode::Forward);
        assert_eq!(
            payload,
            ForwardPayload::OriginalMessage {
                source: ChatId::Id(-100777),
                message_id: 42,
            }
        );
    }
}
