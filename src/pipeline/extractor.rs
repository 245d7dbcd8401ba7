//! Node link extraction — recognizes proxy-node connection strings.
//!
//! Purely syntactic: a link is a recognized scheme prefix plus the
//! non-whitespace run that follows it. No payload validation, no
//! deduplication, no trimming. Matching is case-sensitive.

use crate::pipeline::types::{NodeLink, NodeProtocol};

/// Extract all node links from `text`, in order of first appearance.
///
/// The scanner walks the text left to right; at each unconsumed
/// position it tests the protocol table, and on a match captures up to
/// the next whitespace (or end of text) and resumes after the captured
/// token. A prefix embedded mid-token (say, in a URL query string)
/// still matches because scanning restarts at every position outside a
/// capture. No-match input yields an empty list, not an error.
pub fn extract_nodes(text: &str) -> Vec<NodeLink> {
    let mut links = Vec::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        if let Some(protocol) = match_scheme(rest) {
            let end = rest
                .find(char::is_whitespace)
                .unwrap_or(rest.len());
            links.push(NodeLink {
                protocol,
                uri: rest[..end].to_string(),
            });
            i += end;
        } else {
            // Advance one character, staying on a UTF-8 boundary.
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }

    links
}

/// Test the protocol table against the start of `rest`.
///
/// Scheme prefixes all end in `://`, so at most one can match at a
/// given position; table order does not matter.
fn match_scheme(rest: &str) -> Option<NodeProtocol> {
    NodeProtocol::ALL
        .into_iter()
        .find(|p| rest.starts_with(p.scheme()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uris(text: &str) -> Vec<String> {
        extract_nodes(text).into_iter().map(|l| l.uri).collect()
    }

    #[test]
    fn every_scheme_matches_alone() {
        for protocol in NodeProtocol::ALL {
            let link = format!("{}payload123", protocol.scheme());
            let found = extract_nodes(&link);
            assert_eq!(found.len(), 1, "scheme {} did not match", protocol.scheme());
            assert_eq!(found[0].uri, link);
            assert_eq!(found[0].protocol, protocol);
        }
    }

    #[test]
    fn extraction_preserves_first_appearance_order() {
        let text = "trojan://b first, then vmess://a and ss://c";
        assert_eq!(uris(text), vec!["trojan://b", "vmess://a", "ss://c"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let text = "vmess://same vmess://same";
        assert_eq!(uris(text), vec!["vmess://same", "vmess://same"]);
    }

    #[test]
    fn capture_stops_at_whitespace() {
        assert_eq!(uris("vless://abc def"), vec!["vless://abc"]);
        assert_eq!(uris("vless://abc\ndef"), vec!["vless://abc"]);
        assert_eq!(uris("vless://abc\tdef"), vec!["vless://abc"]);
    }

    #[test]
    fn capture_runs_to_end_of_text() {
        assert_eq!(uris("tail is hy2://x:443?peer=y#frag"), vec!["hy2://x:443?peer=y#frag"]);
    }

    #[test]
    fn prefix_embedded_in_another_token_still_matches() {
        // Syntactic scope limit: no semantic validation of surroundings.
        let text = "https://sub.example/api?link=ssr://ZW5jb2RlZA";
        assert_eq!(uris(text), vec!["ssr://ZW5jb2RlZA"]);
    }

    #[test]
    fn scheme_inside_a_captured_link_is_not_double_counted() {
        // "vless://" contains "ss://"; the capture consumes it.
        let found = extract_nodes("vless://abc123@host:443");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].protocol, NodeProtocol::Vless);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(extract_nodes("VMESS://abc Vless://def").is_empty());
    }

    #[test]
    fn malformed_payload_is_not_rejected() {
        assert_eq!(uris("ss://%%%not-base64%%%"), vec!["ss://%%%not-base64%%%"]);
    }

    #[test]
    fn bare_scheme_is_still_a_syntactic_match() {
        assert_eq!(uris("vmess:// trailing"), vec!["vmess://"]);
    }

    #[test]
    fn empty_and_no_match_inputs_yield_empty() {
        assert!(extract_nodes("").is_empty());
        assert!(extract_nodes("no links here, just chatter").is_empty());
    }

    #[test]
    fn scans_past_multibyte_text() {
        let text = "免费节点：vmess://eyJ2IjoiMiJ9 更多哦";
        assert_eq!(uris(text), vec!["vmess://eyJ2IjoiMiJ9"]);
    }

    #[test]
    fn worked_example_from_the_wild() {
        let text = "free node: vless://abc123@host:443?x=1 more text trojan://def456@host2:443";
        assert_eq!(
            uris(text),
            vec!["vless://abc123@host:443?x=1", "trojan://def456@host2:443"]
        );
    }
}
